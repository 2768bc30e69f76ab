//! Conversation orchestration: the per-turn state machine.
//!
//! One turn runs strictly in sequence: validate session, load bounded
//! history, first model call, optional lookup dispatch plus second model
//! call, persist, reply. The only suspension points are the provider HTTP
//! call and the store operations, which run on the blocking worker pool so
//! sibling turns never stall. Every failure path ends in a returned reply.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_provider::{ChatProvider, ChatTurn, FunctionCall, ProviderReply};
use tally_storage::lookup::{LookupSpec, LookupTranslator};
use tally_storage::sessions::{ChatSession, ChatStore, MessageRole, StoredMessage};

use crate::error::ChatError;
use crate::prompt;

/// Prior messages carried into each turn's buffer.
const DEFAULT_HISTORY_LIMIT: u64 = 10;

const INVALID_SESSION_REPLY: &str = "Invalid session ID.";
const EMPTY_REPLY_FALLBACK: &str = "I'm not sure how to respond. Could you clarify?";
const NO_FINAL_ANSWER_FALLBACK: &str = "No final answer provided.";
const INVALID_JSON_ARGS_REPLY: &str = "Function call error: Invalid JSON arguments.";
const NON_OBJECT_ARGS_REPLY: &str = "Function call error: arguments must be a JSON object.";
const INTERNAL_ERROR_REPLY: &str = "Something went wrong. Our team has been notified.";

/// Outcome of one turn, shaped for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TurnOutcome {
    Reply { reply: String },
    Error { error: String },
}

impl TurnOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        TurnOutcome::Reply { reply: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        TurnOutcome::Error { error: text.into() }
    }

    pub fn reply_text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Reply { reply } => Some(reply),
            TurnOutcome::Error { .. } => None,
        }
    }

    pub fn error_text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Reply { .. } => None,
            TurnOutcome::Error { error } => Some(error),
        }
    }
}

/// What the first model call asked for, as an inspectable value rather
/// than control flow by fault.
enum FirstPass {
    /// Plain text, fallback already substituted.
    Direct(String),
    /// A fixed user-visible message that ends the turn.
    Terminal(String),
    /// A validated request to run the lookup function.
    Lookup { call: FunctionCall, spec: LookupSpec },
}

/// Drives one user turn end to end.
pub struct Orchestrator {
    provider: Arc<dyn ChatProvider>,
    store: Arc<ChatStore>,
    translator: Arc<LookupTranslator>,
    history_limit: u64,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: Arc<ChatStore>,
        translator: Arc<LookupTranslator>,
    ) -> Self {
        Self {
            provider,
            store,
            translator,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: u64) -> Self {
        self.history_limit = limit;
        self
    }

    /// Process one user turn.
    ///
    /// With a session identifier, history is loaded and both sides of the
    /// exchange are persisted. Without one, the turn is ephemeral: the full
    /// protocol still runs, but nothing is validated or stored.
    pub async fn process_turn(
        &self,
        user_query: &str,
        session_id: Option<&str>,
        user: Option<&str>,
    ) -> TurnOutcome {
        info!(
            session_id = session_id.unwrap_or("<ephemeral>"),
            user = user.unwrap_or("anonymous"),
            "Processing turn"
        );

        let Some(raw_id) = session_id else {
            return self.process_ephemeral_turn(user_query).await;
        };

        // ValidateSession: resolve before anything is persisted.
        let sid = match Uuid::parse_str(raw_id) {
            Ok(sid) => sid,
            Err(_) => return TurnOutcome::error(INVALID_SESSION_REPLY),
        };
        match self.fetch_session(sid).await {
            Ok(Some(_)) => {}
            Ok(None) => return TurnOutcome::error(INVALID_SESSION_REPLY),
            Err(err) => {
                error!(session_id = %sid, error = %err, "Session validation failed");
                return TurnOutcome::reply(INTERNAL_ERROR_REPLY);
            }
        }

        match self.run_turn(sid, user_query).await {
            Ok(reply) => TurnOutcome::reply(reply),
            Err(err) => {
                error!(session_id = %sid, error = %err, "Turn failed");
                // Full detail goes to the transcript for operators; the
                // caller only ever sees the generic reply.
                let diagnostic = format!("An error occurred: {}", err);
                if let Err(persist_err) = self
                    .append(sid, MessageRole::Assistant, Some(diagnostic))
                    .await
                {
                    warn!(session_id = %sid, error = %persist_err, "Failed to persist diagnostic");
                }
                TurnOutcome::reply(INTERNAL_ERROR_REPLY)
            }
        }
    }

    /// One session-bound turn: history, buffer, protocol, persistence.
    async fn run_turn(&self, sid: Uuid, user_query: &str) -> Result<String, ChatError> {
        let history = self.load_history(sid).await?;

        let mut buffer = Vec::with_capacity(history.len() + 4);
        buffer.push(ChatTurn::system(prompt::build_system_prompt()));
        for msg in &history {
            let content = msg.content.clone().unwrap_or_default();
            buffer.push(match msg.role {
                MessageRole::User => ChatTurn::user(content),
                MessageRole::Assistant => ChatTurn::assistant(content),
            });
        }
        buffer.push(ChatTurn::user(user_query));

        // Persist the question before the provider call so an outage
        // cannot lose it.
        self.append(sid, MessageRole::User, Some(user_query.to_string()))
            .await?;

        let reply = self.drive_protocol(buffer).await?;

        self.append(sid, MessageRole::Assistant, Some(reply.clone()))
            .await?;
        Ok(reply)
    }

    /// The ephemeral mode: no validation, no history, no persistence.
    async fn process_ephemeral_turn(&self, user_query: &str) -> TurnOutcome {
        let buffer = vec![
            ChatTurn::system(prompt::build_system_prompt()),
            ChatTurn::user(user_query),
        ];
        match self.drive_protocol(buffer).await {
            Ok(reply) => TurnOutcome::reply(reply),
            Err(err) => {
                error!(error = %err, "Ephemeral turn failed");
                TurnOutcome::reply(INTERNAL_ERROR_REPLY)
            }
        }
    }

    /// The two-pass function-calling protocol over an assembled buffer.
    ///
    /// Returns the final reply text; terminal dispatch failures come back
    /// as that text, translator failures are folded into the conversation.
    async fn drive_protocol(&self, mut buffer: Vec<ChatTurn>) -> Result<String, ChatError> {
        let functions = [prompt::lookup_function()];

        let first = self.provider.complete(&buffer, &functions).await?;

        let (call, spec) = match classify_first_pass(first) {
            FirstPass::Direct(text) | FirstPass::Terminal(text) => return Ok(text),
            FirstPass::Lookup { call, spec } => (call, spec),
        };

        debug!(function = %call.name, "Dispatching lookup");
        let result = self.run_lookup(spec).await?;

        // The assistant's request and the serialized result both join the
        // buffer so the model can reason over what it asked for.
        let function_name = call.name.clone();
        buffer.push(ChatTurn::function_call(call));
        buffer.push(ChatTurn::function_result(function_name, result.to_string()));

        let second = self.provider.complete(&buffer, &functions).await?;
        Ok(second
            .content
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NO_FINAL_ANSWER_FALLBACK.to_string()))
    }

    // -- Store and translator calls, offloaded off the async path --

    async fn fetch_session(&self, sid: Uuid) -> Result<Option<ChatSession>, ChatError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.get_session(sid)).await??)
    }

    async fn load_history(&self, sid: Uuid) -> Result<Vec<StoredMessage>, ChatError> {
        let store = Arc::clone(&self.store);
        let limit = self.history_limit;
        Ok(
            tokio::task::spawn_blocking(move || store.load_recent_history(sid, limit))
                .await??,
        )
    }

    async fn append(
        &self,
        sid: Uuid,
        role: MessageRole,
        content: Option<String>,
    ) -> Result<StoredMessage, ChatError> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || {
            store.append_message(sid, role, content.as_deref())
        })
        .await??)
    }

    async fn run_lookup(&self, spec: LookupSpec) -> Result<Value, ChatError> {
        let translator = Arc::clone(&self.translator);
        Ok(tokio::task::spawn_blocking(move || translator.execute(&spec)).await?)
    }
}

/// Classify the first model reply into an inspectable dispatch decision.
fn classify_first_pass(reply: ProviderReply) -> FirstPass {
    let Some(call) = reply.function_call else {
        let text = reply.content.unwrap_or_default();
        if text.trim().is_empty() {
            return FirstPass::Direct(EMPTY_REPLY_FALLBACK.to_string());
        }
        return FirstPass::Direct(text);
    };

    let raw = if call.arguments.is_empty() {
        "{}"
    } else {
        call.arguments.as_str()
    };
    let args: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return FirstPass::Terminal(INVALID_JSON_ARGS_REPLY.to_string()),
    };
    if !args.is_object() {
        return FirstPass::Terminal(NON_OBJECT_ARGS_REPLY.to_string());
    }
    if call.name != prompt::LOOKUP_FUNCTION_NAME {
        return FirstPass::Terminal(format!("Unknown function: {}", call.name));
    }

    // The argument may nest the spec under `lookup_spec` or be the spec
    // itself.
    let spec_source = args.get("lookup_spec").cloned().unwrap_or(args);
    FirstPass::Lookup {
        spec: LookupSpec::from_value(&spec_source),
        call,
    }
}

// =============================================================================
// Tests
// =============================================================================
