//! Wire types for the provider conversation protocol.
//!
//! A turn's conversation buffer is an ordered list of role-tagged entries.
//! The transient function role exists only here; persistence stores user
//! and assistant turns exclusively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tally_core::error::Result;

/// Conversation-buffer roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

/// A function-call request produced by the model.
///
/// `arguments` is the raw JSON-string payload exactly as the provider sent
/// it; parsing (and parse failures) belong to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// One entry in a turn's conversation buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    /// Serialized as an explicit null for function-call entries, which
    /// chat-completions endpoints require.
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    /// The assistant entry that requested a function call.
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            function_call: Some(call),
        }
    }

    /// The function-result entry fed back so the model can finalize.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
            function_call: None,
        }
    }
}

/// A callable capability advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What the model returned: optional text, optional function-call request.
#[derive(Debug, Clone, Default)]
pub struct ProviderReply {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
}

/// The seam between orchestration and the model provider.
///
/// One blocking-at-the-network-level request per call; at most two calls
/// per turn. Implementations must be safe to share across concurrent turns.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        functions: &[FunctionDecl],
    ) -> Result<ProviderReply>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::System).unwrap(), json!("system"));
        assert_eq!(
            serde_json::to_value(Role::Function).unwrap(),
            json!("function")
        );
    }

    #[test]
    fn test_user_turn_wire_shape() {
        let turn = ChatTurn::user("show me pending orders");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({"role": "user", "content": "show me pending orders"})
        );
    }

    #[test]
    fn test_function_call_turn_has_null_content() {
        let turn = ChatTurn::function_call(FunctionCall {
            name: "run_sql_query".to_string(),
            arguments: "{\"lookup_spec\":{}}".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({
                "role": "assistant",
                "content": null,
                "function_call": {
                    "name": "run_sql_query",
                    "arguments": "{\"lookup_spec\":{}}"
                }
            })
        );
    }

    #[test]
    fn test_function_result_turn_wire_shape() {
        let turn = ChatTurn::function_result("run_sql_query", "[]");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({
                "role": "function",
                "name": "run_sql_query",
                "content": "[]"
            })
        );
    }

    #[test]
    fn test_function_call_arguments_default_to_empty() {
        let call: FunctionCall =
            serde_json::from_value(json!({"name": "run_sql_query"})).unwrap();
        assert_eq!(call.name, "run_sql_query");
        assert_eq!(call.arguments, "");
    }
}
