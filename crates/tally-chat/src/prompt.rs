//! System prompt and function schema for the retail assistant.
//!
//! The schema description is built live from the entity catalog so the
//! model only ever sees allow-listed models and fields.

use serde_json::json;

use tally_core::catalog::EntityKind;
use tally_provider::FunctionDecl;

/// The single function the model may request.
pub const LOOKUP_FUNCTION_NAME: &str = "run_sql_query";

/// Build the fixed system instructions plus the live schema description.
pub fn build_system_prompt() -> String {
    let models_info = EntityKind::ALL
        .iter()
        .map(|kind| format!("- {}: {}", kind.name(), kind.fields().join(", ")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an AI assistant for a retail application. \
         You have access to these data models:\n\
         {models_info}\n\n\
         Important instructions:\n\
         1. Interpret 'jobs' or 'job' as 'orders' in user queries.\n\
         2. If the user says 'delayed' or 'pending', interpret that as \
         {{\"status__iexact\": \"pending\"}}.\n\
         3. When the user asks about orders, default to model 'Order'.\n\
         4. When the user asks about order items, default to model 'OrderItem'.\n\
         5. When the user asks about customers, default to model 'Customer'.\n\
         6. When the user asks about products, default to model 'Product'.\n\
         7. If the user mentions a customer name (e.g. 'John'), use a filter like \
         {{\"customer__name__icontains\": \"john\"}}.\n\
         8. Whenever the user requests specific data, you MUST call 'run_sql_query'.\n\
         9. If the function_call result is an empty list (i.e., '[]'), respond with: \
         'No records found for your query.'\n\
         10. If the function_call result is not empty, summarize the results and \
         provide a relevant answer.\n\
         Use relevant fields from each model to craft the lookup. Only pick from \
         the known fields.\n\
         Steps:\n\
         1) If you need to call a function to do a database lookup, do so with \
         'run_sql_query' and provide:\n\
         \x20  - model\n\
         \x20  - filters\n\
         \x20  - fields\n\n\
         2) After receiving the function result, provide a final answer.\n\n\
         3) If a user references a non-existent field, interpret it in the \
         closest valid way.\n"
    )
}

/// The `run_sql_query` declaration advertised on both model calls.
pub fn lookup_function() -> FunctionDecl {
    FunctionDecl {
        name: LOOKUP_FUNCTION_NAME.to_string(),
        description: "Perform a dynamic database lookup based on a lookup specification."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "lookup_spec": {
                    "type": "object",
                    "description": "A lookup specification with keys: 'model', 'filters', and 'fields'. \
                        For example: {\"model\": \"Order\", \"filters\": {\"status\": \"delivered\"}, \
                        \"fields\": [\"id\", \"customer__name\", \"status\", \"created_at\"]}",
                }
            },
            "required": ["lookup_spec"],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_catalog_entity() {
        let prompt = build_system_prompt();
        for kind in EntityKind::ALL {
            assert!(prompt.contains(kind.name()), "missing {}", kind.name());
            for field in kind.fields() {
                assert!(prompt.contains(field), "missing field {}", field);
            }
        }
    }

    #[test]
    fn test_prompt_names_the_lookup_function() {
        assert!(build_system_prompt().contains(LOOKUP_FUNCTION_NAME));
    }

    #[test]
    fn test_lookup_function_declaration_shape() {
        let decl = lookup_function();
        assert_eq!(decl.name, LOOKUP_FUNCTION_NAME);
        assert_eq!(decl.parameters["type"], "object");
        assert_eq!(decl.parameters["required"][0], "lookup_spec");
        assert!(decl.parameters["properties"]["lookup_spec"]["description"]
            .as_str()
            .unwrap()
            .contains("model"));
    }
}
