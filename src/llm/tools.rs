//! Tool definitions offered to the model during chat.
//!
//! Execution lives in `services::tools`; this module only describes the
//! callable surface (names, descriptions, JSON-schema parameters) in the
//! shape both provider APIs accept.

use super::types::Tool;

/// Build the set of tools available to the portfolio chat agent.
#[must_use]
pub fn portfolio_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "get_current_time".into(),
            description: "Get the current date and time.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "timezone": { "type": "string", "description": "Timezone name; only 'UTC' is supported." }
                }
            }),
        },
        Tool {
            name: "calculate".into(),
            description: "Evaluate an arithmetic expression (+, -, *, /, parentheses).".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": { "type": "string", "description": "Expression to evaluate, e.g. '2 + 2 * 3'." }
                },
                "required": ["expression"]
            }),
        },
        Tool {
            name: "get_weather".into(),
            description: "Get current weather conditions for a location.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "City name, e.g. 'New York'." }
                },
                "required": ["location"]
            }),
        },
        Tool {
            name: "web_search".into(),
            description: "Search the web and return a short answer summary.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query." }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "set_reminder".into(),
            description: "Store a reminder that expires after the given delay.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "What to be reminded about." },
                    "minutes": { "type": "integer", "minimum": 1, "description": "Delay in minutes." }
                },
                "required": ["message", "minutes"]
            }),
        },
        Tool {
            name: "get_session_info".into(),
            description: "Summarize the current conversation session (id, message count, timestamps).".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_tools_are_defined() {
        let tools = portfolio_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get_current_time",
                "calculate",
                "get_weather",
                "web_search",
                "set_reminder",
                "get_session_info"
            ]
        );
    }

    #[test]
    fn schemas_are_objects_with_required_fields() {
        for tool in portfolio_tools() {
            assert_eq!(tool.input_schema["type"], "object", "{} schema", tool.name);
            assert!(!tool.description.is_empty());
        }
        let calc = portfolio_tools().into_iter().find(|t| t.name == "calculate").unwrap();
        assert_eq!(calc.input_schema["required"][0], "expression");
    }
}
