//! Tool discovery and direct-invocation routes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::llm::tools::portfolio_tools;
use crate::services::tools::{self, ToolError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ToolTestRequest {
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn tool_error_to_status(err: &ToolError) -> StatusCode {
    match err {
        ToolError::UnknownTool(_) => StatusCode::NOT_FOUND,
        ToolError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
        ToolError::Execution(_) => StatusCode::BAD_GATEWAY,
    }
}

/// `GET /tools` — list the callable tools.
pub async fn list_tools() -> Json<serde_json::Value> {
    let tools: Vec<serde_json::Value> = portfolio_tools()
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.input_schema,
            })
        })
        .collect();

    Json(json!({
        "total_tools": tools.len(),
        "tools": tools,
    }))
}

/// `POST /tools/test` — invoke one tool directly, bypassing the model.
pub async fn test_tool(
    State(state): State<AppState>,
    Json(body): Json<ToolTestRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match tools::execute_tool(&state, None, &body.tool_name, &body.arguments).await {
        Ok(result) => Ok(Json(json!({
            "tool_name": body.tool_name,
            "result": result,
        }))),
        Err(e) => Err((
            tool_error_to_status(&e),
            Json(json!({ "error": "tool_failed", "message": e.to_string() })),
        )),
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
