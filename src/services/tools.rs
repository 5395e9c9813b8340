//! Tool execution — the local functions the model can call.
//!
//! DESIGN
//! ======
//! `execute_tool` dispatches by name to one async function per tool.
//! Results are plain strings: they go both onto the SSE channel (as
//! `tool_result` events) and back to the model (as `tool_result` content
//! blocks). The calculator is a small recursive descent parser so operator
//! precedence is honored without pulling in an expression crate.

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::clock::now_secs;
use crate::error::ErrorCode;
use crate::services::session;
use crate::state::AppState;
use crate::store::KvStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ErrorCode for ToolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "E_TOOL_UNKNOWN",
            Self::InvalidArguments(_) => "E_TOOL_ARGUMENTS",
            Self::Execution(_) => "E_TOOL_EXECUTION",
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Execute one tool call and return its result string.
///
/// # Errors
///
/// Returns [`ToolError`] for unknown tools, malformed arguments, or
/// execution failures; callers decide whether that is a 4xx (direct
/// invocation) or an `is_error` tool result (chat loop).
pub async fn execute_tool(
    state: &AppState,
    session_id: Option<&str>,
    tool_name: &str,
    input: &Value,
) -> Result<String, ToolError> {
    match tool_name {
        "get_current_time" => current_time(input),
        "calculate" => calculate(input),
        "get_weather" => get_weather(state, input).await,
        "web_search" => web_search(state, input).await,
        "set_reminder" => set_reminder(state, input).await,
        "get_session_info" => session_info(state, session_id).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn str_arg<'a>(input: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    input
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument: {name}")))
}

// =============================================================================
// get_current_time
// =============================================================================

fn current_time(input: &Value) -> Result<String, ToolError> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| ToolError::Execution(e.to_string()))?;

    let timezone = input.get("timezone").and_then(Value::as_str).unwrap_or("UTC");
    if timezone.eq_ignore_ascii_case("utc") {
        Ok(format!("Current time: {now} (UTC)"))
    } else {
        Ok(format!("Current time: {now} (UTC; timezone {timezone} not supported)"))
    }
}

// =============================================================================
// calculate
// =============================================================================

fn calculate(input: &Value) -> Result<String, ToolError> {
    let expression = str_arg(input, "expression")?;
    let value = eval_expression(expression).map_err(ToolError::Execution)?;
    Ok(format_number(value))
}

/// Render without a trailing `.0` when the value is (numerically) whole.
fn format_number(value: f64) -> String {
    if value.is_finite() && (value - value.round()).abs() < 1e-9 && value.abs() < 1e15 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression: `+ - * /`, unary minus, parentheses,
/// float literals. Standard precedence via recursive descent.
fn eval_expression(input: &str) -> Result<f64, String> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut pos = 0;
    let value = parse_sum(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("unexpected character '{}' at position {pos}", tokens[pos]));
    }
    Ok(value)
}

/// sum := product (('+' | '-') product)*
fn parse_sum(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_product(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '+' => {
                *pos += 1;
                value += parse_product(tokens, pos)?;
            }
            '-' => {
                *pos += 1;
                value -= parse_product(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

/// product := factor (('*' | '/') factor)*
fn parse_product(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(&op) = tokens.get(*pos) {
        match op {
            '*' => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            '/' => {
                *pos += 1;
                let divisor = parse_factor(tokens, pos)?;
                if divisor == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= divisor;
            }
            _ => break,
        }
    }
    Ok(value)
}

/// factor := '-' factor | '(' sum ')' | number
fn parse_factor(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    match tokens.get(*pos) {
        Some('-') => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        Some('(') => {
            *pos += 1;
            let value = parse_sum(tokens, pos)?;
            if tokens.get(*pos) != Some(&')') {
                return Err("missing closing parenthesis".to_string());
            }
            *pos += 1;
            Ok(value)
        }
        Some(c) if c.is_ascii_digit() || *c == '.' => parse_number(tokens, pos),
        Some(c) => Err(format!("unexpected character '{c}' at position {pos}", pos = *pos)),
        None => Err("unexpected end of expression".to_string()),
    }
}

fn parse_number(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let start = *pos;
    while tokens
        .get(*pos)
        .is_some_and(|c| c.is_ascii_digit() || *c == '.')
    {
        *pos += 1;
    }
    let literal: String = tokens[start..*pos].iter().collect();
    literal
        .parse::<f64>()
        .map_err(|_| format!("invalid number '{literal}'"))
}

// =============================================================================
// get_weather
// =============================================================================

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

async fn get_weather(state: &AppState, input: &Value) -> Result<String, ToolError> {
    let location = str_arg(input, "location")?;

    let geo: Value = state
        .http
        .get(GEOCODING_URL)
        .query(&[("name", location), ("count", "1")])
        .send()
        .await
        .map_err(|e| ToolError::Execution(format!("geocoding request failed: {e}")))?
        .json()
        .await
        .map_err(|e| ToolError::Execution(format!("geocoding response malformed: {e}")))?;

    let Some(place) = geo
        .get("results")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Ok(format!("No location named \"{location}\" was found."));
    };
    let latitude = place.get("latitude").and_then(Value::as_f64).unwrap_or(0.0);
    let longitude = place.get("longitude").and_then(Value::as_f64).unwrap_or(0.0);
    let name = place.get("name").and_then(Value::as_str).unwrap_or(location);
    let country = place.get("country").and_then(Value::as_str).unwrap_or("");

    let forecast: Value = state
        .http
        .get(FORECAST_URL)
        .query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current", "temperature_2m,wind_speed_10m,weather_code".to_string()),
        ])
        .send()
        .await
        .map_err(|e| ToolError::Execution(format!("forecast request failed: {e}")))?
        .json()
        .await
        .map_err(|e| ToolError::Execution(format!("forecast response malformed: {e}")))?;

    let current = forecast.get("current").cloned().unwrap_or(Value::Null);
    let temperature = current.get("temperature_2m").and_then(Value::as_f64);
    let wind = current.get("wind_speed_10m").and_then(Value::as_f64);
    let code = current.get("weather_code").and_then(Value::as_u64);

    let Some(temperature) = temperature else {
        return Err(ToolError::Execution("forecast response missing current conditions".into()));
    };

    let mut summary = format!("{} in {name}", weather_code_label(code.unwrap_or(0)));
    if !country.is_empty() {
        summary.push_str(&format!(", {country}"));
    }
    summary.push_str(&format!(": {temperature}°C"));
    if let Some(wind) = wind {
        summary.push_str(&format!(", wind {wind} km/h"));
    }
    Ok(summary)
}

/// WMO weather interpretation codes, grouped.
fn weather_code_label(code: u64) -> &'static str {
    match code {
        0 => "Clear sky",
        1..=3 => "Partly cloudy",
        45 | 48 => "Fog",
        51..=57 => "Drizzle",
        61..=67 => "Rain",
        71..=77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95..=99 => "Thunderstorm",
        _ => "Unknown conditions",
    }
}

// =============================================================================
// web_search
// =============================================================================

const SEARCH_URL: &str = "https://api.duckduckgo.com/";

async fn web_search(state: &AppState, input: &Value) -> Result<String, ToolError> {
    let query = str_arg(input, "query")?;

    let response: Value = state
        .http
        .get(SEARCH_URL)
        .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
        .send()
        .await
        .map_err(|e| ToolError::Execution(format!("search request failed: {e}")))?
        .json()
        .await
        .map_err(|e| ToolError::Execution(format!("search response malformed: {e}")))?;

    let abstract_text = response
        .get("AbstractText")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let answer = response
        .get("Answer")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let related = response
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|t| t.get("Text"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    Ok(abstract_text
        .or(answer)
        .or(related)
        .map_or_else(|| format!("No results found for \"{query}\"."), str::to_owned))
}

// =============================================================================
// set_reminder
// =============================================================================

async fn set_reminder(state: &AppState, input: &Value) -> Result<String, ToolError> {
    let message = str_arg(input, "message")?;
    let minutes = input
        .get("minutes")
        .and_then(Value::as_u64)
        .filter(|m| *m >= 1)
        .ok_or_else(|| ToolError::InvalidArguments("minutes must be a positive integer".into()))?;

    let id = Uuid::new_v4();
    let due_at = now_secs() + i64::try_from(minutes * 60).unwrap_or(0);
    let record = serde_json::json!({
        "id": id,
        "message": message,
        "created_at": now_secs(),
        "due_at": due_at,
    });

    state
        .store
        .set_ex(&format!("reminder:{id}"), &record.to_string(), minutes * 60)
        .await
        .map_err(|e| ToolError::Execution(format!("could not store reminder: {e}")))?;

    Ok(format!("Reminder set for {minutes} minute(s) from now: \"{message}\""))
}

// =============================================================================
// get_session_info
// =============================================================================

async fn session_info(state: &AppState, session_id: Option<&str>) -> Result<String, ToolError> {
    let Some(session_id) = session_id else {
        return Ok("No active session — this conversation is not being recorded.".to_string());
    };

    match session::fetch_session(state.store.as_ref(), session_id).await {
        Ok(record) => Ok(serde_json::json!({
            "session_id": record.session_id,
            "message_count": record.messages.len(),
            "created_at": record.created_at,
            "last_activity": record.last_activity,
        })
        .to_string()),
        Err(session::SessionError::NotFound(_)) => {
            Ok(format!("Session {session_id} was not found (it may have expired)."))
        }
        Err(e) => Err(ToolError::Execution(e.to_string())),
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
