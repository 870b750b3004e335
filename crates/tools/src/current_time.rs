//! Current time tool.

use agentflow_core::error::ToolError;
use agentflow_core::tool::{BlockingTool, ToolResult};
use chrono::{FixedOffset, Utc};

pub struct CurrentTimeTool;

const SANDBOX_SOURCE: &str = r#"def current_time(utc_offset_hours=0):
    """Return the current time as an ISO 8601 string."""
    import datetime
    tz = datetime.timezone(datetime.timedelta(hours=float(utc_offset_hours)))
    return datetime.datetime.now(tz).isoformat()
"#;

impl BlockingTool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time as an ISO 8601 string, optionally shifted to a UTC offset."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "number",
                    "description": "Offset from UTC in hours, e.g. 8 for Beijing (default: 0)",
                    "default": 0
                }
            }
        })
    }

    fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let hours = match &arguments["utc_offset_hours"] {
            serde_json::Value::Null => 0.0,
            value => value.as_f64().ok_or_else(|| {
                ToolError::InvalidArguments("'utc_offset_hours' must be a number".into())
            })?,
        };

        if !(-14.0..=14.0).contains(&hours) {
            return Err(ToolError::InvalidArguments(format!(
                "utc offset {hours} is outside -14..=14"
            )));
        }

        let offset = FixedOffset::east_opt((hours * 3600.0).round() as i32)
            .ok_or_else(|| ToolError::InvalidArguments(format!("invalid utc offset {hours}")))?;
        let now = Utc::now().with_timezone(&offset);

        Ok(ToolResult::ok(now.to_rfc3339()).with_data(serde_json::json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
        })))
    }

    fn sandbox_source(&self) -> Option<String> {
        Some(SANDBOX_SOURCE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_utc() {
        let result = CurrentTimeTool.execute(serde_json::json!({})).unwrap();
        assert!(result.output.ends_with("+00:00"));
    }

    #[test]
    fn applies_offset() {
        let result = CurrentTimeTool
            .execute(serde_json::json!({"utc_offset_hours": 8}))
            .unwrap();
        assert!(result.output.ends_with("+08:00"));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        assert!(CurrentTimeTool.execute(serde_json::json!({"utc_offset_hours": 30})).is_err());
        assert!(CurrentTimeTool.execute(serde_json::json!({"utc_offset_hours": "eight"})).is_err());
    }
}
