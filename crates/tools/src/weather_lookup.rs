//! Weather lookup tool: deterministic mock weather.
//!
//! Returns plausible weather derived from a hash of the city name so every
//! loop can be exercised end-to-end without network access. The sandbox
//! definition computes the same hash, so code-execution runs see the same
//! data as direct tool calls.

use async_trait::async_trait;
use agentflow_core::error::ToolError;
use agentflow_core::tool::{Tool, ToolResult};
use serde::Serialize;

pub struct WeatherLookupTool;

const CONDITIONS: [&str; 8] = [
    "Clear skies",
    "Partly cloudy",
    "Overcast",
    "Light rain",
    "Heavy rain",
    "Thunderstorms",
    "Snow",
    "Foggy",
];

const SANDBOX_SOURCE: &str = r#"def get_weather(city, units="metric"):
    """Look up current weather for a city."""
    conditions = ["Clear skies", "Partly cloudy", "Overcast", "Light rain",
                  "Heavy rain", "Thunderstorms", "Snow", "Foggy"]
    h = 0
    for b in str(city).encode("utf-8"):
        h = (h * 31 + b) & 0xFFFFFFFF
    temp = float(h % 40) - 5.0
    label = "°C"
    if units == "imperial":
        temp = temp * 9.0 / 5.0 + 32.0
        label = "°F"
    return {
        "city": str(city),
        "temperature": round(temp * 10.0) / 10.0,
        "units": label,
        "conditions": conditions[(h // 7) % len(conditions)],
        "humidity": 30 + h % 60,
    }
"#;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Look up current weather conditions for a city. Returns temperature, conditions and humidity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city to look up weather for"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)",
                    "default": "metric"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = arguments["city"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'city' argument".into()))?;

        let units = arguments["units"].as_str().unwrap_or("metric");
        let weather = mock_weather(city, units);
        let data = serde_json::to_value(&weather).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_weather".into(),
            reason: e.to_string(),
        })?;
        let output = format!(
            "{}: {}{}, {}, humidity {}%",
            weather.city, weather.temperature, weather.units, weather.conditions, weather.humidity
        );

        Ok(ToolResult::ok(output).with_data(data))
    }

    fn sandbox_source(&self) -> Option<String> {
        Some(SANDBOX_SOURCE.to_string())
    }
}

#[derive(Debug, Serialize)]
struct WeatherData {
    city: String,
    temperature: f64,
    units: &'static str,
    conditions: &'static str,
    humidity: u32,
}

fn mock_weather(city: &str, units: &str) -> WeatherData {
    let hash: u32 = city
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));

    let base_temp_c = f64::from(hash % 40) - 5.0;
    let (temperature, units) = if units == "imperial" {
        (base_temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (base_temp_c, "°C")
    };

    WeatherData {
        city: city.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units,
        conditions: CONDITIONS[(hash as usize / 7) % CONDITIONS.len()],
        humidity: 30 + hash % 60,
    }
}
