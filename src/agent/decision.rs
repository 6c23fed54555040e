//! Decision payload parsing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AgentError;

/// Fields every decision must carry
const REQUIRED_FIELDS: [&str; 3] = ["thought", "tool", "parameter"];

/// The agent's structured reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Text shown (and optionally spoken) to the user
    pub thought: String,
    /// Tool name, e.g. `OPEN_APP` or `CHAT`
    pub tool: String,
    /// String, object or null
    pub parameter: Value,
    /// Which routed agent answered
    #[serde(default = "unknown_agent")]
    pub agent: String,
}

fn unknown_agent() -> String {
    "UNKNOWN".to_string()
}

/// Parse the agent's answer text into a [`Decision`]
///
/// Accepts answers wrapped in a Markdown code fence.
pub fn parse_decision(answer: &str) -> Result<Decision, AgentError> {
    let cleaned = strip_code_fence(answer);

    let object: Map<String, Value> = serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = answer.chars().take(200).collect();
        AgentError::Malformed(format!("invalid JSON ({}): {}", e, preview))
    })?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(AgentError::Malformed(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    serde_json::from_value(Value::Object(object))
        .map_err(|e| AgentError::Malformed(e.to_string()))
}

fn strip_code_fence(answer: &str) -> &str {
    let mut cleaned = answer.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_decision() {
        let decision = parse_decision(
            r#"{"thought":"Opening Chrome","tool":"OPEN_APP","parameter":"chrome"}"#,
        )
        .unwrap();
        assert_eq!(decision.thought, "Opening Chrome");
        assert_eq!(decision.tool, "OPEN_APP");
        assert_eq!(decision.parameter, Value::String("chrome".into()));
        assert_eq!(decision.agent, "UNKNOWN");
    }

    #[test]
    fn test_parse_fenced_decision_with_object_parameter() {
        let answer = "```json\n{\"thought\":\"Copying\",\"tool\":\"COPY_FILE\",\
                      \"parameter\":{\"source\":\"a\",\"destination\":\"b\"},\"agent\":\"FILES\"}\n```";
        let decision = parse_decision(answer).unwrap();
        assert_eq!(decision.tool, "COPY_FILE");
        assert_eq!(decision.parameter["destination"], "b");
        assert_eq!(decision.agent, "FILES");
    }

    #[test]
    fn test_null_parameter_is_accepted() {
        let decision =
            parse_decision(r#"{"thought":"Hi!","tool":"CHAT","parameter":null}"#).unwrap();
        assert!(decision.parameter.is_null());
    }

    #[test]
    fn test_missing_parameter_is_malformed() {
        let err = parse_decision(r#"{"thought":"Hi","tool":"CHAT"}"#).unwrap_err();
        assert!(matches!(err, AgentError::Malformed(msg) if msg.contains("parameter")));
    }

    #[test]
    fn test_non_json_is_malformed() {
        let err = parse_decision("I think you should open chrome").unwrap_err();
        assert!(matches!(err, AgentError::Malformed(_)));
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let err = parse_decision(r#"{"thought":5,"tool":"CHAT","parameter":null}"#).unwrap_err();
        assert!(matches!(err, AgentError::Malformed(_)));
    }
}
