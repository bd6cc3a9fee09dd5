//! The terminal value of a run: free text or a structured JSON value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::{Message, Part};

/// What a finished run (live or replayed) produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RunOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl RunOutput {
    /// Text output, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Structured output, if this is one.
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Deserialize the output into a typed value.
    ///
    /// Text output is tried as a JSON document first, then as a plain
    /// JSON string, so `parse::<String>()` works on any text.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Structured(value) => T::deserialize(value),
            Self::Text(text) => serde_json::from_str(strip_code_fences(text))
                .or_else(|_| T::deserialize(serde_json::Value::String(text.clone()))),
        }
    }

    /// Take the output from the last response turn of a history.
    ///
    /// If the turn has any text part, even an empty one, the text parts
    /// concatenated are the output. Otherwise the last tool call's
    /// arguments (`null` or absent becomes `{}`); a response with
    /// neither, or no response at all, yields empty text.
    pub fn from_history(messages: &[Message]) -> Result<Self, serde_json::Error> {
        let Some(last) = messages.iter().rev().find(|m| m.is_response()) else {
            return Ok(Self::Text(String::new()));
        };

        if last.parts().iter().any(|p| matches!(p, Part::Text { .. })) {
            return Ok(Self::Text(last.text()));
        }

        match last.tool_calls().last() {
            Some(call) => Ok(Self::Structured(call.parsed_arguments()?)),
            None => Ok(Self::Text(String::new())),
        }
    }
}

impl std::fmt::Display for RunOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

/// Strip a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Part, ToolCallPart};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        answer: String,
    }

    #[test]
    fn text_parts_concatenate() {
        let history = vec![
            Message::user("q"),
            Message::response(vec![Part::text("a"), Part::text("b")]),
        ];
        assert_eq!(RunOutput::from_history(&history).unwrap(), RunOutput::Text("ab".into()));
    }

    #[test]
    fn tool_call_arguments_become_structured() {
        let history = vec![Message::response(vec![Part::ToolCall(ToolCallPart::new(
            "final_result",
            serde_json::json!(r#"{"answer":"42"}"#),
            "c1",
        ))])];
        let output = RunOutput::from_history(&history).unwrap();
        assert_eq!(output, RunOutput::Structured(serde_json::json!({"answer": "42"})));
        assert_eq!(output.parse::<Answer>().unwrap().answer, "42");

        let null_args = vec![Message::response(vec![Part::ToolCall(ToolCallPart::new(
            "final_result",
            serde_json::Value::Null,
            "c1",
        ))])];
        assert_eq!(
            RunOutput::from_history(&null_args).unwrap(),
            RunOutput::Structured(serde_json::json!({}))
        );
    }

    #[test]
    fn empty_history_is_empty_text() {
        assert_eq!(RunOutput::from_history(&[]).unwrap(), RunOutput::Text(String::new()));
        let only_request = vec![Message::user("q")];
        assert_eq!(RunOutput::from_history(&only_request).unwrap(), RunOutput::Text(String::new()));
    }

    #[test]
    fn parse_text_output() {
        let fenced = RunOutput::Text("```json\n{\"answer\": \"yes\"}\n```".into());
        assert_eq!(fenced.parse::<Answer>().unwrap().answer, "yes");

        let plain = RunOutput::Text("just words".into());
        assert_eq!(plain.parse::<String>().unwrap(), "just words");
        assert!(plain.parse::<Answer>().is_err());
    }

    #[test]
    fn fences() {
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        // Unterminated fence is left alone
        assert_eq!(strip_code_fences("```json\n{}"), "```json\n{}");
    }
}
