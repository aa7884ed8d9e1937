//! Message Types
//!
//! Types flowing into the fan-out (the caller's compare request and the
//! shared per-invocation backend request) and out of it (the NDJSON records
//! that make up the merged stream).
//!
//! # Wire Format
//!
//! Every [`OutputRecord`] is rendered as one JSON object per line:
//!
//! ```text
//! {"type":"chunk","model":"m1","data":"He"}
//! {"type":"chunk","model":"m1","data":"llo"}
//! {"type":"end","model":"m1"}
//! {"type":"error","model":"m2","error":"Service Unavailable"}
//! ```

use serde::{Deserialize, Serialize};

/// Temperature used when the caller does not send one
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Conversation
// ============================================================================

/// Role of a conversation message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message written by the user
    User,
    /// System instructions
    System,
    /// Prior model output
    Assistant,
}

/// One role-tagged message of the shared conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an explicit role
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A comparison request as sent by the caller
///
/// Missing `messages` or `models` deserialize as empty lists so that
/// validation reports them rather than the JSON parser.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    /// Conversation sent to every backend
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Backend identifiers, one worker each
    #[serde(default)]
    pub models: Vec<String>,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens per backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl CompareRequest {
    /// Create a request for the given conversation and models
    pub fn new(messages: Vec<ChatMessage>, models: Vec<String>) -> Self {
        Self {
            messages,
            models,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// The read-only request shared by every worker of one invocation
#[derive(Clone, Debug, PartialEq)]
pub struct BackendRequest {
    /// Conversation payload
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: Option<u32>,
    /// Referer of the original caller, forwarded upstream
    pub referer: Option<String>,
}

impl BackendRequest {
    /// Build the shared request from a caller request
    pub fn from_compare(request: &CompareRequest, referer: Option<String>) -> Self {
        Self {
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            referer,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// One record of the merged output stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputRecord {
    /// Incremental text from a backend
    Chunk {
        /// Backend identifier
        model: String,
        /// Text delta
        data: String,
    },
    /// Backend finished normally
    End {
        /// Backend identifier
        model: String,
    },
    /// Backend failure (or one undecodable event)
    Error {
        /// Backend identifier
        model: String,
        /// Human-readable description
        error: String,
    },
}

impl OutputRecord {
    /// Create a chunk record
    pub fn chunk(model: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Chunk {
            model: model.into(),
            data: data.into(),
        }
    }

    /// Create an end record
    pub fn end(model: impl Into<String>) -> Self {
        Self::End {
            model: model.into(),
        }
    }

    /// Create an error record
    pub fn error(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            model: model.into(),
            error: error.into(),
        }
    }

    /// The backend this record belongs to
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::Chunk { model, .. } | Self::End { model } | Self::Error { model, .. } => model,
        }
    }

    /// Whether this record ends the backend's contribution
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End { .. })
    }

    /// Render as a single NDJSON line (terminator included)
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Terminal state of one worker, kept for logs and reports
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream body exhausted and `end` emitted
    Completed,
    /// Connection or mid-stream failure
    Failed(String),
    /// Upstream answered with a non-success status
    UpstreamRejected {
        /// HTTP status code
        status: u16,
        /// Response body (or status reason)
        body: String,
    },
    /// The caller went away before the worker finished
    Cancelled,
}

impl std::fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::UpstreamRejected { status, body } => {
                write!(f, "upstream rejected ({status}): {body}")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compare_request_defaults() {
        let request: CompareRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"models":["m1"]}"#,
        )
        .unwrap();

        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
        assert_eq!(request.models, vec!["m1".to_string()]);
        assert!((request.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, None);
    }

    #[test]
    fn test_compare_request_camel_case_max_tokens() {
        let request: CompareRequest = serde_json::from_str(
            r#"{"messages":[],"models":[],"temperature":0.2,"maxTokens":256}"#,
        )
        .unwrap();

        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, Some(256));
    }

    #[test]
    fn test_compare_request_missing_fields_are_empty() {
        let request: CompareRequest = serde_json::from_str("{}").unwrap();
        assert!(request.messages.is_empty());
        assert!(request.models.is_empty());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_record_wire_shapes() {
        assert_eq!(
            OutputRecord::chunk("m1", "He").to_ndjson().unwrap(),
            "{\"type\":\"chunk\",\"model\":\"m1\",\"data\":\"He\"}\n"
        );
        assert_eq!(
            OutputRecord::end("m1").to_ndjson().unwrap(),
            "{\"type\":\"end\",\"model\":\"m1\"}\n"
        );
        assert_eq!(
            OutputRecord::error("m2", "boom").to_ndjson().unwrap(),
            "{\"type\":\"error\",\"model\":\"m2\",\"error\":\"boom\"}\n"
        );
    }

    #[test]
    fn test_ndjson_escapes_newlines_in_text() {
        let line = OutputRecord::chunk("m", "a\nb").to_ndjson().unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_backend_request_from_compare() {
        let request = CompareRequest::new(vec![ChatMessage::system("be brief")], vec!["m".into()])
            .with_temperature(0.1)
            .with_max_tokens(32);

        let shared = BackendRequest::from_compare(&request, Some("http://localhost".into()));
        assert_eq!(shared.messages, request.messages);
        assert_eq!(shared.max_tokens, Some(32));
        assert_eq!(shared.referer.as_deref(), Some("http://localhost"));
    }
}
