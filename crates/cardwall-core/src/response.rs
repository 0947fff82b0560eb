use serde::{Deserialize, Serialize};

/// Machine-checkable error codes the engine emits.
pub mod codes {
    pub const PROVIDER_CHECKLIST: &str = "PROVIDER.CHECKLIST";
    pub const GATE_WIP: &str = "GATE.WIP";
    pub const GATE_PR_REQUIRED: &str = "GATE.PR_REQUIRED";
    pub const GATE_FAILURES: &str = "GATE.FAILURES";
    pub const CARD_NOT_FOUND: &str = "CARD.NOT_FOUND";
    pub const CARD_NOT_ON_BOARD: &str = "CARD.NOT_ON_BOARD";
    pub const CARD_EXISTS: &str = "CARD.EXISTS";
    pub const CARD_INVALID: &str = "CARD.INVALID";
    pub const STATUS_UNSUPPORTED: &str = "STATUS.UNSUPPORTED";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            recoverable,
            suggested_action: None,
            details: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
