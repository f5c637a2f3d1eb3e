use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The uniform envelope every handler returns (spec §6). `suggestions`
/// here are plain UX hints ("try scanNetwork first"), never `Suggestion`
/// tokens.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub success: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    pub fn ok(action: &str, data: impl Serialize) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            data: serde_json::to_value(data).ok(),
            error: None,
            suggestions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn ok_with_hint(action: &str, data: impl Serialize, hint: impl Into<String>) -> Self {
        let mut response = Self::ok(action, data);
        response.suggestions.push(hint.into());
        response
    }

    pub fn err(action: &str, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            data: None,
            error: Some(error.to_string()),
            suggestions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn err_with_hint(action: &str, error: impl std::fmt::Display, hint: impl Into<String>) -> Self {
        let mut response = Self::err(action, error);
        response.suggestions.push(hint.into());
        response
    }
}
