use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// ─── Defaults ─────────────────────────────────────────────────────────────────

/// Process-wide fallback values, set once per run. Session data lives here
/// too (e.g. a `session` object that replace rules read from).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultValueRecord(Map<String, Value>);

impl DefaultValueRecord {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

// ─── Replace Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceRule {
    /// Destination path on the case.
    pub property_name: String,
    /// Source path whose value is copied or templated into the destination.
    pub replace_value: String,
}

// ─── HTTP Types ───────────────────────────────────────────────────────────────

pub const COMPACT_TOKEN_CONTENT_TYPE: &str = "application/jose";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub content_type: String,
    /// Raw response text.
    pub text: String,
    /// Parsed body when the response is JSON.
    pub body: Option<Value>,
    pub time: u64,
}

impl HttpResponse {
    /// Compact JOSE tokens are served as `application/jose` and carried as
    /// text rather than a structured body.
    pub fn is_compact_token(&self) -> bool {
        media_type(&self.content_type).eq_ignore_ascii_case(COMPACT_TOKEN_CONTENT_TYPE)
    }

    pub fn structured_body(&self) -> Option<&Value> {
        self.body.as_ref().filter(|body| match body {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        })
    }
}

pub fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

pub fn is_json_content_type(content_type: &str) -> bool {
    let media = media_type(content_type).to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
    NegativePassed,
    NegativeMismatch,
}

impl CaseStatus {
    pub fn is_pass(self) -> bool {
        matches!(self, CaseStatus::Passed | CaseStatus::NegativePassed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseOutcome {
    pub id: String,
    pub description: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub total: u64,
    pub passed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub elapsed_ms: u64,
    pub cases: Vec<CaseOutcome>,
}
