//! Verifiers that ship with the runner. Cryptographic verification of JOSE
//! payloads is left to verifiers registered by the caller; these only check
//! shape and content.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;

use crate::domain::{fields, CaseRecord, HttpResponse};
use crate::engine::registry::{Registry, Verifier};
use crate::error::{CaseError, RegistryError};

pub const COMPACT_SHAPE: &str = "verifyCompactShape";
pub const JSON_SUBSET: &str = "verifyJsonSubset";

pub fn register_builtin(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register_verifier(COMPACT_SHAPE, CompactShapeVerifier)?;
    registry.register_verifier(JSON_SUBSET, JsonSubsetVerifier)?;
    Ok(())
}

/// Accepts a compact JWS (3 segments) or JWE (5 segments) whose protected
/// header decodes to a JSON object.
///
/// Only the shape is checked. Signature verification and decryption need a
/// verifier registered by the caller under its own name, typically one that
/// reads the key from the case's `certFileName` or `privateCertFileName`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactShapeVerifier;

#[async_trait]
impl Verifier for CompactShapeVerifier {
    async fn verify(
        &self,
        case: &mut CaseRecord,
        response: &HttpResponse,
    ) -> Result<bool, CaseError> {
        if !response.is_compact_token() {
            append_verify_message(
                case,
                &format!("Expected a compact token, got `{}`.", response.content_type),
            );
            return Ok(false);
        }

        let segments: Vec<&str> = response.text.trim().split('.').collect();
        let kind = match segments.len() {
            3 => "JWS",
            5 => "JWE",
            count => {
                append_verify_message(case, &format!("Compact token has {count} segments."));
                return Ok(false);
            }
        };

        let header = URL_SAFE_NO_PAD
            .decode(segments[0])
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
            .filter(Value::is_object);

        match header {
            Some(header) => {
                append_verify_message(case, &format!("{kind} protected header::: {header}"));
                Ok(true)
            }
            None => {
                append_verify_message(case, &format!("{kind} protected header is not valid JSON."));
                Ok(false)
            }
        }
    }
}

/// Every field of the case's `expectedResponse` must appear, with an equal
/// value, in the structured response body. Extra response fields are fine.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSubsetVerifier;

#[async_trait]
impl Verifier for JsonSubsetVerifier {
    async fn verify(
        &self,
        case: &mut CaseRecord,
        response: &HttpResponse,
    ) -> Result<bool, CaseError> {
        let Some(expected) = case.get(fields::EXPECTED_RESPONSE).cloned() else {
            return Err(CaseError::Configuration(format!(
                "Property '{}' is required by {JSON_SUBSET}.",
                fields::EXPECTED_RESPONSE
            )));
        };

        let actual = match response.structured_body() {
            Some(body) => body.clone(),
            None => serde_json::from_str(&response.text).unwrap_or(Value::Null),
        };

        match first_mismatch(&expected, &actual, "$") {
            None => Ok(true),
            Some(path) => {
                append_verify_message(case, &format!("Response differs from expectation at {path}."));
                Ok(false)
            }
        }
    }
}

fn first_mismatch(expected: &Value, actual: &Value, path: &str) -> Option<String> {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected.iter().find_map(|(key, value)| {
            let child = format!("{path}.{key}");
            match actual.get(key) {
                Some(found) => first_mismatch(value, found, &child),
                None => Some(child),
            }
        }),
        (Value::Array(expected), Value::Array(actual)) => {
            if expected.len() != actual.len() {
                return Some(path.to_string());
            }
            expected
                .iter()
                .zip(actual)
                .enumerate()
                .find_map(|(index, (value, found))| {
                    first_mismatch(value, found, &format!("{path}[{index}]"))
                })
        }
        (expected, actual) if expected == actual => None,
        _ => Some(path.to_string()),
    }
}

fn append_verify_message(case: &mut CaseRecord, message: &str) {
    let mut current = case
        .str_field(fields::VERIFY_MESSAGE)
        .unwrap_or_default()
        .to_string();
    current.push_str(message);
    current.push('\n');
    case.set(fields::VERIFY_MESSAGE, current);
}
