use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names the engine reads or writes on a case.
pub mod fields {
    pub const ID: &str = "id";
    pub const DESCRIPTION: &str = "description";

    pub const PARALLEL: &str = "parallel";
    pub const REPEATS: &str = "repeats";

    pub const HTTP_METHOD: &str = "httpMethod";
    pub const INVOKE_URL: &str = "invokeUrl";
    pub const HTTP_HEADERS: &str = "httpHeaders";
    pub const QUERY_STRING: &str = "queryString";
    pub const FORM_DATA: &str = "formData";
    pub const JSON_DATA: &str = "jsonData";
    pub const BASE64_DATA: &str = "base64Data";
    pub const TEXT_DATA: &str = "textData";
    pub const BINARY_DATA: &str = "binaryData";
    pub const MULTIPART_DATA: &str = "multiPartData";
    pub const IGNORE_SERVER_CERT: &str = "ignoreServerCert";
    pub const CA_CERT_FILE_NAME: &str = "caCertFileName";
    pub const TIMEOUT: &str = "timeout";

    pub const SIGNATURE: &str = "signature";
    pub const SIGNATURE_URL: &str = "signatureUrl";
    pub const AUTH_PREFIX: &str = "authPrefix";
    pub const APP_ID: &str = "appId";
    pub const SECRET: &str = "secret";
    pub const NONCE: &str = "nonce";
    pub const TIMESTAMP: &str = "timestamp";
    pub const PRIVATE_CERT_FILE_NAME: &str = "privateCertFileName";
    pub const PASSPHRASE: &str = "passphrase";
    pub const NEXT_HOP: &str = "nextHop";

    pub const SKIP_TEST: &str = "skipTest";
    pub const NEGATIVE_TEST: &str = "negativeTest";
    pub const DEBUG: &str = "debug";
    pub const SUPPRESS_MESSAGE: &str = "suppressMessage";
    pub const SHOW_ELAPSE_TIME: &str = "showElapseTime";
    pub const DELAY: &str = "delay";
    pub const TEST_ERROR_MESSAGE: &str = "testErrorMessage";

    pub const VERIFY_FUNCTION: &str = "verifyFunction";
    pub const VERIFY_MESSAGE: &str = "verifyMessage";
    pub const EXPECTED_RESPONSE: &str = "expectedResponse";
    pub const PRE_HTTP_REQUEST: &str = "preHttpRequest";
    pub const POST_HTTP_REQUEST: &str = "postHttpRequest";
    pub const REPLACE_MAPS: &str = "replaceMaps";
    pub const SESSION_HEADERS: &str = "sessionHeaders";

    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const RESPONSE_BODY: &str = "responseBody";
    pub const RESPONSE_TEXT: &str = "responseText";
    pub const ERROR: &str = "error";
    pub const TEST_PASSED: &str = "testPassed";
}

/// One test case: an open-ended JSON mapping with typed accessors for the
/// fields the engine understands. A `null` field is treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseRecord(Map<String, Value>);

impl CaseRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key).filter(|value| !value.is_null())
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Loose truthiness, so `"debug": 1` and `"debug": "yes"` both count.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(Value::Bool(value)) => *value,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value != 0.0),
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        }
    }

    pub fn id(&self) -> &str {
        self.str_field(fields::ID).unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.str_field(fields::DESCRIPTION).unwrap_or_default()
    }

    /// `"{id}. {description}"`, the key every banner is printed under.
    pub fn label(&self) -> String {
        format!("{}. {}", self.id(), self.description())
    }

    /// Appends ` {tag}` to a textual field, or sets it to `tag` when empty.
    pub fn append_tag(&mut self, key: &str, tag: &str) {
        let current = self.str_field(key).unwrap_or_default();
        let tagged = if current.is_empty() {
            tag.to_string()
        } else {
            format!("{current} {tag}")
        };
        self.set(key, tagged);
    }

    pub fn next_hop(&self) -> Option<CaseRecord> {
        self.get(fields::NEXT_HOP)
            .cloned()
            .and_then(CaseRecord::from_value)
    }

    /// Resolves a dotted path such as `session.tokens.0.value`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = self.get(head)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// Writes `value` at a dotted path, creating intermediate objects.
    /// Returns false when the path runs through a scalar or past the end of
    /// an array.
    pub fn assign(&mut self, path: &str, value: Value) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        if last.is_empty() {
            return false;
        }

        let Some((head, rest)) = parents.split_first() else {
            self.set(last, value);
            return true;
        };

        let mut current = self
            .0
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in rest {
            current = match descend(current, segment) {
                Some(next) => next,
                None => return false,
            };
        }

        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                true
            }
            Value::Array(items) => match last.parse::<usize>() {
                Ok(index) if index < items.len() => {
                    items[index] = value;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

fn descend<'a>(current: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Some(
            map.entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        ),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}
