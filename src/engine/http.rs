use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Certificate, Client, Method, Request, Url};
use serde_json::{Map, Value};

use crate::domain::{fields, is_json_content_type, CaseRecord, HttpResponse};
use crate::error::TransportError;

/// Performs the network call for a fully resolved case.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn send(&self, case: &CaseRecord) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed executor. A client is built per case because trust
/// settings (`ignoreServerCert`, `caCertFileName`, `timeout`) are per case.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpExecutor;

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn send(&self, case: &CaseRecord) -> Result<HttpResponse, TransportError> {
        let client = build_client(case).await?;
        let request = build_request(&client, case).await?;

        let start = Instant::now();
        let response = client
            .execute(request)
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let elapsed = start.elapsed().as_millis() as u64;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            headers.insert(
                key.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("text/plain")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(format!("Failed to read response: {err}")))?;
        let text = String::from_utf8_lossy(&bytes).to_string();

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                status_text,
                content_type,
                body: text,
            });
        }

        let body = if is_json_content_type(&content_type) {
            serde_json::from_str(&text).ok()
        } else {
            None
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            headers,
            content_type,
            text,
            body,
            time: elapsed,
        })
    }
}

pub async fn build_client(case: &CaseRecord) -> Result<Client, TransportError> {
    let mut builder = Client::builder().redirect(reqwest::redirect::Policy::limited(10));

    if let Some(ms) = case.u64_field(fields::TIMEOUT) {
        if ms > 0 {
            builder = builder.timeout(Duration::from_millis(ms));
        }
    }

    // Peer verification is off unless the case asks for it.
    let ignore_server_cert = case
        .get(fields::IGNORE_SERVER_CERT)
        .map(|_| case.flag(fields::IGNORE_SERVER_CERT))
        .unwrap_or(true);
    if ignore_server_cert {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(path) = case.str_field(fields::CA_CERT_FILE_NAME) {
        let pem = read_file(Path::new(path)).await?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            TransportError::InvalidRequest(format!("Invalid CA certificate `{path}`: {err}"))
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder
        .build()
        .map_err(|err| TransportError::InvalidRequest(format!("Failed to build HTTP client: {err}")))
}

pub async fn build_request(client: &Client, case: &CaseRecord) -> Result<Request, TransportError> {
    let method_name = case
        .str_field(fields::HTTP_METHOD)
        .unwrap_or("GET")
        .to_uppercase();
    let method = Method::from_bytes(method_name.as_bytes())
        .map_err(|err| TransportError::InvalidRequest(format!("Invalid HTTP method: {err}")))?;

    let url = build_url(case)?;
    let headers = build_headers(case)?;
    let mut request = client.request(method.clone(), url).headers(headers);

    if matches!(method, Method::POST | Method::PUT) {
        if let Some(form) = case.get(fields::FORM_DATA).and_then(Value::as_object) {
            request = request.form(&pairs(form));
        } else if let Some(json) = case.get(fields::JSON_DATA) {
            let payload = inject_base64(json.clone(), case.get(fields::BASE64_DATA)).await?;
            let body = serde_json::to_vec(&payload).map_err(|err| {
                TransportError::InvalidRequest(format!("Failed to encode jsonData: {err}"))
            })?;
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        } else if let Some(text) = case.get(fields::TEXT_DATA) {
            let body = match text.get("dataFileName").and_then(Value::as_str) {
                Some(path) => String::from_utf8_lossy(&read_file(Path::new(path)).await?).to_string(),
                None => text
                    .get("data")
                    .map(|data| match data {
                        Value::String(data) => data.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
            };
            request = request
                .header(CONTENT_TYPE, content_type_of(text, "text/plain"))
                .body(body);
        } else if let Some(binary) = case.get(fields::BINARY_DATA) {
            let body = match binary.get("dataFileName").and_then(Value::as_str) {
                Some(path) => read_file(Path::new(path)).await?,
                None => Vec::new(),
            };
            request = request
                .header(CONTENT_TYPE, content_type_of(binary, "application/octet-stream"))
                .body(bytes::Bytes::from(body));
        }
    }

    if let Some(multipart) = case.get(fields::MULTIPART_DATA) {
        request = request.multipart(build_multipart(multipart).await?);
    }

    request
        .build()
        .map_err(|err| TransportError::InvalidRequest(err.to_string()))
}

/// `queryString` pairs go in front of whatever query the URL already has.
pub fn build_url(case: &CaseRecord) -> Result<Url, TransportError> {
    let raw = case.str_field(fields::INVOKE_URL).ok_or_else(|| {
        TransportError::InvalidRequest(format!("Property '{}' is required.", fields::INVOKE_URL))
    })?;
    let mut url =
        Url::parse(raw).map_err(|err| TransportError::InvalidRequest(format!("Invalid URL: {err}")))?;

    let Some(query) = case.get(fields::QUERY_STRING).and_then(Value::as_object) else {
        return Ok(url);
    };

    let existing: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut combined = pairs(query);
    combined.extend(existing);

    if combined.is_empty() {
        return Ok(url);
    }
    url.query_pairs_mut().clear().extend_pairs(combined);
    Ok(url)
}

pub fn build_headers(case: &CaseRecord) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    if let Some(signature) = case.str_field(fields::SIGNATURE).filter(|value| !value.is_empty()) {
        let value = HeaderValue::from_str(signature).map_err(|err| {
            TransportError::InvalidRequest(format!("Invalid signature header: {err}"))
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    let Some(custom) = case.get(fields::HTTP_HEADERS) else {
        return Ok(headers);
    };
    let Some(custom) = custom.as_object() else {
        return Err(TransportError::InvalidRequest(format!(
            "Property '{}' must be a mapping.",
            fields::HTTP_HEADERS
        )));
    };

    for (key, value) in custom {
        if key.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            TransportError::InvalidRequest(format!("Invalid header name `{key}`: {err}"))
        })?;
        let header_value = HeaderValue::from_str(&render(value)).map_err(|err| {
            TransportError::InvalidRequest(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Moves a `textData.dataFileName` file into `textData.data`, so replace
/// rules can template file-backed bodies too.
pub async fn inline_text_file(case: &mut CaseRecord) -> Result<(), TransportError> {
    let Some(path) = case
        .lookup("textData.dataFileName")
        .and_then(Value::as_str)
        .map(PathBuf::from)
    else {
        return Ok(());
    };

    let content = String::from_utf8_lossy(&read_file(&path).await?).to_string();
    if let Some(Value::Object(text)) = case.get_mut(fields::TEXT_DATA) {
        text.remove("dataFileName");
        text.insert("data".to_string(), Value::String(content));
    }
    Ok(())
}

async fn inject_base64(mut payload: Value, source: Option<&Value>) -> Result<Value, TransportError> {
    let Some(source) = source else {
        return Ok(payload);
    };
    let (Some(path), Some(field)) = (
        source.get("dataFileName").and_then(Value::as_str),
        source.get("fieldName").and_then(Value::as_str),
    ) else {
        return Err(TransportError::InvalidRequest(
            "base64Data requires dataFileName and fieldName".to_string(),
        ));
    };

    let encoded = STANDARD.encode(read_file(Path::new(path)).await?);
    match payload.as_object_mut() {
        Some(object) => {
            object.insert(field.to_string(), Value::String(encoded));
            Ok(payload)
        }
        None => Err(TransportError::InvalidRequest(
            "base64Data requires jsonData to be an object".to_string(),
        )),
    }
}

async fn build_multipart(layout: &Value) -> Result<Form, TransportError> {
    let mut form = Form::new();

    if let Some(field_values) = layout.get("fields").and_then(Value::as_object) {
        for (key, value) in field_values {
            form = form.text(key.clone(), render(value));
        }
    }

    if let Some(attachments) = layout.get("attachments").and_then(Value::as_object) {
        for (key, value) in attachments {
            match value {
                Value::Array(paths) => {
                    for path in paths {
                        form = form.part("files", file_part(&render(path)).await?);
                    }
                }
                other => {
                    form = form.part(key.clone(), file_part(&render(other)).await?);
                }
            }
        }
    }

    Ok(form)
}

async fn file_part(path: &str) -> Result<Part, TransportError> {
    let path = Path::new(path);
    let data = read_file(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Part::bytes(data).file_name(file_name))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(path).await.map_err(|err| TransportError::File {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn content_type_of(body: &Value, fallback: &str) -> String {
    body.get("contentType")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn pairs(map: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in map {
        match value {
            Value::Array(items) => pairs.extend(items.iter().map(|item| (key.clone(), render(item)))),
            other => pairs.push((key.clone(), render(other))),
        }
    }
    pairs
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
