use std::fs;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use reqwest::Url;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::RsaPrivateKey;
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::domain::{fields, CaseRecord};
use crate::error::SigningError;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_SIGNATURE_METHOD: &str = "HMACSHA256";
pub const RSA_SIGNATURE_METHOD: &str = "SHA256withRSA";
const SIGNATURE_VERSION: &str = "1.0";

/// Produces a transport-ready `Authorization` value for one target.
pub trait Signer: Send + Sync {
    fn sign(&self, target: &SigningTarget) -> Result<String, SigningError>;
}

/// The signing inputs carried by a case (or by its next hop).
#[derive(Debug, Clone, PartialEq)]
pub struct SigningTarget {
    pub auth_prefix: String,
    pub app_id: String,
    pub secret: Option<String>,
    /// PEM private key used when there is no `secret`.
    pub private_key_file: Option<String>,
    pub passphrase: Option<String>,
    pub signature_url: String,
    pub http_method: String,
    pub query_string: Option<Map<String, Value>>,
    pub form_data: Option<Map<String, Value>>,
    pub nonce: String,
    pub timestamp: String,
}

impl SigningTarget {
    /// `None` when the case carries no `signatureUrl`, meaning no gateway
    /// security is required. Missing nonce and timestamp are generated.
    pub fn from_case(case: &CaseRecord) -> Result<Option<Self>, SigningError> {
        let Some(signature_url) = case.str_field(fields::SIGNATURE_URL) else {
            return Ok(None);
        };

        let required = |key: &'static str| {
            case.get(key)
                .map(render)
                .ok_or(SigningError::MissingField(key))
        };

        Ok(Some(Self {
            auth_prefix: required(fields::AUTH_PREFIX)?,
            app_id: required(fields::APP_ID)?,
            secret: case.get(fields::SECRET).map(render),
            private_key_file: case.str_field(fields::PRIVATE_CERT_FILE_NAME).map(str::to_string),
            passphrase: case.str_field(fields::PASSPHRASE).map(str::to_string),
            signature_url: signature_url.to_string(),
            http_method: required(fields::HTTP_METHOD)?,
            query_string: case.get(fields::QUERY_STRING).and_then(Value::as_object).cloned(),
            form_data: case.get(fields::FORM_DATA).and_then(Value::as_object).cloned(),
            nonce: case.get(fields::NONCE).map(render).unwrap_or_else(fresh_nonce),
            timestamp: case
                .get(fields::TIMESTAMP)
                .map(render)
                .unwrap_or_else(epoch_millis),
        }))
    }

    pub fn signature_method(&self) -> &'static str {
        if self.secret.is_some() {
            HMAC_SIGNATURE_METHOD
        } else {
            RSA_SIGNATURE_METHOD
        }
    }

    fn prefix(&self) -> String {
        self.auth_prefix.to_lowercase()
    }

    /// `METHOD&scheme://host/path&k=v&...`, parameters sorted by key then
    /// value.
    pub fn base_string(&self) -> Result<String, SigningError> {
        let url = Url::parse(&self.signature_url).map_err(|err| SigningError::InvalidUrl {
            url: self.signature_url.clone(),
            message: err.to_string(),
        })?;
        let host = url.host_str().ok_or_else(|| SigningError::InvalidUrl {
            url: self.signature_url.clone(),
            message: "missing host".to_string(),
        })?;

        let prefix = self.prefix();
        let mut params = vec![
            (format!("{prefix}_app_id"), self.app_id.clone()),
            (format!("{prefix}_nonce"), self.nonce.clone()),
            (
                format!("{prefix}_signature_method"),
                self.signature_method().to_string(),
            ),
            (format!("{prefix}_timestamp"), self.timestamp.clone()),
            (format!("{prefix}_version"), SIGNATURE_VERSION.to_string()),
        ];
        params.extend(
            url.query_pairs()
                .map(|(key, value)| (key.into_owned(), value.into_owned())),
        );
        for map in [&self.query_string, &self.form_data].into_iter().flatten() {
            push_pairs(&mut params, map);
        }
        params.sort();

        let joined = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}&{}://{}{}&{}",
            self.http_method.to_uppercase(),
            url.scheme(),
            host.to_lowercase(),
            url.path(),
            joined
        ))
    }
}

/// Gateway signer. HMAC-SHA256 with the target's `secret`, otherwise
/// SHA256withRSA (PKCS#1 v1.5) with the PEM key named by
/// `privateCertFileName`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApexSigner;

impl Signer for ApexSigner {
    fn sign(&self, target: &SigningTarget) -> Result<String, SigningError> {
        let base_string = target.base_string()?;
        let signature = match target.secret.as_deref() {
            Some(secret) => hmac_signature(secret, &base_string)?,
            None => rsa_signature(target, &base_string)?,
        };

        let prefix = target.prefix();
        Ok(format!(
            "{} {prefix}_app_id=\"{}\",{prefix}_nonce=\"{}\",{prefix}_signature=\"{signature}\",{prefix}_signature_method=\"{}\",{prefix}_timestamp=\"{}\",{prefix}_version=\"{SIGNATURE_VERSION}\"",
            capitalize(&prefix),
            target.app_id,
            target.nonce,
            target.signature_method(),
            target.timestamp,
        ))
    }
}

fn hmac_signature(secret: &str, base_string: &str) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn rsa_signature(target: &SigningTarget, base_string: &str) -> Result<String, SigningError> {
    let path = target
        .private_key_file
        .as_deref()
        .ok_or(SigningError::MissingField(fields::PRIVATE_CERT_FILE_NAME))?;
    let key = load_private_key(path, target.passphrase.as_deref())?;
    let signature = SigningKey::<Sha256>::new(key)
        .try_sign(base_string.as_bytes())
        .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// PKCS#8 (optionally encrypted) or PKCS#1 PEM.
fn load_private_key(path: &str, passphrase: Option<&str>) -> Result<RsaPrivateKey, SigningError> {
    let pem = fs::read_to_string(path).map_err(|source| SigningError::KeyFile {
        path: path.to_string(),
        source,
    })?;

    let key = match passphrase {
        Some(passphrase) => RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase),
        None => RsaPrivateKey::from_pkcs8_pem(&pem),
    };
    key.or_else(|err| RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|_| err))
        .map_err(|err| SigningError::InvalidKey(format!("{path}: {err}")))
}

/// Signs the case target and its optional next hop. Both tokens are joined
/// with `", "`; `None` when neither target needs signing. Targets are
/// resolved by the caller so it can log the exact base strings that get
/// signed.
pub fn sign_targets(
    signer: &dyn Signer,
    primary: Option<&SigningTarget>,
    hop: Option<&SigningTarget>,
) -> Result<Option<String>, SigningError> {
    let mut token = primary.map(|target| signer.sign(target)).transpose()?;

    if let Some(hop) = hop {
        let child = signer.sign(hop)?;
        token = Some(match token {
            Some(parent) if !parent.is_empty() => format!("{parent}, {child}"),
            _ => child,
        });
    }

    Ok(token)
}

/// The next hop shares the parent's query string, and its method when it
/// declares none.
pub fn next_hop_target(case: &CaseRecord) -> Result<Option<SigningTarget>, SigningError> {
    let Some(mut hop) = case.next_hop() else {
        return Ok(None);
    };
    match case.get(fields::QUERY_STRING) {
        Some(query) => hop.set(fields::QUERY_STRING, query.clone()),
        None => {
            hop.remove(fields::QUERY_STRING);
        }
    }
    if !hop.is_set(fields::HTTP_METHOD) {
        if let Some(method) = case.get(fields::HTTP_METHOD) {
            hop.set(fields::HTTP_METHOD, method.clone());
        }
    }
    SigningTarget::from_case(&hop)
}

fn push_pairs(params: &mut Vec<(String, String)>, map: &Map<String, Value>) {
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                params.extend(items.iter().map(|item| (key.clone(), render(item))));
            }
            other => params.push((key.clone(), render(other))),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

fn epoch_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
