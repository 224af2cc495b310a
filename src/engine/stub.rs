//! In-memory transport used by the engine tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use crate::domain::{CaseRecord, HttpResponse};
use crate::engine::http::RequestExecutor;
use crate::error::TransportError;

type Respond = dyn Fn(&CaseRecord) -> Result<HttpResponse, TransportError> + Send + Sync;

pub struct StubTransport {
    calls: Mutex<Vec<CaseRecord>>,
    respond: Box<Respond>,
}

impl StubTransport {
    pub fn new(
        respond: impl Fn(&CaseRecord) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::new(|_| Ok(json_response(json!({ "status": "ok" }))))
    }

    pub fn status(status: u16, status_text: &'static str) -> Arc<Self> {
        Self::new(move |_| {
            Err(TransportError::Status {
                status,
                status_text: status_text.to_string(),
                content_type: "application/json".to_string(),
                body: "{\"error\":\"denied\"}".to_string(),
            })
        })
    }

    pub fn calls(&self) -> Vec<CaseRecord> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls().iter().map(|case| case.id().to_string()).collect()
    }
}

#[async_trait]
impl RequestExecutor for StubTransport {
    async fn send(&self, case: &CaseRecord) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(case.clone());
        (self.respond)(case)
    }
}

pub fn json_response(body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        status_text: "OK".to_string(),
        content_type: "application/json".to_string(),
        text: body.to_string(),
        body: Some(body),
        ..Default::default()
    }
}
