use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use crate::domain::{fields, CaseOutcome, CaseRecord, CaseStatus, DefaultValueRecord, HttpResponse};
use crate::engine::aggregate::{elapsed_ms, elapsed_since, format_timestamp, RunAggregator};
use crate::engine::defaults::apply_defaults;
use crate::engine::http::{inline_text_file, HttpExecutor, RequestExecutor};
use crate::engine::registry::Registry;
use crate::engine::report::Reporter;
use crate::engine::signer::{next_hop_target, sign_targets, ApexSigner, Signer, SigningTarget};
use crate::engine::template::{apply_session_headers, apply_substitutions, resolve_skip};
use crate::error::CaseError;

pub const VERIFICATION_FAILED: &str = "Verification failed.";

/// Logs at info when the case asks for `debug`, otherwise at debug.
macro_rules! case_detail {
    ($case:expr, $($arg:tt)+) => {
        if $case.flag(fields::DEBUG) {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    DefaultsApplied,
    SkipCheck,
    PreHook,
    Substituted,
    Signed,
    Invoked,
    PostHook,
    Delayed,
    Finalized,
}

struct CaseRun {
    case: CaseRecord,
    stage: Stage,
    error: Option<CaseError>,
    passed: bool,
    counted: bool,
    status_code: Option<u16>,
    started_at: Option<DateTime<Local>>,
    ended_at: Option<DateTime<Local>>,
}

impl CaseRun {
    fn new(case: CaseRecord) -> Self {
        Self {
            case,
            stage: Stage::Pending,
            error: None,
            passed: false,
            counted: false,
            status_code: None,
            started_at: None,
            ended_at: None,
        }
    }

    fn advance(&mut self, stage: Stage) {
        trace!(case = %self.case.id(), from = ?self.stage, to = ?stage, "case stage");
        self.stage = stage;
    }

    fn fail(&mut self, error: CaseError) {
        self.passed = false;
        self.case.set(fields::TEST_PASSED, false);
        self.case.set(fields::ERROR, error.message());
        self.error = Some(error);
    }

    fn outcome(&self, status: CaseStatus) -> CaseOutcome {
        CaseOutcome {
            id: self.case.id().to_string(),
            description: self.case.description().to_string(),
            status,
            error: self.error.as_ref().map(CaseError::message),
            status_code: self.status_code,
            started_at: self.started_at.map(format_timestamp),
            ended_at: self.ended_at.map(format_timestamp),
            elapsed_ms: match (self.started_at, self.ended_at) {
                (Some(start), Some(end)) => elapsed_ms(start, end),
                _ => 0,
            },
        }
    }
}

/// Runs one case through its lifecycle. Failures are captured on the case
/// and in the outcome; `execute` itself never fails.
pub struct CaseExecutor {
    transport: Arc<dyn RequestExecutor>,
    signer: Arc<dyn Signer>,
    registry: Registry,
    defaults: DefaultValueRecord,
    aggregator: Arc<RunAggregator>,
    reporter: Reporter,
}

impl CaseExecutor {
    pub fn new(aggregator: Arc<RunAggregator>) -> Self {
        Self {
            transport: Arc::new(HttpExecutor),
            signer: Arc::new(ApexSigner),
            registry: Registry::default(),
            defaults: DefaultValueRecord::default(),
            aggregator,
            reporter: Reporter::default(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn RequestExecutor>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_defaults(mut self, defaults: DefaultValueRecord) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn aggregator(&self) -> &Arc<RunAggregator> {
        &self.aggregator
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn defaults(&self) -> &DefaultValueRecord {
        &self.defaults
    }

    pub async fn execute(&self, case: CaseRecord) -> CaseOutcome {
        let mut run = CaseRun::new(case);

        run.advance(Stage::DefaultsApplied);
        apply_defaults(&mut run.case, &self.defaults);

        run.advance(Stage::SkipCheck);
        match resolve_skip(&mut run.case) {
            Ok(true) => return self.finish_skipped(run),
            Ok(false) => {}
            Err(err) => {
                run.fail(err);
                return self.finalize(run);
            }
        }
        case_detail!(run.case, ">>> {} <<< - Start.", run.case.label());

        if let Err(err) = self.prepare(&mut run).await {
            run.fail(err);
            return self.finalize(run);
        }

        self.invoke(&mut run).await;
        self.post_process(&mut run).await;
        self.finalize(run)
    }

    async fn prepare(&self, run: &mut CaseRun) -> Result<(), CaseError> {
        run.advance(Stage::PreHook);
        if let Some(name) = hook_name(&run.case, fields::PRE_HTTP_REQUEST)? {
            self.run_hook(&name, &mut run.case).await?;
        }

        run.advance(Stage::Substituted);
        inline_text_file(&mut run.case).await?;
        apply_substitutions(&mut run.case)?;
        apply_session_headers(&mut run.case)?;

        self.count(run);
        validate_structure(&run.case)?;

        run.advance(Stage::Signed);
        self.sign(&mut run.case)
    }

    fn sign(&self, case: &mut CaseRecord) -> Result<(), CaseError> {
        let primary = SigningTarget::from_case(case)?;
        let hop = next_hop_target(case)?;

        for target in primary.iter().chain(hop.iter()) {
            let base_string = target.base_string()?;
            case_detail!(
                case,
                case = %case.id(),
                app_id = %target.app_id,
                "signature base string: {base_string}"
            );
        }

        if let Some(token) = sign_targets(self.signer.as_ref(), primary.as_ref(), hop.as_ref())? {
            case_detail!(case, case = %case.id(), "authorization: {token}");
            case.set(fields::SIGNATURE, token);
        }

        // Generated nonce and timestamp are written back; given ones are kept.
        if let Some(target) = &primary {
            fill_unset(case.as_map_mut(), target);
        }
        if let (Some(target), Some(Value::Object(next_hop))) = (&hop, case.get_mut(fields::NEXT_HOP)) {
            fill_unset(next_hop, target);
        }
        Ok(())
    }

    async fn invoke(&self, run: &mut CaseRun) {
        run.advance(Stage::Invoked);

        let started_at = Local::now();
        run.started_at = Some(started_at);
        run.case.set(fields::START_TIME, format_timestamp(started_at));

        let result = self.transport.send(&run.case).await;

        let ended_at = Local::now();
        run.ended_at = Some(ended_at);
        run.case.set(fields::END_TIME, format_timestamp(ended_at));

        let verdict = match result {
            Ok(response) => {
                run.status_code = Some(response.status);
                store_response(&mut run.case, &response);
                self.judge(&mut run.case, &response).await
            }
            Err(err) => {
                run.status_code = err.status();
                Err(CaseError::from(err))
            }
        };

        match verdict {
            Ok(()) => {
                run.passed = true;
                run.case.set(fields::TEST_PASSED, true);
            }
            Err(err) => {
                // A negative test expects the invoke to fail.
                let provisional = run.case.flag(fields::NEGATIVE_TEST);
                run.fail(err);
                if provisional {
                    run.passed = true;
                    run.case.set(fields::TEST_PASSED, true);
                }
            }
        }
    }

    async fn judge(&self, case: &mut CaseRecord, response: &HttpResponse) -> Result<(), CaseError> {
        let Some(name) = case.str_field(fields::VERIFY_FUNCTION).map(str::to_string) else {
            return Ok(());
        };

        let verifier = self.registry.verifier(&name)?;
        if verifier.verify(case, response).await? {
            Ok(())
        } else {
            Err(CaseError::Verification(VERIFICATION_FAILED.to_string()))
        }
    }

    async fn post_process(&self, run: &mut CaseRun) {
        run.advance(Stage::PostHook);
        let hooked = match hook_name(&run.case, fields::POST_HTTP_REQUEST) {
            Ok(Some(name)) => self.run_hook(&name, &mut run.case).await,
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = hooked {
            run.fail(err);
        }

        run.advance(Stage::Delayed);
        if let Some(ms) = run.case.u64_field(fields::DELAY).filter(|ms| *ms > 0) {
            trace!(case = %run.case.id(), ms, "delaying before next case");
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn run_hook(&self, name: &str, case: &mut CaseRecord) -> Result<(), CaseError> {
        let hook = self.registry.hook(name)?;
        hook.call(case).await.map_err(|err| match err {
            CaseError::Hook { .. } => err,
            other => CaseError::Hook {
                name: name.to_string(),
                message: other.message(),
            },
        })
    }

    /// Counted once per non-skipped case, however early it failed.
    fn count(&self, run: &mut CaseRun) {
        if !run.counted {
            run.counted = true;
            self.aggregator.record_total();
        }
    }

    fn finish_skipped(&self, mut run: CaseRun) -> CaseOutcome {
        run.advance(Stage::Finalized);
        self.aggregator.record_skipped();
        self.reporter
            .case_finished(&run.case, CaseStatus::Skipped, None, None);

        let outcome = run.outcome(CaseStatus::Skipped);
        self.aggregator.record_outcome(outcome.clone());
        outcome
    }

    fn finalize(&self, mut run: CaseRun) -> CaseOutcome {
        run.advance(Stage::Finalized);
        self.count(&mut run);

        let status = classify(&run.case, run.passed, run.error.as_ref());
        run.case.set(fields::TEST_PASSED, status.is_pass());
        if status.is_pass() {
            self.aggregator.record_passed();
        }

        let timing = run
            .started_at
            .map(|started_at| elapsed_since(started_at, run.ended_at));
        self.reporter
            .case_finished(&run.case, status, run.error.as_ref(), timing.as_deref());

        let outcome = run.outcome(status);
        self.aggregator.record_outcome(outcome.clone());
        outcome
    }
}

/// A provisional negative-test pass stands only when the captured error
/// text equals `testErrorMessage`, if one is declared.
fn classify(case: &CaseRecord, passed: bool, error: Option<&CaseError>) -> CaseStatus {
    if !passed {
        return CaseStatus::Failed;
    }
    if !case.flag(fields::NEGATIVE_TEST) {
        return CaseStatus::Passed;
    }

    let expected = case
        .str_field(fields::TEST_ERROR_MESSAGE)
        .filter(|expected| !expected.is_empty());
    match (expected, error) {
        (Some(expected), Some(error)) if error.message() == expected => CaseStatus::NegativePassed,
        (Some(_), _) => CaseStatus::NegativeMismatch,
        (None, Some(_)) => CaseStatus::NegativePassed,
        (None, None) => CaseStatus::Passed,
    }
}

fn fill_unset(record: &mut Map<String, Value>, target: &SigningTarget) {
    for (key, value) in [(fields::NONCE, &target.nonce), (fields::TIMESTAMP, &target.timestamp)] {
        if record.get(key).map_or(true, Value::is_null) {
            record.insert(key.to_string(), Value::String(value.clone()));
        }
    }
}

fn hook_name(case: &CaseRecord, field: &str) -> Result<Option<String>, CaseError> {
    match case.get(field) {
        None => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(_) => Err(CaseError::Configuration(format!(
            "Property '{field}' must name a registered hook."
        ))),
    }
}

fn validate_structure(case: &CaseRecord) -> Result<(), CaseError> {
    for field in [fields::QUERY_STRING, fields::FORM_DATA] {
        if case.get(field).is_some_and(Value::is_array) {
            return Err(CaseError::StructuralValidation { field });
        }
    }
    Ok(())
}

fn store_response(case: &mut CaseRecord, response: &HttpResponse) {
    case_detail!(
        case,
        case = %case.id(),
        status = response.status,
        content_type = %response.content_type,
        "response: {}",
        response.text
    );
    if let Some(body) = &response.body {
        case.set(fields::RESPONSE_BODY, body.clone());
    }
    case.set(fields::RESPONSE_TEXT, response.text.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::report::CaptureSink;
    use crate::engine::stub::{json_response, StubTransport};
    use serde_json::{json, Map};

    struct Harness {
        executor: CaseExecutor,
        aggregator: Arc<RunAggregator>,
        sink: Arc<CaptureSink>,
    }

    fn harness(transport: Arc<StubTransport>) -> Harness {
        harness_with(transport, Registry::new())
    }

    fn harness_with(transport: Arc<StubTransport>, registry: Registry) -> Harness {
        let aggregator = Arc::new(RunAggregator::new());
        let sink = Arc::new(CaptureSink::default());
        let executor = CaseExecutor::new(aggregator.clone())
            .with_transport(transport)
            .with_registry(registry)
            .with_reporter(Reporter::new(sink.clone()));
        Harness {
            executor,
            aggregator,
            sink,
        }
    }

    fn case(value: Value) -> CaseRecord {
        CaseRecord::from_value(value).unwrap()
    }

    fn counts(aggregator: &RunAggregator) -> (u64, u64, u64) {
        (aggregator.total(), aggregator.passed(), aggregator.skipped())
    }

    #[tokio::test]
    async fn successful_case_passes() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "1", "description": "ok", "invokeUrl": "https://x.test" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Passed);
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.started_at.is_some());
        assert_eq!(counts(&h.aggregator), (1, 1, 0));
        assert_eq!(h.sink.lines(), [">>> 1. ok <<< - Success."]);
        assert_eq!(transport.ids(), ["1"]);
    }

    #[tokio::test]
    async fn http_failure_is_captured() {
        let h = harness(StubTransport::status(401, "Unauthorized"));

        let outcome = h
            .executor
            .execute(case(json!({ "id": "2", "description": "denied" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("Unauthorized"));
        assert_eq!(outcome.status_code, Some(401));
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
        assert_eq!(h.aggregator.failed(), 1);
        assert_eq!(h.sink.lines()[0], ">>> 2. denied <<< - Failed. Unauthorized");
    }

    #[tokio::test]
    async fn skipped_case_never_reaches_transport() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "3", "description": "s", "skipTest": true })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Skipped);
        assert_eq!(counts(&h.aggregator), (0, 0, 1));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn skip_can_come_from_a_replace_rule() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        h.executor
            .execute(case(json!({
                "id": "4",
                "flags": { "skip": true },
                "replaceMaps": [{ "propertyName": "skipTest", "replaceValue": "flags.skip" }]
            })))
            .await;

        assert_eq!(counts(&h.aggregator), (0, 0, 1));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn negative_test_with_matching_error_passes() {
        let h = harness(StubTransport::status(401, "Unauthorized"));

        let outcome = h
            .executor
            .execute(case(json!({
                "id": "5",
                "negativeTest": true,
                "testErrorMessage": "Unauthorized"
            })))
            .await;

        assert_eq!(outcome.status, CaseStatus::NegativePassed);
        assert_eq!(counts(&h.aggregator), (1, 1, 0));
    }

    #[tokio::test]
    async fn negative_test_with_other_error_fails() {
        let h = harness(StubTransport::status(401, "Unauthorized"));

        let outcome = h
            .executor
            .execute(case(json!({
                "id": "6",
                "description": "neg",
                "negativeTest": true,
                "testErrorMessage": "Forbidden"
            })))
            .await;

        assert_eq!(outcome.status, CaseStatus::NegativeMismatch);
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
        assert_eq!(
            h.sink.lines()[0],
            ">>> 6. neg <<< - Negative Test Failed. Expected: 'Forbidden' Actual: 'Unauthorized'"
        );
    }

    #[tokio::test]
    async fn negative_test_expecting_an_error_fails_on_success() {
        let h = harness(StubTransport::ok());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "7", "negativeTest": true, "testErrorMessage": "Forbidden" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::NegativeMismatch);
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
    }

    #[tokio::test]
    async fn negative_test_without_expectation_passes_either_way() {
        let h = harness(StubTransport::status(500, "Internal Server Error"));
        let outcome = h
            .executor
            .execute(case(json!({ "id": "8", "negativeTest": true })))
            .await;
        assert_eq!(outcome.status, CaseStatus::NegativePassed);

        let h = harness(StubTransport::ok());
        let outcome = h
            .executor
            .execute(case(json!({ "id": "9", "negativeTest": true })))
            .await;
        assert_eq!(outcome.status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn array_query_string_fails_before_sending() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "10", "queryString": [["a", "1"]] })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Property 'queryString' cannot be an array.")
        );
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_verifier_is_a_configuration_failure() {
        let h = harness(StubTransport::ok());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "11", "verifyFunction": "nope" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Verification function `nope` is not registered.")
        );
    }

    #[tokio::test]
    async fn rejecting_verifier_fails_unless_negative() {
        let mut registry = Registry::new();
        registry
            .register_verifier("reject", |case: &mut CaseRecord, _: &HttpResponse| -> Result<bool, CaseError> {
                case.set("verifyMessage", "status mismatch");
                Ok(false)
            })
            .unwrap();

        let h = harness_with(StubTransport::ok(), registry.clone());
        let outcome = h
            .executor
            .execute(case(json!({ "id": "12", "description": "v", "verifyFunction": "reject" })))
            .await;
        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(VERIFICATION_FAILED));
        assert_eq!(
            h.sink.lines(),
            [">>> 12. v <<< - Failed. Verification failed.", "status mismatch"]
        );

        let h = harness_with(StubTransport::ok(), registry);
        let outcome = h
            .executor
            .execute(case(json!({ "id": "13", "verifyFunction": "reject", "negativeTest": true })))
            .await;
        assert_eq!(outcome.status, CaseStatus::NegativePassed);
    }

    #[tokio::test]
    async fn defaults_fill_unset_fields() {
        let transport = StubTransport::ok();
        let mut defaults = Map::new();
        defaults.insert("invokeUrl".into(), json!("https://default.test"));
        defaults.insert("httpMethod".into(), json!("GET"));

        let h = harness(transport.clone());
        let executor = h
            .executor
            .with_defaults(DefaultValueRecord::from_map(defaults));
        executor
            .execute(case(json!({ "id": "14", "httpMethod": "POST" })))
            .await;

        let sent = &transport.calls()[0];
        assert_eq!(sent.str_field("invokeUrl"), Some("https://default.test"));
        assert_eq!(sent.str_field("httpMethod"), Some("POST"));
    }

    #[tokio::test]
    async fn hooks_wrap_the_request() {
        let transport = StubTransport::new(|case| {
            Ok(json_response(json!({ "echo": case.str_field("token") })))
        });
        let mut registry = Registry::new();
        registry
            .register_hook("login", |case: &mut CaseRecord| -> Result<(), CaseError> {
                case.set("token", "t-1");
                Ok(())
            })
            .unwrap();
        registry
            .register_hook("check", |case: &mut CaseRecord| -> Result<(), CaseError> {
                match case.lookup("responseBody.echo") {
                    Some(Value::String(token)) if token == "t-1" => Ok(()),
                    _ => Err(CaseError::Verification("token not echoed".into())),
                }
            })
            .unwrap();

        let h = harness_with(transport, registry);
        let outcome = h
            .executor
            .execute(case(json!({
                "id": "15",
                "preHttpRequest": "login",
                "postHttpRequest": "check"
            })))
            .await;
        assert_eq!(outcome.status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn failing_post_hook_fails_the_case() {
        let mut registry = Registry::new();
        registry
            .register_hook("boom", |_: &mut CaseRecord| -> Result<(), CaseError> {
                Err(CaseError::Configuration("no session".into()))
            })
            .unwrap();

        let h = harness_with(StubTransport::ok(), registry);
        let outcome = h
            .executor
            .execute(case(json!({ "id": "16", "postHttpRequest": "boom" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("Hook `boom` failed: no session"));
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
    }

    #[tokio::test]
    async fn missing_pre_hook_still_counts_the_case() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        let outcome = h
            .executor
            .execute(case(json!({ "id": "17", "preHttpRequest": "absent" })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn substitutions_and_session_headers_reach_the_request() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        h.executor
            .execute(case(json!({
                "id": "18",
                "session": { "user": "alice", "token": "abc" },
                "invokeUrl": "https://x.test/users/{{session.user}}",
                "replaceMaps": [{ "propertyName": "invokeUrl", "replaceValue": "session.user" }],
                "sessionHeaders": { "x-token": "session.token" }
            })))
            .await;

        let sent = &transport.calls()[0];
        assert_eq!(sent.str_field("invokeUrl"), Some("https://x.test/users/alice"));
        assert_eq!(sent.lookup("httpHeaders.x-token"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn signed_case_carries_authorization() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        h.executor
            .execute(case(json!({
                "id": "19",
                "httpMethod": "GET",
                "invokeUrl": "https://gw.example.com/api",
                "signatureUrl": "https://gw.example.com/api",
                "authPrefix": "Apex_L1_EG",
                "appId": "app",
                "secret": "s"
            })))
            .await;

        let sent = &transport.calls()[0];
        assert!(sent
            .str_field("signature")
            .unwrap()
            .starts_with("Apex_l1_eg apex_l1_eg_app_id=\"app\""));
    }

    #[tokio::test]
    async fn generated_nonce_and_timestamp_are_kept_on_the_case() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        h.executor
            .execute(case(json!({
                "id": "19b",
                "httpMethod": "GET",
                "invokeUrl": "https://gw.example.com/api",
                "signatureUrl": "https://gw.example.com/api",
                "authPrefix": "Apex_L1_EG",
                "appId": "app",
                "secret": "s",
                "timestamp": 1500000000000u64,
                "nextHop": {
                    "authPrefix": "Apex_L2_IG",
                    "appId": "inner",
                    "secret": "k",
                    "signatureUrl": "https://inner.example.com/api"
                }
            })))
            .await;

        let sent = &transport.calls()[0];
        let signature = sent.str_field("signature").unwrap();
        let nonce = sent.str_field("nonce").unwrap();
        assert!(signature.contains(&format!("apex_l1_eg_nonce=\"{nonce}\"")), "{signature}");
        assert_eq!(sent.get("timestamp"), Some(&json!(1500000000000u64)));

        let hop_nonce = sent.lookup("nextHop.nonce").and_then(Value::as_str).unwrap();
        let hop_timestamp = sent.lookup("nextHop.timestamp").and_then(Value::as_str).unwrap();
        assert_ne!(hop_nonce, nonce);
        assert!(signature.contains(&format!("apex_l2_ig_nonce=\"{hop_nonce}\"")));
        assert!(signature.contains(&format!("apex_l2_ig_timestamp=\"{hop_timestamp}\"")));
    }

    #[tokio::test]
    async fn signing_errors_fail_the_case() {
        let transport = StubTransport::ok();
        let h = harness(transport.clone());

        let outcome = h
            .executor
            .execute(case(json!({
                "id": "20",
                "httpMethod": "GET",
                "signatureUrl": "https://gw.example.com/api",
                "appId": "app"
            })))
            .await;

        assert_eq!(outcome.status, CaseStatus::Failed);
        assert!(transport.calls().is_empty());
        assert_eq!(counts(&h.aggregator), (1, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_waits_after_the_case() {
        let h = harness(StubTransport::ok());
        let before = tokio::time::Instant::now();

        h.executor
            .execute(case(json!({ "id": "21", "delay": 1500 })))
            .await;

        assert!(before.elapsed() >= Duration::from_millis(1500));
    }
}
