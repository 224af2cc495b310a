use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::{fields, CaseRecord, CaseStatus};
use crate::error::CaseError;

/// Where banners end up.
pub trait ReportSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Prints to stdout, or stderr when stdout is reserved for a JSON report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    pub stderr: bool,
}

impl ReportSink for ConsoleSink {
    fn emit(&self, line: &str) {
        if self.stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Keeps every emitted line in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportSink for CaptureSink {
    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(ConsoleSink::default()))
    }
}

impl Reporter {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    pub fn line(&self, line: &str) {
        self.sink.emit(line);
    }

    /// Prints the banner for a finished case. `suppressMessage` hides
    /// passing and skipped banners; failures are always shown.
    pub fn case_finished(
        &self,
        case: &CaseRecord,
        status: CaseStatus,
        error: Option<&CaseError>,
        timing: Option<&str>,
    ) {
        let failed = !status.is_pass() && status != CaseStatus::Skipped;
        if !failed && case.flag(fields::SUPPRESS_MESSAGE) {
            return;
        }

        self.sink.emit(&banner(case, status, error));

        if failed {
            for line in error.map(diagnostics).unwrap_or_default() {
                self.sink.emit(&line);
            }
            if let Some(message) = case
                .str_field(fields::VERIFY_MESSAGE)
                .map(str::trim_end)
                .filter(|message| !message.is_empty())
            {
                self.sink.emit(message);
            }
        }

        if let Some(timing) = timing.filter(|_| case.flag(fields::SHOW_ELAPSE_TIME)) {
            self.sink.emit(timing);
        }
    }
}

pub fn banner(case: &CaseRecord, status: CaseStatus, error: Option<&CaseError>) -> String {
    let label = case.label();
    let error_text = error.map(CaseError::message);
    match status {
        CaseStatus::Passed => format!(">>> {label} <<< - Success."),
        CaseStatus::Skipped => format!(">>> {label} <<< - Skipped."),
        CaseStatus::Failed => match error_text {
            Some(text) => format!(">>> {label} <<< - Failed. {text}"),
            None => format!(">>> {label} <<< - Failed."),
        },
        CaseStatus::NegativePassed => match error_text {
            Some(text) => format!(">>> {label} <<< - Negative Test Success. {text}"),
            None => format!(">>> {label} <<< - Negative Test Success."),
        },
        CaseStatus::NegativeMismatch => format!(
            ">>> {label} <<< - Negative Test Failed. Expected: '{}' Actual: '{}'",
            case.str_field(fields::TEST_ERROR_MESSAGE).unwrap_or_default(),
            error_text.unwrap_or_else(|| "(no error)".to_string())
        ),
    }
}

/// Transport metadata worth printing under a failure banner.
pub fn diagnostics(error: &CaseError) -> Vec<String> {
    let Some(transport) = error.transport() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    if let Some(status) = transport.status() {
        let class = transport.classification().unwrap_or("unexpected status");
        lines.push(format!("    status: {status} ({class})"));
    }
    if let Some(body) = transport.error_body() {
        lines.push(format!("    body: {body}"));
    }
    lines
}
