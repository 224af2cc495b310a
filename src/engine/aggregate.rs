use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};

use crate::domain::{CaseOutcome, RunReport};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Run-scoped counters. Failed cases are never counted directly; they are
/// `total - passed` once skipped cases are excluded from `total`.
#[derive(Debug, Default)]
pub struct RunAggregator {
    total: AtomicU64,
    passed: AtomicU64,
    skipped: AtomicU64,
    started_at: Mutex<Option<DateTime<Local>>>,
    outcomes: Mutex<Vec<CaseOutcome>>,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every counter and restarts the run timer.
    pub fn new_run(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.passed.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.start_timer();
    }

    pub fn start_timer(&self) {
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Local::now());
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passed(&self) {
        self.passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: CaseOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.total().saturating_sub(self.passed())
    }

    pub fn outcomes(&self) -> Vec<CaseOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn summary(&self) -> String {
        format!(
            "Test Results::: {}/{}, skipped {}",
            self.passed(),
            self.total(),
            self.skipped()
        )
    }

    pub fn elapsed_message(&self) -> String {
        match self.started_at() {
            Some(started_at) => elapsed_since(started_at, None),
            None => "Start timer not started!".to_string(),
        }
    }

    pub fn report(&self) -> RunReport {
        let elapsed_ms = self
            .started_at()
            .map(|started_at| elapsed_ms(started_at, Local::now()))
            .unwrap_or_default();

        RunReport {
            total: self.total(),
            passed: self.passed(),
            skipped: self.skipped(),
            failed: self.failed(),
            elapsed_ms,
            cases: self.outcomes(),
        }
    }
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn elapsed_ms(start: DateTime<Local>, end: DateTime<Local>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

/// Start, end and elapsed time as a three-line block. `end` defaults to now.
pub fn elapsed_since(start: DateTime<Local>, end: Option<DateTime<Local>>) -> String {
    let end = end.unwrap_or_else(Local::now);
    format!(
        " Start Time: {}\n   End Time: {}\nElapse Time: {}",
        format_timestamp(start),
        format_timestamp(end),
        format_duration_ms(elapsed_ms(start, end))
    )
}

/// Breaks a duration into units, dropping zero-valued leading units.
/// Milliseconds are always shown.
pub fn format_duration_ms(total_ms: u64) -> String {
    let units = [
        (total_ms / 86_400_000, "days"),
        (total_ms / 3_600_000 % 24, "hours"),
        (total_ms / 60_000 % 60, "minutes"),
        (total_ms / 1_000 % 60, "seconds"),
        (total_ms % 1_000, "milliseconds"),
    ];

    let first = units
        .iter()
        .position(|(value, _)| *value > 0)
        .unwrap_or(units.len() - 1);

    units[first..]
        .iter()
        .map(|(value, unit)| format!("{value} {unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}
