use chrono::{DateTime, Utc};
use serde::Serialize;

use modelforge_utils::types::{ObjectId, Phase, Severity, ValidationIssue, ValidationReport};

/// Outcome of one executed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRun {
    pub phase: Phase,
    /// Actions run, deferred callbacks excluded.
    pub actions: usize,
    /// Objects handed to visiting actions, summed over the phase.
    pub visited: usize,
    pub duration_ms: u64,
}

/// Summary of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: ObjectId,
    /// Executed phases, in execution order.
    pub phases: Vec<PhaseRun>,
    /// Every validation issue collected, including those below the failure threshold.
    pub validation: ValidationReport,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BuildReport {
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        self.validation.issues()
    }

    #[must_use]
    pub fn worst(&self) -> Severity {
        self.validation.worst()
    }

    /// Numbers of the executed phases, in order.
    #[must_use]
    pub fn phase_numbers(&self) -> Vec<u32> {
        self.phases.iter().map(|run| run.phase.number()).collect()
    }

    #[must_use]
    pub fn run_of(&self, number: u32) -> Option<&PhaseRun> {
        self.phases.iter().find(|run| run.phase.number() == number)
    }
}
