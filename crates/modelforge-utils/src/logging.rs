//! Logging and observability infrastructure for modelforge
//!
//! Builds emit structured `tracing` events: one `build` span per outermost
//! build, one `phase` span per executed phase, and per-node events at `trace`
//! level. Installing a subscriber is left to the embedding application;
//! [`init_tracing`] is a convenience for binaries and tests.

use tracing::{Level, debug, error, event, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::types::{ObjectId, Phase, Severity, ValidationIssue};

/// Initialize a tracing subscriber for structured logging.
///
/// Respects `RUST_LOG` when set. Otherwise `verbose` selects
/// `modelforge=debug` instead of `modelforge=info`, and also emits span-close
/// events so phase durations show up in the output.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("modelforge=debug,warn")
            } else {
                EnvFilter::try_new("modelforge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span covering one outermost build.
pub fn build_span(root: ObjectId, root_type: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "build",
        root = %root,
        root_type = %root_type,
    )
}

/// Span covering one phase of a build.
pub fn phase_span(phase: &Phase) -> tracing::Span {
    span!(
        Level::DEBUG,
        "phase",
        phase = %phase.name(),
        number = phase.number(),
    )
}

pub fn log_build_start(root: ObjectId, root_type: &str, phase_count: usize) {
    info!(
        root = %root,
        root_type = %root_type,
        phase_count,
        "Starting build"
    );
}

pub fn log_build_complete(root: ObjectId, duration_ms: u128, worst: Severity) {
    info!(
        root = %root,
        duration_ms = %duration_ms,
        worst = %worst,
        "Build completed"
    );
}

pub fn log_phase_complete(phase: &Phase, visited: usize, duration_ms: u128) {
    debug!(
        phase = %phase.name(),
        visited,
        duration_ms = %duration_ms,
        "Phase completed"
    );
}

pub fn log_build_error(root: ObjectId, phase: &Phase, error: &dyn std::fmt::Display) {
    error!(
        root = %root,
        phase = %phase.name(),
        error = %error,
        "Build failed"
    );
}

/// Log a validation issue at the level matching its severity.
pub fn log_issue(issue: &ValidationIssue) {
    // event! needs a constant level, hence the match
    match issue.severity {
        Severity::Error => {
            event!(Level::ERROR, path = %issue.path, severity = %issue.severity, "{}", issue.message)
        }
        Severity::Warning | Severity::Deprecation => {
            event!(Level::WARN, path = %issue.path, severity = %issue.severity, "{}", issue.message)
        }
        Severity::Info => {
            event!(Level::INFO, path = %issue.path, severity = %issue.severity, "{}", issue.message)
        }
        Severity::None => {}
    }
}
