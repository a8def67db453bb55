//! Validation of model objects
//!
//! [`validate_object`] checks one object: for each level of its type
//! hierarchy, most general first, the validate-tagged fields declared at
//! that level and then the level's object validators. [`ValidationPhase`]
//! runs it over a whole build, records every issue in the build context, and
//! only when the walk is over fails with a single
//! [`BuildError::ValidationFailed`] if any issue reaches the configured
//! threshold.

use anyhow::Result;
use tracing::{debug, trace};

use modelforge_model::ModelGraph;
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};
use modelforge_utils::error::{BuildError, ModelError};
use modelforge_utils::types::{ObjectId, ValidationIssue};

/// Check one object, reporting issues under `path`.
///
/// # Errors
///
/// Fails only for objects that are not part of `graph`; failed checks are
/// returned as issues.
pub fn validate_object(
    graph: &ModelGraph,
    id: ObjectId,
    path: &str,
) -> Result<Vec<ValidationIssue>, ModelError> {
    let registry = graph.registry();
    let type_name = graph.type_name(id)?;
    let mut issues = Vec::new();

    for level in registry.lineage(type_name) {
        for field in &level.fields {
            let Some(spec) = &field.validate else {
                continue;
            };
            let value = graph.get(id, &field.name)?;
            if spec.accepts(value) {
                continue;
            }
            let message = spec.message.clone().unwrap_or_else(|| {
                if spec.predicate.is_some() {
                    format!("Field '{}' failed validation", field.name)
                } else {
                    format!("Field '{}' is required", field.name)
                }
            });
            issues.push(ValidationIssue::new(
                spec.severity,
                format!("{path}.{}", field.name),
                message,
            ));
        }

        for validator in &level.validators {
            if let Err(err) = (validator.check)(graph, id) {
                trace!(path, validator = %validator.name, error = %err, "Object validator failed");
                issues.push(ValidationIssue::new(
                    validator.severity,
                    path,
                    format!("{}: {err}", validator.name),
                ));
            }
        }
    }
    Ok(issues)
}

/// Validation phase: collects issues over the whole graph and fails once at
/// the end.
#[derive(Debug, Clone, Default)]
pub struct ValidationPhase;

impl ValidationPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelVisitor for ValidationPhase {
    fn name(&self) -> &str {
        "validate"
    }

    fn visit(&self, cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        for issue in validate_object(graph, node.id, &node.path)? {
            cx.record_issue(issue);
        }
        Ok(())
    }

    fn finish(&self, cx: &mut BuildContext, _graph: &mut ModelGraph) -> Result<()> {
        let report = cx.validation_report();
        debug!(
            issues = report.len(),
            worst = %report.worst(),
            fail_on = %report.fail_on(),
            "Validation finished"
        );
        if report.is_failure() {
            return Err(BuildError::ValidationFailed(report).into());
        }
        Ok(())
    }
}
