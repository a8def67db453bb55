use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Identity of a model object inside a [`ModelGraph`] arena.
///
/// Two references point at the same object exactly when their ids are equal.
/// Ids are only meaningful for the graph that allocated them.
///
/// [`ModelGraph`]: https://docs.rs/modelforge-model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(usize);

impl ObjectId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Arena index backing this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Severity of a validation issue.
///
/// Severities form a total order:
///
/// ```text
/// None < Info < Warning < Deprecation < Error
/// ```
///
/// # Example
///
/// ```rust
/// use modelforge_utils::types::Severity;
///
/// assert_eq!(Severity::Warning.combine(Severity::None), Severity::Warning);
/// assert_eq!(Severity::Error.combine(Severity::Info), Severity::Error);
///
/// let parsed: Severity = "deprecation".parse().unwrap();
/// assert_eq!(parsed, Severity::Deprecation);
/// assert_eq!(parsed.to_string(), "deprecation");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[repr(u8)]
pub enum Severity {
    /// No issue at all.
    #[default]
    None = 0,
    /// Informational note.
    Info = 1,
    /// Something looks wrong but the model is usable.
    Warning = 2,
    /// The model uses a construct that is going away.
    Deprecation = 3,
    /// The model is invalid.
    Error = 4,
}

impl Severity {
    /// Return the worse of two severities.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        if (self as u8) >= (other as u8) {
            self
        } else {
            other
        }
    }

    /// Fold any number of severities into the worst one (`None` when empty).
    #[must_use]
    pub fn worst<I>(severities: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        severities.into_iter().fold(Self::None, Self::combine)
    }

    /// Whether this severity reaches the given failure threshold.
    #[must_use]
    pub fn reaches(self, threshold: Self) -> bool {
        self != Self::None && self >= threshold
    }
}

/// A numbered stage of the build pipeline.
///
/// Phases are ordered by number; the name is informational and used in logs,
/// breadcrumbs and error messages. Phase `0` is reserved for object creation
/// by the caller and never has actions bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Phase {
    number: u32,
    name: Cow<'static, str>,
}

impl Phase {
    /// Creation by the front end. Not registrable.
    pub const CREATE: Phase = Phase::named(0, "create");
    /// Fill empty auto-create fields from their providers.
    pub const AUTO_CREATE: Phase = Phase::named(100, "auto-create");
    /// Assign owner back-references.
    pub const OWNER: Phase = Phase::named(200, "owner");
    /// Resolve link fields.
    pub const LINK: Phase = Phase::named(300, "link");
    /// Apply default values.
    pub const DEFAULT: Phase = Phase::named(400, "default");
    /// Run type-level post-process hooks over the whole tree.
    pub const POST_PROCESS: Phase = Phase::named(500, "post-process");
    /// Validate fields and objects, then aggregate.
    pub const VALIDATE: Phase = Phase::named(600, "validate");
    /// Freeze structural fields.
    pub const COMPLETE: Phase = Phase::named(700, "complete");

    /// The built-in phases in execution order.
    pub const BUILTIN: [Phase; 8] = [
        Self::CREATE,
        Self::AUTO_CREATE,
        Self::OWNER,
        Self::LINK,
        Self::DEFAULT,
        Self::POST_PROCESS,
        Self::VALIDATE,
        Self::COMPLETE,
    ];

    /// Build a phase with a static name, usable in `const` contexts.
    #[must_use]
    pub const fn named(number: u32, name: &'static str) -> Self {
        Self {
            number,
            name: Cow::Borrowed(name),
        }
    }

    #[must_use]
    pub fn new(number: u32, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            number,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the built-in phase with this number, if any.
    #[must_use]
    pub fn builtin_name(number: u32) -> Option<&'static str> {
        match number {
            0 => Some("create"),
            100 => Some("auto-create"),
            200 => Some("owner"),
            300 => Some("link"),
            400 => Some("default"),
            500 => Some("post-process"),
            600 => Some("validate"),
            700 => Some("complete"),
            _ => None,
        }
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.number)
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Graph path of the offending field or object, e.g. `root.servers[alpha].port`.
    pub path: String,
    /// Breadcrumb trail active when the issue was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadcrumb: Option<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(severity: Severity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: path.into(),
            breadcrumb: None,
        }
    }

    #[must_use]
    pub fn with_breadcrumb(mut self, breadcrumb: impl Into<String>) -> Self {
        self.breadcrumb = Some(breadcrumb.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.path, self.message)
    }
}

/// Every issue collected over a whole graph, plus the threshold that decides
/// whether the collection counts as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
    fail_on: Severity,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new(Severity::Error)
    }
}

impl ValidationReport {
    #[must_use]
    pub const fn new(fail_on: Severity) -> Self {
        Self {
            issues: Vec::new(),
            fail_on,
        }
    }

    #[must_use]
    pub fn from_issues(issues: Vec<ValidationIssue>, fail_on: Severity) -> Self {
        Self { issues, fail_on }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// All issues, in the order they were recorded.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    #[must_use]
    pub const fn fail_on(&self) -> Severity {
        self.fail_on
    }

    /// Issues at or above the failure threshold.
    pub fn failures(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.severity.reaches(self.fail_on))
    }

    #[must_use]
    pub fn worst(&self) -> Severity {
        Severity::worst(self.issues.iter().map(|i| i.severity))
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failures().next().is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }
}

impl fmt::Display for ValidationReport {
    /// Renders only the failing issues; the rest stay available via [`issues`](Self::issues).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures: Vec<_> = self.failures().collect();
        write!(
            f,
            "{} issue(s) at or above {} ({} total)",
            failures.len(),
            self.fail_on,
            self.issues.len()
        )?;
        for issue in failures {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_severity_total_order() {
        let ordered: Vec<Severity> = Severity::iter().collect();
        assert_eq!(
            ordered,
            vec![
                Severity::None,
                Severity::Info,
                Severity::Warning,
                Severity::Deprecation,
                Severity::Error,
            ]
        );
        assert!(ordered.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_severity_combine() {
        assert_eq!(Severity::Warning.combine(Severity::None), Severity::Warning);
        assert_eq!(Severity::None.combine(Severity::Warning), Severity::Warning);
        assert_eq!(Severity::Error.combine(Severity::Info), Severity::Error);
        assert_eq!(
            Severity::Deprecation.combine(Severity::Warning),
            Severity::Deprecation
        );
    }

    #[test]
    fn test_severity_worst_of_empty_is_none() {
        assert_eq!(Severity::worst(Vec::new()), Severity::None);
        assert_eq!(
            Severity::worst([Severity::Info, Severity::Error, Severity::Warning]),
            Severity::Error
        );
    }

    #[test]
    fn test_severity_parse_and_display() {
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
        assert_eq!(Severity::Deprecation.to_string(), "deprecation");
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let back: Severity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Severity::Warning);
    }

    #[test]
    fn test_none_never_reaches_threshold() {
        assert!(!Severity::None.reaches(Severity::None));
        assert!(Severity::Info.reaches(Severity::Info));
        assert!(!Severity::Warning.reaches(Severity::Error));
    }

    #[test]
    fn test_phase_ordering_by_number() {
        let custom = Phase::new(250, "custom");
        assert!(Phase::OWNER < custom);
        assert!(custom < Phase::LINK);
        assert_eq!(Phase::builtin_name(600), Some("validate"));
        assert_eq!(Phase::builtin_name(601), None);
        assert_eq!(Phase::VALIDATE.to_string(), "validate(600)");
    }

    #[test]
    fn test_report_failures_respect_threshold() {
        let mut report = ValidationReport::new(Severity::Error);
        report.push(ValidationIssue::new(Severity::Error, "root.x", "x is required"));
        report.push(ValidationIssue::new(Severity::Warning, "root.y", "y looks odd"));

        assert_eq!(report.len(), 2);
        assert_eq!(report.worst(), Severity::Error);
        assert!(report.is_failure());

        let failures: Vec<_> = report.failures().map(|i| i.path.as_str()).collect();
        assert_eq!(failures, vec!["root.x"]);

        let rendered = report.to_string();
        assert!(rendered.contains("root.x"));
        assert!(!rendered.contains("root.y"));
    }

    #[test]
    fn test_report_without_errors_is_not_failure() {
        let report = ValidationReport::from_issues(
            vec![ValidationIssue::new(Severity::Deprecation, "root.z", "old")],
            Severity::Error,
        );
        assert!(!report.is_failure());
        assert_eq!(report.worst(), Severity::Deprecation);
    }

    fn severity() -> impl proptest::strategy::Strategy<Value = Severity> {
        proptest::sample::select(Severity::iter().collect::<Vec<_>>())
    }

    proptest::proptest! {
        #[test]
        fn prop_report_failure_matches_worst(
            severities in proptest::collection::vec(severity(), 0..12),
            fail_on in severity(),
        ) {
            let issues = severities
                .iter()
                .enumerate()
                .map(|(i, s)| ValidationIssue::new(*s, format!("root.f{i}"), "m"))
                .collect();
            let report = ValidationReport::from_issues(issues, fail_on);
            proptest::prop_assert_eq!(report.worst(), Severity::worst(severities.iter().copied()));
            proptest::prop_assert_eq!(report.is_failure(), report.failures().next().is_some());
            proptest::prop_assert_eq!(report.is_failure(), report.worst().reaches(fail_on));
        }
    }
}
