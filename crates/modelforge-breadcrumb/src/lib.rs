//! Breadcrumb paths for build diagnostics
//!
//! A [`BreadcrumbTracker`] keeps a stack of segments naming the object that is
//! currently being processed. Callers [`prepare`](BreadcrumbTracker::prepare)
//! a `(verb, type, qualifier)` triple and then [`enter`](BreadcrumbTracker::enter);
//! the rendered [`path`](BreadcrumbTracker::path) is attached to log events and
//! validation issues.
//!
//! Siblings with identical composition under the same parent are told apart
//! by an occurrence counter: the first is `foo(bar)`, the second `foo(bar)[2]`.
//! Top-level segments are never numbered: only one can be on the stack at a
//! time, and emptying the stack releases every counter.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

/// Separator used by [`BreadcrumbTracker::default`]
pub const DEFAULT_SEPARATOR: &str = " > ";

/// Composition of one segment, before occurrence counting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crumb {
    pub verb: Option<String>,
    pub type_name: String,
    pub qualifier: Option<String>,
}

impl Crumb {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            verb: None,
            type_name: type_name.into(),
            qualifier: None,
        }
    }

    #[must_use]
    pub fn verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }

    #[must_use]
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

impl fmt::Display for Crumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(verb) = &self.verb {
            write!(f, "{verb} ")?;
        }
        f.write_str(&self.type_name)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, "({qualifier})")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Frame {
    segment: String,
    /// Occurrences of each child composition seen under this frame.
    children: HashMap<String, usize>,
}

/// Stack of rendered path segments for one build.
#[derive(Debug)]
pub struct BreadcrumbTracker {
    separator: String,
    pending: Option<Crumb>,
    frames: Vec<Frame>,
}

impl Default for BreadcrumbTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl BreadcrumbTracker {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            pending: None,
            frames: Vec::new(),
        }
    }

    /// Stage the composition of the next segment. Replaces anything staged
    /// but not yet entered.
    pub fn prepare(&mut self, crumb: Crumb) {
        self.pending = Some(crumb);
    }

    /// Push the staged segment; the staged triple is consumed.
    ///
    /// Entering with nothing staged pushes an anonymous `?` segment so that
    /// every `enter` still pairs with a `leave`.
    pub fn enter(&mut self) -> &str {
        let base = self
            .pending
            .take()
            .map_or_else(|| "?".to_string(), |crumb| crumb.to_string());

        let occurrence = self.frames.last_mut().map_or(1, |parent| {
            let seen = parent.children.entry(base.clone()).or_insert(0);
            *seen += 1;
            *seen
        });

        let segment = if occurrence > 1 {
            format!("{base}[{occurrence}]")
        } else {
            base
        };
        trace!(segment = %segment, depth = self.frames.len() + 1, "Entered breadcrumb");
        self.frames.push(Frame {
            segment,
            children: HashMap::new(),
        });
        self.current().unwrap_or_default()
    }

    /// Prepare and enter in one call.
    pub fn push(&mut self, crumb: Crumb) -> &str {
        self.prepare(crumb);
        self.enter()
    }

    /// Pop the top segment. Once the stack is empty every piece of state,
    /// including a staged triple, is released.
    pub fn leave(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.reset();
        }
    }

    /// Drop all state.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.pending = None;
    }

    /// Run `f` inside a segment, leaving it afterwards whatever `f` returns.
    pub fn scoped<R>(&mut self, crumb: Crumb, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(crumb);
        let result = f(self);
        self.leave();
        result
    }

    /// Segment on top of the stack.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.frames.last().map(|f| f.segment.as_str())
    }

    /// Segments joined from root to leaf.
    #[must_use]
    pub fn path(&self) -> String {
        self.frames
            .iter()
            .map(|f| f.segment.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.pending.is_none()
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }
}
