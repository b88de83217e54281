//! Injected logging handle.
//!
//! Every component receives a clone of the [`Diagnostics`] handed to the
//! generator builder. Events are emitted through `tracing` inside the
//! handle's span, and soft warnings are also recorded so callers can inspect
//! them after a run.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Span;

/// A non-fatal problem found while generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Two topics in one set differ only by letter case.
    CaseDuplicateTopic { topic: String, other: String },
    /// An article names an author that has no page.
    MissingAuthor { author: String, article: String },
    /// A page was given a bare rule instead of a list of rules.
    SingleRule { slug: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::CaseDuplicateTopic { topic, other } => {
                write!(f, "Possible duplicate topic case '{topic}' and '{other}'")
            }
            Warning::MissingAuthor { author, article } => {
                write!(f, "No existing author {author} for {article}")
            }
            Warning::SingleRule { slug } => {
                write!(f, "Rule not single item list for {slug}")
            }
        }
    }
}

#[derive(Clone)]
pub struct Diagnostics {
    span: Span,
    warnings: Arc<Mutex<Vec<Warning>>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(tracing::info_span!("flatearth"))
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("warnings", &self.warnings().len())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            warnings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle for a sub-component. Shares the warning record, nests the span.
    pub fn child(&self, component: &'static str, name: &str) -> Self {
        Self {
            span: tracing::debug_span!(parent: &self.span, "component", kind = component, id = name),
            warnings: Arc::clone(&self.warnings),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` with the handle's span entered.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    pub fn warn(&self, warning: Warning) {
        self.span.in_scope(|| tracing::warn!("{warning}"));
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shares_warnings() {
        let diagnostics = Diagnostics::default();
        let child = diagnostics.child("meta_processor", "topics");
        child.warn(Warning::SingleRule { slug: "about".into() });

        assert_eq!(
            diagnostics.warnings(),
            vec![Warning::SingleRule { slug: "about".into() }]
        );
    }
}
