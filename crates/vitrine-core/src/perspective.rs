//! Perspective and per-request context.
//!
//! The perspective is decided exactly once per request, from the
//! [`EditingModeSignal`], and then passed down unchanged to the loader and
//! to any live subscription initialised from the loader's output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which variant of the content a query resolves against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// Published documents only.
    #[default]
    Published,
    /// Drafts overlaid on published documents.
    Draft,
}

impl Perspective {
    /// The value sent to the content store's `perspective` parameter.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "drafts",
        }
    }

    /// Returns `true` for [`Perspective::Draft`].
    pub fn is_draft(self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => f.write_str("published"),
            Self::Draft => f.write_str("draft"),
        }
    }
}

/// Whether the current request belongs to an authenticated editor preview
/// session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditingModeSignal {
    active: bool,
}

impl EditingModeSignal {
    /// A regular visitor request.
    pub fn inactive() -> Self {
        Self { active: false }
    }

    /// An editor preview request.
    pub fn active() -> Self {
        Self { active: true }
    }

    /// Whether editing mode is on.
    pub fn is_active(self) -> bool {
        self.active
    }
}

impl From<bool> for EditingModeSignal {
    fn from(active: bool) -> Self {
        Self { active }
    }
}

/// Read-only per-request state.
///
/// Built once from the editing-mode signal; the perspective it carries is
/// the only perspective used for the rest of the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    editing: EditingModeSignal,
    perspective: Perspective,
}

impl RequestContext {
    /// Resolve the request context from the editing-mode signal.
    pub fn new(editing: EditingModeSignal) -> Self {
        let perspective = if editing.is_active() {
            Perspective::Draft
        } else {
            Perspective::Published
        };
        Self {
            editing,
            perspective,
        }
    }

    /// A regular published request (build tooling, anonymous visitors).
    pub fn published() -> Self {
        Self::new(EditingModeSignal::inactive())
    }

    /// The editing-mode signal this context was built from.
    pub fn editing(&self) -> EditingModeSignal {
        self.editing
    }

    /// The perspective for every query of this request.
    pub fn perspective(&self) -> Perspective {
        self.perspective
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_perspective_from_signal() {
        assert_eq!(
            RequestContext::new(EditingModeSignal::active()).perspective(),
            Perspective::Draft
        );
        assert_eq!(
            RequestContext::new(EditingModeSignal::inactive()).perspective(),
            Perspective::Published
        );
        assert_eq!(RequestContext::published().perspective(), Perspective::Published);
    }

    #[test]
    fn test_api_strings() {
        assert_eq!(Perspective::Published.as_api_str(), "published");
        assert_eq!(Perspective::Draft.as_api_str(), "drafts");
    }

    #[test]
    fn test_signal_from_bool() {
        assert!(EditingModeSignal::from(true).is_active());
        assert!(!EditingModeSignal::from(false).is_active());
        assert!(!EditingModeSignal::default().is_active());
    }

    #[test]
    fn test_perspective_serde() {
        assert_eq!(serde_json::to_string(&Perspective::Draft).unwrap(), "\"draft\"");
        let p: Perspective = serde_json::from_str("\"published\"").unwrap();
        assert_eq!(p, Perspective::Published);
    }
}
