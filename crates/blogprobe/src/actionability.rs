//! Actionability: whether an element can take an input right now.
//!
//! State is derived from two snapshots taken one animation frame apart, so
//! an element that is still moving is reported as not stable even if every
//! other check passes.

use crate::driver::ElementSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed actionability of a single element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ActionableState {
    /// Present in the document
    pub attached: bool,
    /// Rendered and not hidden
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
    /// Accepts text entry
    pub editable: bool,
    /// Same bounding box in consecutive frames
    pub stable: bool,
    /// Hit-testing at the element's center reaches the element
    pub receives_events: bool,
}

impl ActionableState {
    /// Combine two snapshots of the same element taken a frame apart
    #[must_use]
    pub fn from_frames(before: &ElementSnapshot, after: &ElementSnapshot) -> Self {
        Self {
            attached: true,
            visible: after.visible,
            enabled: after.enabled,
            editable: after.editable,
            stable: before.bounds.is_some() && before.bounds == after.bounds,
            receives_events: after.receives_events,
        }
    }

    /// First requirement this state does not meet, in check order
    #[must_use]
    pub fn unmet(&self, req: Requirement) -> Option<Unmet> {
        if !self.attached {
            Some(Unmet::NotAttached)
        } else if !self.visible {
            Some(Unmet::NotVisible)
        } else if req.stable && !self.stable {
            Some(Unmet::NotStable)
        } else if req.enabled && !self.enabled {
            Some(Unmet::Disabled)
        } else if req.editable && !self.editable {
            Some(Unmet::NotEditable)
        } else if req.receives_events && !self.receives_events {
            Some(Unmet::Covered)
        } else {
            None
        }
    }
}

/// Which checks an action needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Requirement {
    /// Needs `enabled`
    pub enabled: bool,
    /// Needs `editable`
    pub editable: bool,
    /// Needs `stable`
    pub stable: bool,
    /// Needs `receives_events`
    pub receives_events: bool,
}

impl Requirement {
    /// Pointer actions on controls (click, check, uncheck)
    pub const POINTER: Self = Self {
        enabled: true,
        editable: false,
        stable: true,
        receives_events: true,
    };

    /// Hovering works on disabled elements too
    pub const HOVER: Self = Self {
        enabled: false,
        editable: false,
        stable: true,
        receives_events: true,
    };

    /// Text entry (fill, type)
    pub const TEXT_ENTRY: Self = Self {
        enabled: true,
        editable: true,
        stable: true,
        receives_events: true,
    };

    /// Keyboard and select actions
    pub const FOCUS: Self = Self {
        enabled: true,
        editable: false,
        stable: true,
        receives_events: true,
    };
}

/// A failed precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unmet {
    /// No element
    NotAttached,
    /// More than one element under strict mode
    Ambiguous,
    /// Hidden
    NotVisible,
    /// Still animating
    NotStable,
    /// Disabled
    Disabled,
    /// Read-only or not a text control
    NotEditable,
    /// Another element is on top
    Covered,
}

impl Unmet {
    /// The element is there and visible but refuses the input.
    ///
    /// When the deadline passes on one of these the failure is reported as a
    /// rejection rather than a timeout.
    #[must_use]
    pub const fn is_rejection(self) -> bool {
        matches!(self, Self::Disabled | Self::NotEditable | Self::Covered)
    }

    /// Condition phrase used in diagnostics ("be visible", ...)
    #[must_use]
    pub const fn condition(self) -> &'static str {
        match self {
            Self::NotAttached => "be attached",
            Self::Ambiguous => "resolve to exactly one element",
            Self::NotVisible => "be visible",
            Self::NotStable => "be stable",
            Self::Disabled => "be enabled",
            Self::NotEditable => "be editable",
            Self::Covered => "receive pointer events",
        }
    }
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotAttached => "element not found",
            Self::Ambiguous => "selector matched more than one element",
            Self::NotVisible => "element is not visible",
            Self::NotStable => "element is not stable",
            Self::Disabled => "element is disabled",
            Self::NotEditable => "element is not editable",
            Self::Covered => "element is covered by another element",
        };
        f.write_str(text)
    }
}
