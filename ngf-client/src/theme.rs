//! Haptic theme effects
//!
//! Standard touch-feedback effects and the daemon events that render them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeEffect {
    Press,
    Release,
    PressWeak,
    ReleaseWeak,
    PressStrong,
    ReleaseStrong,
    DragStart,
    DragDropInZone,
    DragDropOutOfZone,
    DragCrossBoundary,
    Appear,
    Disappear,
    Move,
}

impl ThemeEffect {
    pub const ALL: [ThemeEffect; 13] = [
        ThemeEffect::Press,
        ThemeEffect::Release,
        ThemeEffect::PressWeak,
        ThemeEffect::ReleaseWeak,
        ThemeEffect::PressStrong,
        ThemeEffect::ReleaseStrong,
        ThemeEffect::DragStart,
        ThemeEffect::DragDropInZone,
        ThemeEffect::DragDropOutOfZone,
        ThemeEffect::DragCrossBoundary,
        ThemeEffect::Appear,
        ThemeEffect::Disappear,
        ThemeEffect::Move,
    ];

    /// Daemon event that renders this effect, if there is one
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            ThemeEffect::Press => Some("feedback_press"),
            ThemeEffect::Release => Some("feedback_release"),
            ThemeEffect::PressWeak => Some("feedback_press_weak"),
            ThemeEffect::ReleaseWeak => Some("feedback_release_weak"),
            ThemeEffect::PressStrong => Some("feedback_press_strong"),
            ThemeEffect::ReleaseStrong => Some("feedback_release_strong"),
            ThemeEffect::DragStart => Some("feedback_drag_start"),
            ThemeEffect::DragDropInZone => Some("feedback_drag_drop_in_zone"),
            ThemeEffect::DragDropOutOfZone => Some("feedback_drag_drop_out_of_zone"),
            ThemeEffect::DragCrossBoundary => Some("feedback_drag_cross_boundary"),
            ThemeEffect::Appear | ThemeEffect::Disappear | ThemeEffect::Move => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.event_name().is_some()
    }
}

/// Event played by `NgfClient::play_haptic`
pub const HAPTIC_ALERT_EVENT: &str = "feedback_alert";

/// Property carrying the haptic duration in milliseconds
pub const HAPTIC_DURATION_PROPERTY: &str = "haptic.duration";
