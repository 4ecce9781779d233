//! Per-window effect configuration.
//!
//! A pure function over the current settings and the window, called on every
//! synchronization pass.

use serde::{Deserialize, Serialize};

use crate::common::collections::HashMap;
use crate::common::config::{AppOverride, CornerSettings};
use crate::model::window::Window;

/// Space between the window frame and the visible, rounded content area.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Padding {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub right: f64,
    #[serde(default)]
    pub bottom: f64,
}

impl Padding {
    pub const ZERO: Padding = Padding { left: 0.0, top: 0.0, right: 0.0, bottom: 0.0 };

    pub const fn uniform(value: f64) -> Self {
        Padding {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (side, value) in [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
        ] {
            if !(value >= 0.0) {
                issues.push(format!("padding.{side} must be non-negative, got {value}"));
            }
        }
        issues
    }
}

/// Resolved, immutable effect configuration for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectConfig {
    pub padding: Padding,
    pub radius: f64,
    pub keep_rounded_corners: bool,
}

impl EffectConfig {
    /// Whether corners stay rounded for the window in its current state.
    ///
    /// Maximized and fullscreen windows lose their rounded corners unless the
    /// configuration explicitly keeps them.
    pub fn has_rounded_corners(&self, window: &Window) -> bool {
        self.keep_rounded_corners || !window.is_maximized_or_fullscreen()
    }

    /// Padding used to clip the blur overlay. Collapses to zero without corners.
    pub fn blur_padding(&self, has_rounded_corners: bool) -> Padding {
        if has_rounded_corners { self.padding } else { Padding::ZERO }
    }
}

impl From<&CornerSettings> for EffectConfig {
    fn from(settings: &CornerSettings) -> Self {
        EffectConfig {
            padding: settings.padding,
            radius: settings.border_radius,
            keep_rounded_corners: settings.keep_rounded_corners,
        }
    }
}

/// Picks the per-app override for `window` when one exists and is enabled,
/// otherwise the global defaults.
pub fn resolve(
    global: &CornerSettings,
    overrides: &HashMap<String, AppOverride>,
    window: &Window,
) -> EffectConfig {
    let custom = window
        .app_id()
        .and_then(|app| overrides.get(app))
        .filter(|custom| custom.enabled);

    match custom {
        Some(custom) => EffectConfig::from(&custom.corners()),
        None => EffectConfig::from(global),
    }
}

/// Blur radius actually applied: the provider's radius with rounded corners,
/// zero without. Sigma is never touched.
pub fn effective_blur_radius(provider_radius: f64, has_rounded_corners: bool) -> f64 {
    if has_rounded_corners { provider_radius } else { 0.0 }
}
