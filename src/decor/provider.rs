//! Shadow and blur providers.
//!
//! The synchronizers never create the real shadow texture or blur effect; they
//! ask a provider for the actor it keeps for a window and clone from it. The
//! reference managers in this module keep one shadow actor and one blur actor
//! per live window in the window group.

use tracing::{debug, trace};

use crate::common::collections::HashMap;
use crate::common::config::Config;
use crate::decor::SHADOW_PADDING;
use crate::decor::resolver::{self, Padding, effective_blur_radius};
use crate::model::stage::{ActorId, ActorKind, BlurEffect, BlurMode, Stage};
use crate::model::window::WindowId;
use crate::sys::geometry::Rect;

/// Lifecycle shared by both managers.
pub trait EffectManager {
    fn enable(&mut self, stage: &mut Stage, config: &Config);
    fn disable(&mut self, stage: &mut Stage);
    fn is_enabled(&self) -> bool;

    /// Starts decorating a newly mapped window. No-op while disabled.
    fn attach(&mut self, stage: &mut Stage, config: &Config, window: WindowId);

    /// Drops the decorations of a window that is going away.
    fn detach(&mut self, stage: &mut Stage, window: WindowId);
}

pub trait ShadowProvider: EffectManager {
    /// The shadow actor kept for `window`, if it has one.
    fn query(&self, window: WindowId) -> Option<ActorId>;
    fn on_size_changed(&mut self, stage: &mut Stage, config: &Config, actor: ActorId);
    fn on_focus_changed(&mut self, stage: &mut Stage, config: &Config, window: WindowId);
}

pub trait BlurProvider: EffectManager {
    /// The blur actor kept for `window`, if it has one. Its first effect is a
    /// [`BlurEffect`] carrying the provider radius and sigma.
    fn query(&self, window: WindowId) -> Option<ActorId>;
    fn update_effect(&mut self, stage: &mut Stage, config: &Config, actor: ActorId);
    fn update_coordinates(&mut self, stage: &mut Stage, config: &Config, window: WindowId);
}

/// Corners state of `window` under the current config, or `None` if the
/// window is gone.
fn corners(stage: &Stage, config: &Config, window: WindowId) -> Option<(Padding, bool)> {
    let win = stage.window(window)?;
    let cfg = resolver::resolve(&config.rounded_corners, &config.custom, win);
    let has_rounded_corners = cfg.has_rounded_corners(win);
    Some((cfg.blur_padding(has_rounded_corners), has_rounded_corners))
}

#[derive(Default)]
pub struct ShadowManager {
    enabled: bool,
    shadows: HashMap<WindowId, ActorId>,
}

impl ShadowManager {
    pub fn new() -> Self { Self::default() }

    fn shadow_rect(stage: &Stage, window: WindowId) -> Option<Rect> {
        let frame = stage.window(window)?.frame_rect();
        Some(frame.inflate(SHADOW_PADDING * stage.window_scale_factor(window)))
    }

    fn update_opacity(&self, stage: &mut Stage, config: &Config, window: WindowId) {
        let Some(&shadow) = self.shadows.get(&window) else { return };
        let Some((_, has_rounded_corners)) = corners(stage, config, window) else { return };
        let focused = stage.window(window).is_some_and(|w| w.focused);
        let opacity = match (has_rounded_corners, focused) {
            // no corners, nothing to cast a shadow around
            (false, _) => 0,
            (true, true) => config.shadow.focused_opacity,
            (true, false) => config.shadow.unfocused_opacity,
        };
        stage.set_opacity(shadow, opacity);
    }
}

impl EffectManager for ShadowManager {
    fn enable(&mut self, stage: &mut Stage, config: &Config) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        for (_, window) in stage.window_actors() {
            self.attach(stage, config, window);
        }
        debug!(shadows = self.shadows.len(), "shadow manager enabled");
    }

    fn disable(&mut self, stage: &mut Stage) {
        for (_, shadow) in self.shadows.drain() {
            stage.destroy(shadow);
        }
        self.enabled = false;
        debug!("shadow manager disabled");
    }

    fn is_enabled(&self) -> bool { self.enabled }

    fn attach(&mut self, stage: &mut Stage, config: &Config, window: WindowId) {
        if !self.enabled || self.shadows.contains_key(&window) {
            return;
        }
        let Some(actor) = stage.window_actor(window) else { return };
        if config.is_black_listed(stage.window(window).and_then(|w| w.app_id())) {
            trace!(%window, "black listed, no shadow");
            return;
        }

        let shadow = stage.create_named(ActorKind::Bin, "shadow");
        let group = stage.window_group();
        stage.insert_child_above(group, shadow, Some(actor));
        if let Some(rect) = Self::shadow_rect(stage, window) {
            stage.set_rect(shadow, rect);
        }
        self.shadows.insert(window, shadow);
        self.update_opacity(stage, config, window);
    }

    fn detach(&mut self, stage: &mut Stage, window: WindowId) {
        if let Some(shadow) = self.shadows.remove(&window) {
            stage.destroy(shadow);
        }
    }
}

impl ShadowProvider for ShadowManager {
    fn query(&self, window: WindowId) -> Option<ActorId> { self.shadows.get(&window).copied() }

    fn on_size_changed(&mut self, stage: &mut Stage, config: &Config, actor: ActorId) {
        let Some(window) = stage.window_of(actor) else { return };
        let Some(&shadow) = self.shadows.get(&window) else { return };
        if let Some(rect) = Self::shadow_rect(stage, window) {
            trace!(%window, ?rect, "shadow resized");
            stage.set_rect(shadow, rect);
        }
        self.update_opacity(stage, config, window);
    }

    fn on_focus_changed(&mut self, stage: &mut Stage, config: &Config, window: WindowId) {
        self.update_opacity(stage, config, window);
    }
}

#[derive(Default)]
pub struct BlurManager {
    enabled: bool,
    blurs: HashMap<WindowId, ActorId>,
}

impl BlurManager {
    pub fn new() -> Self { Self::default() }

    fn blur_rect(stage: &Stage, config: &Config, window: WindowId) -> Option<Rect> {
        let frame = stage.window(window)?.frame_rect();
        let (padding, _) = corners(stage, config, window)?;
        let scale = stage.window_scale_factor(window);
        Some(Rect::new(
            frame.x + padding.left * scale,
            frame.y + padding.top * scale,
            frame.width - (padding.left + padding.right) * scale,
            frame.height - (padding.top + padding.bottom) * scale,
        ))
    }
}

impl EffectManager for BlurManager {
    fn enable(&mut self, stage: &mut Stage, config: &Config) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        for (_, window) in stage.window_actors() {
            self.attach(stage, config, window);
        }
        debug!(blurs = self.blurs.len(), "blur manager enabled");
    }

    fn disable(&mut self, stage: &mut Stage) {
        for (window, blur) in self.blurs.drain() {
            stage.destroy(blur);
            if let Some(actor) = stage.window_actor(window) {
                stage.set_opacity(actor, 255);
            }
        }
        self.enabled = false;
        debug!("blur manager disabled");
    }

    fn is_enabled(&self) -> bool { self.enabled }

    fn attach(&mut self, stage: &mut Stage, config: &Config, window: WindowId) {
        if !self.enabled || self.blurs.contains_key(&window) {
            return;
        }
        let Some(actor) = stage.window_actor(window) else { return };
        let app_id = stage.window(window).and_then(|w| w.app_id());
        if config.is_black_listed(app_id) || !config.blur.applies_to(app_id) {
            return;
        }

        let blur = stage.create_named(ActorKind::Bin, "blur");
        stage.add_effect(
            blur,
            BlurEffect {
                mode: BlurMode::Background,
                radius: config.blur.radius,
                sigma: config.blur.sigma,
            },
        );
        let group = stage.window_group();
        stage.insert_child_below(group, blur, Some(actor));
        stage.set_opacity(actor, config.blur.window_opacity);
        self.blurs.insert(window, blur);

        self.update_effect(stage, config, actor);
        self.update_coordinates(stage, config, window);
    }

    fn detach(&mut self, stage: &mut Stage, window: WindowId) {
        if let Some(blur) = self.blurs.remove(&window) {
            stage.destroy(blur);
        }
    }
}

impl BlurProvider for BlurManager {
    fn query(&self, window: WindowId) -> Option<ActorId> { self.blurs.get(&window).copied() }

    fn update_effect(&mut self, stage: &mut Stage, config: &Config, actor: ActorId) {
        let Some(window) = stage.window_of(actor) else { return };
        let Some(&blur) = self.blurs.get(&window) else { return };
        let Some((_, has_rounded_corners)) = corners(stage, config, window) else { return };
        if let Some(effect) = stage.blur_effect_mut(blur) {
            effect.radius = effective_blur_radius(config.blur.radius, has_rounded_corners);
            effect.sigma = config.blur.sigma;
        }
    }

    fn update_coordinates(&mut self, stage: &mut Stage, config: &Config, window: WindowId) {
        let Some(&blur) = self.blurs.get(&window) else { return };
        if let Some(rect) = Self::blur_rect(stage, config, window) {
            trace!(%window, ?rect, "blur moved");
            stage.set_rect(blur, rect);
        }
    }
}
