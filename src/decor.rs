//! Shadow and blur decorations for windows in every presentation context.

pub mod clone;
pub mod hooks;
pub mod live;
pub mod provider;
pub mod recovery;
pub mod resolver;
pub mod status;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::config::Config;
use crate::decor::provider::{BlurManager, BlurProvider, ShadowManager, ShadowProvider};
use crate::decor::resolver::EffectConfig;
use crate::model::stage::{ActorId, Stage};
use crate::model::window::{Window, WindowId};

/// Distance the shadow texture extends past the window frame, in logical
/// units at scale 1.
pub const SHADOW_PADDING: f64 = 80.0;

/// Depth offset between a workspace-switch clone and its overlays.
pub const DEPTH_EPSILON: f64 = 0.006;

/// Where a window container is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentationContext {
    Live,
    Overview,
    WorkspaceSwitch,
}

impl PresentationContext {
    /// Containers in these contexts keep resizing and notify about it.
    pub fn is_continuous(self) -> bool { !matches!(self, PresentationContext::WorkspaceSwitch) }
}

/// Overlay actors created for one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlays {
    pub shadow: Option<ActorId>,
    pub blur: Option<ActorId>,
}

/// Settings and providers shared by the synchronizers and the hook wrappers.
pub struct Decorations {
    pub config: Config,
    pub shadow: Box<dyn ShadowProvider>,
    pub blur: Box<dyn BlurProvider>,
}

impl Decorations {
    pub fn new(config: Config) -> Self {
        Self::with_providers(config, Box::new(ShadowManager::new()), Box::new(BlurManager::new()))
    }

    pub fn with_providers(
        config: Config,
        shadow: Box<dyn ShadowProvider>,
        blur: Box<dyn BlurProvider>,
    ) -> Self {
        Decorations { config, shadow, blur }
    }

    pub fn resolve(&self, window: &Window) -> EffectConfig {
        resolver::resolve(&self.config.rounded_corners, &self.config.custom, window)
    }

    pub fn enable_managers(&mut self, stage: &mut Stage) {
        if self.config.blur.enabled {
            self.blur.enable(stage, &self.config);
        }
        self.shadow.enable(stage, &self.config);
        info!(blur = self.blur.is_enabled(), "effect managers enabled");
    }

    pub fn disable_managers(&mut self, stage: &mut Stage) {
        self.shadow.disable(stage);
        self.blur.disable(stage);
        info!("effect managers disabled");
    }

    pub fn set_blur_enabled(&mut self, stage: &mut Stage, enabled: bool) {
        self.config.blur.enabled = enabled;
        if enabled {
            self.blur.enable(stage, &self.config);
        } else {
            self.blur.disable(stage);
        }
    }

    pub fn window_added(&mut self, stage: &mut Stage, window: WindowId) {
        self.shadow.attach(stage, &self.config, window);
        self.blur.attach(stage, &self.config, window);
    }

    pub fn window_removed(&mut self, stage: &mut Stage, window: WindowId) {
        self.shadow.detach(stage, window);
        self.blur.detach(stage, window);
    }

    /// Re-runs geometry and focus-dependent updates for a live window actor.
    pub fn refresh(&mut self, stage: &mut Stage, actor: ActorId) {
        let Some(window) = stage.window_of(actor) else { return };
        debug!(%window, "refreshing live decorations");
        self.shadow.on_size_changed(stage, &self.config, actor);
        self.shadow.on_focus_changed(stage, &self.config, window);
        self.blur.update_effect(stage, &self.config, actor);
        self.blur.update_coordinates(stage, &self.config, window);
    }

    /// Decorates `container` (a child of `parent`) with the synchronizer that
    /// owns `context`.
    pub fn decorate(
        &self,
        stage: &mut Stage,
        context: PresentationContext,
        window: WindowId,
        parent: ActorId,
        container: ActorId,
    ) -> Overlays {
        if context.is_continuous() {
            return live::decorate(stage, self, live::LiveTarget { window, parent, container });
        }
        match stage.window_actor(window) {
            Some(window_actor) => clone::decorate(stage, self, parent, clone::WindowRecord {
                window_actor,
                clone: container,
            }),
            None => Overlays::default(),
        }
    }
}
