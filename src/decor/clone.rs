//! Overlays for the static window clones of the workspace-switch animation.
//!
//! These clones never resize, so geometry is computed once from the window
//! frame. The only thing that changes during the animation is depth, which
//! the overlays mirror with a small offset so they never fight the clone.

use tracing::{trace, warn};

use crate::decor::resolver::{Padding, effective_blur_radius};
use crate::decor::{DEPTH_EPSILON, Decorations, Overlays, SHADOW_PADDING};
use crate::model::stage::{ActorId, ActorKind, BlurEffect, BlurMode, Property, Stage};
use crate::sys::geometry::{Point, Rect};

/// A window actor together with the clone the animation built for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub window_actor: ActorId,
    pub clone: ActorId,
}

/// Shadow rectangle around a clone. `offset` is the clone position minus the
/// window actor position; `p` is the scaled shadow padding.
pub fn shadow_rect(offset: Point, frame: Rect, p: f64) -> Rect {
    Rect::new(
        offset.x + frame.x - p,
        offset.y + frame.y - p,
        frame.width + p * 2.0,
        frame.height + p * 2.0,
    )
}

/// Blur rectangle inside a clone, shrunk by the padding at `scale`.
pub fn blur_rect(offset: Point, frame: Rect, padding: Padding, scale: f64) -> Rect {
    Rect::new(
        offset.x + frame.x + padding.left * scale,
        offset.y + frame.y + padding.top * scale,
        frame.width - (padding.left + padding.right) * scale,
        frame.height - (padding.top + padding.bottom) * scale,
    )
}

fn mirror_depth(stage: &mut Stage, clone: ActorId, overlay: ActorId, epsilon: f64) {
    stage.set_translation_z(overlay, stage.translation_z(clone) + epsilon);
    stage.connect(clone, Property::TranslationZ, move |stage| {
        let z = stage.translation_z(clone);
        stage.set_translation_z(overlay, z + epsilon);
    });
}

/// Adds shadow and blur overlays next to `record.clone` inside `group`.
pub fn decorate(
    stage: &mut Stage,
    decorations: &Decorations,
    group: ActorId,
    record: WindowRecord,
) -> Overlays {
    let WindowRecord { window_actor, clone } = record;
    let mut overlays = Overlays::default();

    let Some(window) = stage.window_of(window_actor) else {
        warn!(?window_actor, "workspace record without a window");
        return overlays;
    };
    let Some(win) = stage.window(window) else { return overlays };
    let frame = win.frame_rect();
    let cfg = decorations.resolve(win);
    let has_rounded_corners = cfg.has_rounded_corners(win);

    let backing_scale = stage.window_scale_factor(window);
    let clone_pos = stage.position(clone);
    let actor_pos = stage.position(window_actor);
    let offset = Point::new(clone_pos.x - actor_pos.x, clone_pos.y - actor_pos.y);

    if let Some(source) = decorations.shadow.query(window)
        && has_rounded_corners
    {
        let overlay = stage.create_named(ActorKind::Clone { source }, "shadow-clone");
        stage.set_rect(overlay, shadow_rect(offset, frame, SHADOW_PADDING * backing_scale));
        mirror_depth(stage, clone, overlay, DEPTH_EPSILON);
        stage.insert_child_above(group, overlay, Some(clone));
        overlays.shadow = Some(overlay);
    }

    if let Some(source) = decorations.blur.query(window) {
        let Some(effect) = stage.blur_effect(source) else {
            warn!(%window, "blur provider actor carries no blur effect");
            return overlays;
        };
        let padding = cfg.blur_padding(has_rounded_corners);
        let overlay = stage.create_named(ActorKind::Bin, "blur-clone");
        stage.set_pivot(overlay, Point::new(0.5, 0.5));
        stage.set_rect(overlay, blur_rect(offset, frame, padding, backing_scale));
        stage.add_effect(overlay, BlurEffect {
            mode: BlurMode::Background,
            radius: effective_blur_radius(effect.radius, has_rounded_corners),
            sigma: effect.sigma,
        });
        mirror_depth(stage, clone, overlay, -DEPTH_EPSILON);
        stage.set_opacity(clone, decorations.config.blur.window_opacity);
        stage.insert_child_below(group, overlay, Some(clone));
        overlays.blur = Some(overlay);
    }

    trace!(%window, ?overlays, "workspace clone overlays attached");
    overlays
}
