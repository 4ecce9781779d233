//! Overlays for containers that keep resizing (the overview thumbnails).
//!
//! Overlays are bound to the container with four constraints. Whenever the
//! container width changes, the constraint offsets are recomputed from the
//! ratio between the container width and the window frame width.

use tracing::{trace, warn};

use crate::decor::resolver::{Padding, effective_blur_radius};
use crate::decor::{Decorations, Overlays, SHADOW_PADDING};
use crate::model::stage::{
    ActorId, ActorKind, BindConstraint, BindCoordinate, BlurEffect, BlurMode, Property, Stage,
};
use crate::model::window::WindowId;
use crate::sys::geometry::Point;

#[derive(Debug, Clone, Copy)]
pub struct LiveTarget {
    pub window: WindowId,
    /// Actor the overlays are inserted into, next to `container`.
    pub parent: ActorId,
    pub container: ActorId,
}

/// Shadow constraint offsets for the X, Y, Width and Height slots.
///
/// The leading slots get `-p` and the trailing ones `+2p`. Returns `None`
/// when the frame width is zero.
pub fn shadow_offsets(container_width: f64, frame_width: f64, backing_scale: f64) -> Option<[f64; 4]> {
    let ratio = container_width / frame_width;
    if !ratio.is_finite() {
        return None;
    }
    let p = ratio * (SHADOW_PADDING * backing_scale);
    Some([-p, -p, p * 2.0, p * 2.0])
}

/// Blur constraint offsets for the X, Y, Width and Height slots.
pub fn blur_offsets(container_width: f64, frame_width: f64, padding: Padding) -> Option<[f64; 4]> {
    let scale = container_width / frame_width;
    if !scale.is_finite() {
        return None;
    }
    Some([
        padding.left * scale,
        padding.top * scale,
        -(padding.left + padding.right) * scale,
        -(padding.top + padding.bottom) * scale,
    ])
}

fn apply_offsets(stage: &mut Stage, overlay: ActorId, offsets: [f64; 4]) {
    for (i, offset) in offsets.into_iter().enumerate() {
        stage.set_constraint_offset(overlay, i, offset);
    }
}

fn frame_width(stage: &Stage, window: WindowId) -> Option<f64> {
    stage.window(window).map(|w| w.frame_rect().width)
}

fn update_shadow(stage: &mut Stage, window: WindowId, container: ActorId, overlay: ActorId) {
    let Some(frame_width) = frame_width(stage, window) else { return };
    let backing_scale = stage.window_scale_factor(window);
    match shadow_offsets(stage.width(container), frame_width, backing_scale) {
        Some(offsets) => apply_offsets(stage, overlay, offsets),
        None => trace!(%window, "zero frame width, shadow offsets left as is"),
    }
}

fn update_blur(
    stage: &mut Stage,
    window: WindowId,
    container: ActorId,
    overlay: ActorId,
    padding: Padding,
) {
    let Some(frame_width) = frame_width(stage, window) else { return };
    match blur_offsets(stage.width(container), frame_width, padding) {
        Some(offsets) => apply_offsets(stage, overlay, offsets),
        None => trace!(%window, "zero frame width, blur offsets left as is"),
    }
}

/// Gives `overlay` the container's scale and four constraints sourced from it.
fn bind_to_container(stage: &mut Stage, overlay: ActorId, container: ActorId) {
    stage.set_pivot(overlay, Point::new(0.5, 0.5));
    stage.bind_scale(container, overlay);
    for coordinate in BindCoordinate::ALL {
        stage.add_constraint(overlay, BindConstraint {
            coordinate,
            source: container,
            offset: 0.0,
        });
    }
}

/// Attaches shadow and blur overlays to a resizing window container.
pub fn decorate(stage: &mut Stage, decorations: &Decorations, target: LiveTarget) -> Overlays {
    let LiveTarget { window, parent, container } = target;
    let mut overlays = Overlays::default();

    let shadow = decorations.shadow.query(window);
    let blur = decorations.blur.query(window);
    if shadow.is_none() && blur.is_none() {
        return overlays;
    }
    let Some(win) = stage.window(window) else {
        warn!(%window, "decorating a container of an unknown window");
        return overlays;
    };
    let cfg = decorations.resolve(win);
    let has_rounded_corners = cfg.has_rounded_corners(win);

    if let Some(source) = shadow
        && has_rounded_corners
    {
        let overlay = stage.create_named(ActorKind::Clone { source }, "shadow-clone");
        bind_to_container(stage, overlay, container);
        update_shadow(stage, window, container, overlay);
        stage.connect(container, Property::Width, move |stage| {
            update_shadow(stage, window, container, overlay)
        });
        stage.insert_child_above(parent, overlay, Some(container));
        overlays.shadow = Some(overlay);
    }

    if let Some(source) = blur {
        let Some(effect) = stage.blur_effect(source) else {
            warn!(%window, "blur provider actor carries no blur effect");
            return overlays;
        };
        let overlay = stage.create_named(ActorKind::Bin, "blur-clone");
        stage.add_effect(overlay, BlurEffect {
            mode: BlurMode::Background,
            radius: effective_blur_radius(effect.radius, has_rounded_corners),
            sigma: effect.sigma,
        });
        bind_to_container(stage, overlay, container);

        let padding = cfg.blur_padding(has_rounded_corners);
        update_blur(stage, window, container, overlay, padding);
        stage.connect(container, Property::Width, move |stage| {
            update_blur(stage, window, container, overlay, padding)
        });

        stage.set_opacity(container, decorations.config.blur.window_opacity);
        stage.insert_child_below(parent, overlay, Some(container));
        overlays.blur = Some(overlay);
    }

    trace!(%window, ?overlays, "live overlays attached");
    overlays
}
