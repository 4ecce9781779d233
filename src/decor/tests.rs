use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use test_log::test;

use super::hooks::{self, HookGuard};
use super::resolver::Padding;
use super::*;
use crate::common::config::AppOverride;
use crate::model::stage::{ActorKind, BlurEffect, BlurMode, Monitor};
use crate::sys::geometry::{IsWithin, Rect};
use crate::sys::host::Host;

const FRAME: Rect = Rect::new(100.0, 100.0, 800.0, 600.0);

fn config() -> Config {
    let mut config = Config::default();
    config.rounded_corners.padding = Padding::uniform(10.0);
    config.blur.enabled = true;
    config.blur.apps = vec!["app".to_string()];
    config.blur.radius = 24.0;
    config.blur.sigma = 30.0;
    config
}

struct Harness {
    host: Host,
    decorations: Rc<RefCell<Decorations>>,
    guard: Option<HookGuard>,
}

impl Harness {
    fn new(config: Config) -> Self { Self::with_windows(config, &[(1, FRAME)]) }

    fn with_windows(config: Config, windows: &[(u32, Rect)]) -> Self {
        let mut host = Host::new();
        for &(id, frame) in windows {
            host.map_window(Window::new(WindowId::new(id), Some("app"), frame));
        }
        let decorations = Rc::new(RefCell::new(Decorations::new(config)));
        decorations.borrow_mut().enable_managers(host.stage_mut());
        let table = host.hooks().clone();
        let guard = hooks::install(&table, &decorations, host.stage_mut()).unwrap();
        Harness { host, decorations, guard: Some(guard) }
    }

    fn stage(&self) -> &Stage { self.host.stage() }

    fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.release(self.host.stage_mut());
        }
    }

    /// `(blur, container, shadow)` of the overview preview of window 1.
    fn preview_overlays(&self) -> (Option<ActorId>, ActorId, Option<ActorId>) {
        let preview = self.host.preview(WindowId::new(1)).unwrap();
        let stage = self.stage();
        let below = stage.prev_sibling(preview.container);
        let above = stage.next_sibling(preview.container);
        (below, preview.container, above)
    }

    fn offsets(&self, overlay: ActorId) -> Vec<f64> {
        self.stage().constraints(overlay).iter().map(|c| c.offset).collect()
    }
}

fn name(stage: &Stage, actor: Option<ActorId>) -> Option<&'static str> {
    actor.and_then(|a| stage.actor(a)).and_then(|a| a.name())
}

#[test]
fn it_scales_blur_offsets_with_the_overview_container() {
    let mut h = Harness::new(config());
    h.host.open_overview();
    h.host.resize_preview(WindowId::new(1), 0.5);

    let (blur, container, _) = h.preview_overlays();
    let blur = blur.unwrap();
    assert_eq!(name(h.stage(), Some(blur)), Some("blur-clone"));
    assert_eq!(h.offsets(blur), vec![5.0, 5.0, -10.0, -10.0]);
    assert_eq!(h.stage().allocation(container), Rect::new(0.0, 0.0, 400.0, 300.0));
    assert_eq!(h.stage().allocation(blur), Rect::new(5.0, 5.0, 390.0, 290.0));
    assert_eq!(h.stage().opacity(container), config().blur.window_opacity);
}

#[test]
fn it_recomputes_offsets_on_every_container_resize() {
    let mut h = Harness::new(config());
    h.host.open_overview();
    let (blur, _, shadow) = h.preview_overlays();
    let (blur, shadow) = (blur.unwrap(), shadow.unwrap());

    // attach time, container still at frame size
    assert_eq!(h.offsets(blur), vec![10.0, 10.0, -20.0, -20.0]);
    assert_eq!(h.offsets(shadow), vec![-80.0, -80.0, 160.0, 160.0]);

    h.host.resize_preview(WindowId::new(1), 0.25);
    assert_eq!(h.offsets(blur), vec![2.5, 2.5, -5.0, -5.0]);
    assert_eq!(h.offsets(shadow), vec![-20.0, -20.0, 40.0, 40.0]);
}

// Characterization of the current shadow formula, not a statement that the
// trailing slots are correct.
#[test]
fn it_pins_the_asymmetric_shadow_offsets() {
    let mut h = Harness::new(config());
    h.host.open_overview();
    h.host.resize_preview(WindowId::new(1), 0.5);

    let (_, _, shadow) = h.preview_overlays();
    let shadow = shadow.unwrap();
    assert_eq!(h.offsets(shadow), vec![-40.0, -40.0, 80.0, 80.0]);
    assert_eq!(h.stage().allocation(shadow), Rect::new(-40.0, -40.0, 480.0, 380.0));
}

#[test]
fn it_scales_shadow_padding_by_the_backing_scale() {
    let mut h = Harness::new(config());
    h.host.set_monitors(vec![Monitor { rect: Rect::new(0.0, 0.0, 1920.0, 1080.0), scale: 2.0 }]);
    h.host.open_overview();
    h.host.resize_preview(WindowId::new(1), 0.5);
    let (_, _, shadow) = h.preview_overlays();
    assert_eq!(h.offsets(shadow.unwrap()), vec![-80.0, -80.0, 160.0, 160.0]);

    h.host.stage_mut().set_framebuffer_scaling(true);
    h.host.resize_preview(WindowId::new(1), 0.25);
    assert_eq!(h.offsets(shadow.unwrap()), vec![-20.0, -20.0, 40.0, 40.0]);
}

#[test]
fn it_binds_overlay_scale_to_the_container() {
    let mut h = Harness::new(config());
    h.host.open_overview();
    let (blur, container, shadow) = h.preview_overlays();
    h.host.stage_mut().set_scale(container, 0.8, 0.8);
    assert_eq!(h.stage().scale(blur.unwrap()), (0.8, 0.8));
    assert_eq!(h.stage().scale(shadow.unwrap()), (0.8, 0.8));
}

#[test]
fn it_keeps_overlay_z_order_in_every_context() {
    let mut h = Harness::new(config());
    let stage = h.host.stage();
    let actor = stage.window_actor(WindowId::new(1)).unwrap();
    assert_eq!(name(stage, stage.prev_sibling(actor)), Some("blur"));
    assert_eq!(name(stage, stage.next_sibling(actor)), Some("shadow"));

    h.host.open_overview();
    let (blur, _, shadow) = h.preview_overlays();
    assert_eq!(name(h.stage(), blur), Some("blur-clone"));
    assert_eq!(name(h.stage(), shadow), Some("shadow-clone"));

    let records = h.host.switch_workspace();
    let clone = records[0].clone;
    let stage = h.host.stage();
    assert_eq!(name(stage, stage.prev_sibling(clone)), Some("blur-clone"));
    assert_eq!(name(stage, stage.next_sibling(clone)), Some("shadow-clone"));
}

#[test]
fn it_places_workspace_clone_overlays_from_the_frame() {
    let mut h = Harness::new(config());
    let records = h.host.switch_workspace();
    let clone = records[0].clone;
    let stage = h.host.stage();
    let shadow = stage.next_sibling(clone).unwrap();
    let blur = stage.prev_sibling(clone).unwrap();

    assert_eq!(stage.allocation(shadow), Rect::new(20.0, 20.0, 960.0, 760.0));
    assert_eq!(stage.allocation(blur), Rect::new(110.0, 110.0, 780.0, 580.0));
    assert!(stage.constraints(shadow).is_empty());
    assert_eq!(stage.listener_count(clone), 2);
    assert_eq!(stage.opacity(clone), config().blur.window_opacity);
}

#[test]
fn it_mirrors_clone_depth_during_workspace_switch() {
    let mut h = Harness::new(config());
    let records = h.host.switch_workspace();
    let clone = records[0].clone;
    h.host.set_clone_depth(WindowId::new(1), 0.5);

    let stage = h.host.stage();
    let shadow = stage.next_sibling(clone).unwrap();
    let blur = stage.prev_sibling(clone).unwrap();
    assert!(stage.translation_z(shadow).is_within(1e-9, 0.5 + DEPTH_EPSILON));
    assert!(stage.translation_z(blur).is_within(1e-9, 0.5 - DEPTH_EPSILON));
    assert!(stage.translation_z(shadow) > stage.translation_z(clone));
    assert!(stage.translation_z(blur) < stage.translation_z(clone));
}

#[test]
fn it_collapses_blur_and_drops_shadow_for_maximized_windows() {
    let mut h = Harness::new(config());
    h.host.maximize(WindowId::new(1), true, false);
    h.host.open_overview();
    h.host.resize_preview(WindowId::new(1), 0.5);

    let (blur, _, shadow) = h.preview_overlays();
    assert_eq!(shadow, None);
    let blur = blur.unwrap();
    assert_eq!(h.stage().blur_effect(blur), Some(BlurEffect {
        mode: BlurMode::Background,
        radius: 0.0,
        sigma: 30.0,
    }));
    assert_eq!(h.offsets(blur), vec![0.0, 0.0, 0.0, 0.0]);

    let records = h.host.switch_workspace();
    let stage = h.host.stage();
    assert_eq!(name(stage, stage.next_sibling(records[0].clone)), None);
    let blur = stage.prev_sibling(records[0].clone).unwrap();
    assert_eq!(stage.blur_effect(blur).map(|e| e.radius), Some(0.0));
}

#[test]
fn it_honors_keep_rounded_corners_overrides() {
    let mut config = config();
    config.custom.insert("app".to_string(), AppOverride {
        enabled: true,
        padding: Padding::uniform(4.0),
        border_radius: 8.0,
        keep_rounded_corners: true,
    });
    let mut h = Harness::new(config);
    h.host.set_fullscreen(WindowId::new(1), true);
    h.host.open_overview();
    h.host.resize_preview(WindowId::new(1), 0.5);

    let (blur, _, shadow) = h.preview_overlays();
    assert!(shadow.is_some());
    let blur = blur.unwrap();
    assert_eq!(h.stage().blur_effect(blur).map(|e| e.radius), Some(24.0));
    // frame is now the 1920 wide monitor, container 960
    assert_eq!(h.offsets(blur), vec![2.0, 2.0, -4.0, -4.0]);
}

#[test]
fn it_leaves_undecorated_windows_bare() {
    let mut config = config();
    config.black_list = vec!["app".to_string()];
    let mut h = Harness::new(config);
    h.host.open_overview();

    let (blur, container, shadow) = h.preview_overlays();
    assert_eq!((blur, shadow), (None, None));
    assert_eq!(h.stage().opacity(container), 255);
    assert_eq!(h.stage().listener_count(container), 0);

    let records = h.host.switch_workspace();
    assert_eq!(h.stage().children(h.stage().parent(records[0].clone).unwrap()).len(), 1);
}

#[test]
fn it_skips_blur_when_only_shadow_applies() {
    let mut config = config();
    config.blur.enabled = false;
    let mut h = Harness::new(config);
    h.host.open_overview();

    let (blur, container, shadow) = h.preview_overlays();
    assert_eq!(blur, None);
    assert!(shadow.is_some());
    assert_eq!(h.stage().opacity(container), 255);
}

#[test]
fn it_refreshes_live_overlays_when_a_resize_finishes() {
    let mut h = Harness::new(config());
    let shadow = h.decorations.borrow().shadow.query(WindowId::new(1)).unwrap();
    let blur = h.decorations.borrow().blur.query(WindowId::new(1)).unwrap();

    h.host.resize(WindowId::new(1), Rect::new(0.0, 0.0, 400.0, 300.0));
    assert_eq!(h.stage().allocation(shadow), Rect::new(-80.0, -80.0, 560.0, 460.0));
    assert_eq!(h.stage().allocation(blur), Rect::new(10.0, 10.0, 380.0, 280.0));

    h.release();
    h.host.resize(WindowId::new(1), Rect::new(0.0, 0.0, 200.0, 100.0));
    assert_eq!(h.stage().allocation(shadow), Rect::new(-80.0, -80.0, 560.0, 460.0));
}

#[test]
fn it_dims_the_shadow_of_the_window_losing_focus() {
    let second = Rect::new(0.0, 0.0, 300.0, 200.0);
    let mut h = Harness::with_windows(config(), &[(1, FRAME), (2, second)]);
    let shadow_of = |h: &Harness, id| h.decorations.borrow().shadow.query(WindowId::new(id)).unwrap();
    let shadow = config().shadow;

    h.host.focus(WindowId::new(1));
    assert_eq!(h.stage().opacity(shadow_of(&h, 1)), shadow.focused_opacity);
    assert_eq!(h.stage().opacity(shadow_of(&h, 2)), shadow.unfocused_opacity);

    h.host.focus(WindowId::new(2));
    assert_eq!(h.stage().opacity(shadow_of(&h, 1)), shadow.unfocused_opacity);
    assert_eq!(h.stage().opacity(shadow_of(&h, 2)), shadow.focused_opacity);
}

#[test]
fn it_stops_decorating_after_release() {
    let mut h = Harness::new(config());
    h.release();
    h.host.open_overview();
    let (blur, _, shadow) = h.preview_overlays();
    assert_eq!((blur, shadow), (None, None));

    let records = h.host.switch_workspace();
    let group = h.stage().parent(records[0].clone).unwrap();
    assert_eq!(h.stage().children(group), &[records[0].clone]);
}

#[test]
fn it_decorates_through_the_context_dispatcher() {
    let mut h = Harness::with_windows(config(), &[(1, FRAME), (2, Rect::new(0.0, 0.0, 300.0, 200.0))]);
    h.release();
    let stage = h.host.stage_mut();
    let group = stage.create_actor(ActorKind::Group);
    let root = stage.root();
    stage.add_child(root, group);
    let clone = stage.create_actor(ActorKind::WindowClone(WindowId::new(2)));
    stage.add_child(group, clone);
    stage.set_rect(clone, Rect::new(0.0, 0.0, 300.0, 200.0));

    let decorations = h.decorations.borrow();
    let overlays =
        decorations.decorate(stage, PresentationContext::WorkspaceSwitch, WindowId::new(2), group, clone);
    assert!(overlays.shadow.is_some() && overlays.blur.is_some());
    assert_eq!(stage.children(group), &[overlays.blur.unwrap(), clone, overlays.shadow.unwrap()]);
    assert!(!PresentationContext::WorkspaceSwitch.is_continuous());
    assert!(PresentationContext::Overview.is_continuous());
}
