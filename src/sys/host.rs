//! Simulated compositor host.
//!
//! Owns the stage and the hook table and implements the host side of every
//! hook: building overview previews, building workspace-switch clones,
//! finishing resizes and filling background menus. Host operations always go
//! through the hook table, so installed wrappers see exactly what a real
//! compositor integration would hand them.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::decor::clone::WindowRecord;
use crate::decor::hooks::{HOOK_TABLE_VERSION, HookSlots, HookTable, WindowPreview};
use crate::model::stage::{ActorId, ActorKind, MenuItem, Monitor, Stage};
use crate::model::window::{Window, WindowId};
use crate::sys::geometry::Rect;

fn original_add_window_clone(stage: &mut Stage, window: WindowId) -> Option<WindowPreview> {
    let actor = stage.window_actor(window)?;
    let frame = stage.window(window)?.frame_rect();

    let preview = stage.create_actor(ActorKind::WindowPreview(window));
    stage.set_rect(preview, frame);
    let container = stage.create_actor(ActorKind::WindowContainer(window));
    stage.add_child(preview, container);
    stage.set_rect(container, Rect::new(0.0, 0.0, frame.width, frame.height));
    let content = stage.create_actor(ActorKind::Clone { source: actor });
    stage.add_child(container, content);

    Some(WindowPreview { preview, container })
}

fn original_create_workspace_windows(stage: &mut Stage, group: ActorId) -> Vec<WindowRecord> {
    let mut records = Vec::new();
    for (window_actor, window) in stage.window_actors() {
        let clone = stage.create_actor(ActorKind::WindowClone(window));
        let rect = stage.allocation(window_actor);
        stage.add_child(group, clone);
        stage.set_rect(clone, rect);
        records.push(WindowRecord { window_actor, clone });
    }
    records
}

fn original_size_change_window_done(stage: &mut Stage, actor: ActorId) {
    let Some(window) = stage.window_of(actor) else { return };
    if let Some(frame) = stage.window(window).map(|w| w.frame_rect()) {
        stage.set_rect(actor, frame);
    }
}

fn original_add_background_menu(stage: &mut Stage, background: ActorId, _layout: usize) {
    let menu = stage.background_menu_mut(background);
    menu.clear();
    for (label, command) in [
        ("Change Background…", "settings background"),
        ("Display Settings", "settings display"),
        ("Settings", "settings"),
    ] {
        menu.push(MenuItem { label: label.to_string(), command: command.to_string() });
    }
}

/// The unpatched implementations of every hook.
pub fn original_hooks() -> HookSlots {
    HookSlots {
        add_window_clone: Some(Rc::new(original_add_window_clone)),
        create_workspace_windows: Some(Rc::new(original_create_workspace_windows)),
        size_change_window_done: Some(Rc::new(original_size_change_window_done)),
        add_background_menu: Some(Rc::new(original_add_background_menu)),
    }
}

pub struct Host {
    stage: Stage,
    hooks: Rc<HookTable>,
    overview: Option<ActorId>,
    previews: Vec<WindowPreview>,
    workspace_group: Option<ActorId>,
    workspace_records: Vec<WindowRecord>,
}

impl Default for Host {
    fn default() -> Self { Self::new() }
}

impl Host {
    pub fn new() -> Self { Self::with_hooks(HookTable::new(HOOK_TABLE_VERSION, original_hooks())) }

    pub fn with_hooks(hooks: Rc<HookTable>) -> Self {
        Host {
            stage: Stage::new(),
            hooks,
            overview: None,
            previews: Vec::new(),
            workspace_group: None,
            workspace_records: Vec::new(),
        }
    }

    pub fn stage(&self) -> &Stage { &self.stage }

    pub fn stage_mut(&mut self) -> &mut Stage { &mut self.stage }

    pub fn hooks(&self) -> &Rc<HookTable> { &self.hooks }

    pub fn map_window(&mut self, window: Window) -> ActorId {
        debug!(window = %window.id(), "map window");
        self.stage.add_window(window)
    }

    pub fn unmap_window(&mut self, window: WindowId) { self.stage.remove_window(window) }

    /// Moves/resizes a window and finishes the resize through the hook table.
    pub fn resize(&mut self, window: WindowId, frame: Rect) {
        self.stage.move_resize_window(window, frame);
        self.finish_resize(window);
    }

    pub fn maximize(&mut self, window: WindowId, horizontally: bool, vertically: bool) {
        let Some(monitor) = self.stage.window(window).map(|w| w.monitor) else { return };
        let monitor_rect = self.stage.monitor(monitor).map_or(Rect::ZERO, |m| m.rect);
        let Some(win) = self.stage.window_mut(window) else { return };
        win.maximized_horizontally = horizontally;
        win.maximized_vertically = vertically;
        let mut frame = win.frame_rect();
        if horizontally {
            frame.x = monitor_rect.x;
            frame.width = monitor_rect.width;
        }
        if vertically {
            frame.y = monitor_rect.y;
            frame.height = monitor_rect.height;
        }
        self.stage.move_resize_window(window, frame);
        self.finish_resize(window);
    }

    pub fn set_fullscreen(&mut self, window: WindowId, fullscreen: bool) {
        if fullscreen {
            self.stage.make_fullscreen(window);
        } else {
            self.stage.unmake_fullscreen(window);
        }
        self.finish_resize(window);
    }

    /// Moves focus to `window`. Every window whose focus flag flipped is
    /// refreshed, the one losing focus included.
    pub fn focus(&mut self, window: WindowId) {
        let mut changed = Vec::new();
        for (_, id) in self.stage.window_actors() {
            if let Some(win) = self.stage.window_mut(id)
                && win.focused != (id == window)
            {
                win.focused = id == window;
                changed.push(id);
            }
        }
        for id in changed {
            self.finish_resize(id);
        }
    }

    fn finish_resize(&mut self, window: WindowId) {
        if let Some(actor) = self.stage.window_actor(window) {
            self.hooks.size_change_window_done(&mut self.stage, actor);
        }
    }

    pub fn set_monitors(&mut self, monitors: Vec<Monitor>) { self.stage.set_monitors(monitors) }

    /// Builds an overview preview for every mapped window.
    pub fn open_overview(&mut self) -> Vec<WindowPreview> {
        self.close_overview();
        let group = self.stage.create_named(ActorKind::Group, "overview");
        let root = self.stage.root();
        self.stage.add_child(root, group);
        self.overview = Some(group);

        for (_, window) in self.stage.window_actors() {
            if let Some(preview) = self.hooks.add_window_clone(&mut self.stage, window) {
                self.stage.add_child(group, preview.preview);
                self.previews.push(preview);
            }
        }
        debug!(previews = self.previews.len(), "overview opened");
        self.previews.clone()
    }

    pub fn preview(&self, window: WindowId) -> Option<WindowPreview> {
        self.previews.iter().copied().find(|p| self.stage.window_of(p.preview) == Some(window))
    }

    /// One overview layout step: the preview container shrinks to `scale` of
    /// the window frame.
    pub fn resize_preview(&mut self, window: WindowId, scale: f64) {
        let (Some(preview), Some(frame)) =
            (self.preview(window), self.stage.window(window).map(|w| w.frame_rect()))
        else {
            return;
        };
        trace!(%window, scale, "layout preview");
        self.stage.set_size(preview.container, frame.width * scale, frame.height * scale);
    }

    pub fn close_overview(&mut self) {
        if let Some(group) = self.overview.take() {
            self.stage.destroy(group);
        }
        self.previews.clear();
    }

    /// Starts a workspace-switch animation with a clone of every window.
    pub fn switch_workspace(&mut self) -> Vec<WindowRecord> {
        self.end_workspace_switch();
        let group = self.stage.create_named(ActorKind::Group, "workspace-group");
        let root = self.stage.root();
        self.stage.add_child(root, group);
        self.workspace_group = Some(group);
        self.workspace_records = self.hooks.create_workspace_windows(&mut self.stage, group);
        self.workspace_records.clone()
    }

    pub fn workspace_record(&self, window: WindowId) -> Option<WindowRecord> {
        self.workspace_records
            .iter()
            .copied()
            .find(|r| self.stage.window_of(r.clone) == Some(window))
    }

    pub fn set_clone_depth(&mut self, window: WindowId, z: f64) {
        if let Some(record) = self.workspace_record(window) {
            self.stage.set_translation_z(record.clone, z);
        }
    }

    pub fn end_workspace_switch(&mut self) {
        if let Some(group) = self.workspace_group.take() {
            self.stage.destroy(group);
        }
        self.workspace_records.clear();
    }

    pub fn add_background(&mut self, monitor: usize) -> ActorId {
        let background = self.stage.create_named(ActorKind::Background, "background");
        let root = self.stage.root();
        self.stage.insert_child_below(root, background, None);
        if let Some(rect) = self.stage.monitor(monitor).map(|m| m.rect) {
            self.stage.set_rect(background, rect);
        }
        self.hooks.add_background_menu(&mut self.stage, background, monitor);
        background
    }
}
