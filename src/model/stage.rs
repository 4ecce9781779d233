//! In-process model of the compositor's render tree.
//!
//! The stage owns actors (render nodes), the host windows and the monitors.
//! Actors form a tree with ordered children, bottom-most first. Property
//! changes on an actor synchronously run the listeners connected to it, which
//! is how overlays follow containers that keep resizing.

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use tracing::{trace, warn};

use crate::common::collections::HashMap;
use crate::model::window::{Window, WindowId};
use crate::sys::geometry::{Point, Rect};

new_key_type! {
    pub struct ActorId;
    pub struct ListenerId;
}

/// Properties that emit change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Width,
    Height,
    TranslationZ,
}

/// Which allocation coordinate a [`BindConstraint`] controls.
///
/// The order matches the four constraint slots the synchronizers create:
/// X, Y, Width, Height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindCoordinate {
    X,
    Y,
    Width,
    Height,
}

impl BindCoordinate {
    pub const ALL: [BindCoordinate; 4] = [
        BindCoordinate::X,
        BindCoordinate::Y,
        BindCoordinate::Width,
        BindCoordinate::Height,
    ];
}

/// Binds one coordinate of an actor's allocation to the same coordinate of
/// `source`, plus `offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindConstraint {
    pub coordinate: BindCoordinate,
    pub source: ActorId,
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlurMode {
    Actor,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurEffect {
    pub mode: BlurMode,
    pub radius: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Group,
    Background,
    WindowActor(WindowId),
    /// Overview thumbnail wrapper.
    WindowPreview(WindowId),
    /// The node inside a preview that holds the window content and resizes
    /// continuously while the overview animates.
    WindowContainer(WindowId),
    /// Static clone of a window actor used by the workspace-switch animation.
    WindowClone(WindowId),
    /// Paints another actor.
    Clone { source: ActorId },
    Bin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub rect: Rect,
    pub scale: f64,
}

#[derive(Debug, Clone)]
pub struct Actor {
    kind: ActorKind,
    name: Option<&'static str>,
    parent: Option<ActorId>,
    children: Vec<ActorId>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    pivot: Point,
    scale: (f64, f64),
    scale_source: Option<ActorId>,
    opacity: u8,
    translation_z: f64,
    constraints: Vec<BindConstraint>,
    effects: Vec<BlurEffect>,
}

impl Actor {
    fn new(kind: ActorKind) -> Self {
        Actor {
            kind,
            name: None,
            parent: None,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            pivot: Point::ZERO,
            scale: (1.0, 1.0),
            scale_source: None,
            opacity: 255,
            translation_z: 0.0,
            constraints: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn kind(&self) -> ActorKind { self.kind }

    pub fn name(&self) -> Option<&'static str> { self.name }

    pub fn parent(&self) -> Option<ActorId> { self.parent }

    pub fn children(&self) -> &[ActorId] { &self.children }

    pub fn pivot(&self) -> Point { self.pivot }

    pub fn opacity(&self) -> u8 { self.opacity }

    pub fn translation_z(&self) -> f64 { self.translation_z }

    pub fn constraints(&self) -> &[BindConstraint] { &self.constraints }

    pub fn effects(&self) -> &[BlurEffect] { &self.effects }

    /// Own geometry, ignoring constraints.
    pub fn rect(&self) -> Rect { Rect::new(self.x, self.y, self.width, self.height) }
}

type Callback = Box<dyn FnMut(&mut Stage)>;

struct Listener {
    source: ActorId,
    property: Property,
    // Taken out while the callback runs so it can borrow the stage mutably.
    callback: Option<Callback>,
}

pub struct Stage {
    actors: SlotMap<ActorId, Actor>,
    listeners: SlotMap<ListenerId, Listener>,
    root: ActorId,
    window_group: ActorId,
    windows: HashMap<WindowId, Window>,
    // Window actors in stacking order.
    window_actors: Vec<(ActorId, WindowId)>,
    monitors: Vec<Monitor>,
    framebuffer_scaling: bool,
    menus: HashMap<ActorId, Vec<MenuItem>>,
}

impl Default for Stage {
    fn default() -> Self { Self::new() }
}

impl Stage {
    pub fn new() -> Self {
        let mut actors = SlotMap::with_key();
        let root = actors.insert(Actor::new(ActorKind::Group));
        let window_group = actors.insert(Actor::new(ActorKind::Group));
        actors[window_group].parent = Some(root);
        actors[window_group].name = Some("window-group");
        actors[root].children.push(window_group);
        actors[root].name = Some("stage");

        Stage {
            actors,
            listeners: SlotMap::with_key(),
            root,
            window_group,
            windows: HashMap::default(),
            window_actors: Vec::new(),
            monitors: vec![Monitor {
                rect: Rect::new(0.0, 0.0, 1920.0, 1080.0),
                scale: 1.0,
            }],
            framebuffer_scaling: false,
            menus: HashMap::default(),
        }
    }

    pub fn root(&self) -> ActorId { self.root }

    pub fn window_group(&self) -> ActorId { self.window_group }

    // ---------------------------------------------------------------- actors

    pub fn create_actor(&mut self, kind: ActorKind) -> ActorId {
        self.actors.insert(Actor::new(kind))
    }

    pub fn create_named(&mut self, kind: ActorKind, name: &'static str) -> ActorId {
        let id = self.create_actor(kind);
        self.actors[id].name = Some(name);
        id
    }

    pub fn contains(&self, id: ActorId) -> bool { self.actors.contains_key(id) }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> { self.actors.get(id) }

    pub fn children(&self, id: ActorId) -> &[ActorId] {
        self.actors.get(id).map(|a| a.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: ActorId) -> Option<ActorId> { self.actors.get(id)?.parent }

    pub fn index_in_parent(&self, id: ActorId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.actors[parent].children.iter().position(|&c| c == id)
    }

    /// The sibling painted directly above `id`.
    pub fn next_sibling(&self, id: ActorId) -> Option<ActorId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.actors[parent].children.get(index + 1).copied()
    }

    /// The sibling painted directly below `id`.
    pub fn prev_sibling(&self, id: ActorId) -> Option<ActorId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index.checked_sub(1).map(|i| self.actors[parent].children[i])
    }

    /// Appends `child` on top of `parent`'s children.
    pub fn add_child(&mut self, parent: ActorId, child: ActorId) {
        let top = self.actors.get(parent).map_or(0, |a| a.children.len());
        self.insert_child_at(parent, child, top);
    }

    /// Inserts `child` directly above `sibling`, or on top without a sibling.
    pub fn insert_child_above(&mut self, parent: ActorId, child: ActorId, sibling: Option<ActorId>) {
        let Some(p) = self.actors.get(parent) else { return };
        let index = sibling
            .and_then(|s| p.children.iter().position(|&c| c == s))
            .map_or(p.children.len(), |i| i + 1);
        self.insert_child_at(parent, child, index);
    }

    /// Inserts `child` directly below `sibling`, or at the bottom without a sibling.
    pub fn insert_child_below(&mut self, parent: ActorId, child: ActorId, sibling: Option<ActorId>) {
        let Some(p) = self.actors.get(parent) else { return };
        let index = sibling.and_then(|s| p.children.iter().position(|&c| c == s)).unwrap_or(0);
        self.insert_child_at(parent, child, index);
    }

    fn insert_child_at(&mut self, parent: ActorId, child: ActorId, index: usize) {
        if !self.actors.contains_key(parent) || !self.actors.contains_key(child) {
            warn!(?parent, ?child, "insert_child on a destroyed actor");
            return;
        }
        self.unparent(child);
        let children = &mut self.actors[parent].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.actors[child].parent = Some(parent);
    }

    fn unparent(&mut self, child: ActorId) {
        if let Some(old) = self.actors[child].parent.take()
            && let Some(old) = self.actors.get_mut(old)
        {
            old.children.retain(|&c| c != child);
        }
    }

    /// Destroys `id` and its whole subtree, along with every listener whose
    /// source is one of the destroyed actors.
    pub fn destroy(&mut self, id: ActorId) {
        if !self.actors.contains_key(id) {
            return;
        }
        self.unparent(id);

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(actor) = self.actors.remove(next) {
                stack.extend(actor.children);
            }
            self.menus.remove(&next);
            self.window_actors.retain(|&(actor, _)| actor != next);
        }

        let actors = &self.actors;
        self.listeners.retain(|_, l| actors.contains_key(l.source));
    }

    pub fn set_position(&mut self, id: ActorId, x: f64, y: f64) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.x = x;
            actor.y = y;
        }
    }

    /// Resizes the actor, notifying width and height listeners on change.
    pub fn set_size(&mut self, id: ActorId, width: f64, height: f64) {
        let Some(actor) = self.actors.get_mut(id) else { return };
        let width_changed = actor.width != width;
        let height_changed = actor.height != height;
        actor.width = width;
        actor.height = height;

        if width_changed {
            self.notify(id, Property::Width);
        }
        if height_changed {
            self.notify(id, Property::Height);
        }
    }

    pub fn set_rect(&mut self, id: ActorId, rect: Rect) {
        self.set_position(id, rect.x, rect.y);
        self.set_size(id, rect.width, rect.height);
    }

    pub fn set_pivot(&mut self, id: ActorId, pivot: Point) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.pivot = pivot;
        }
    }

    pub fn set_opacity(&mut self, id: ActorId, opacity: u8) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.opacity = opacity;
        }
    }

    pub fn set_translation_z(&mut self, id: ActorId, z: f64) {
        let Some(actor) = self.actors.get_mut(id) else { return };
        if actor.translation_z == z {
            return;
        }
        actor.translation_z = z;
        self.notify(id, Property::TranslationZ);
    }

    pub fn set_scale(&mut self, id: ActorId, scale_x: f64, scale_y: f64) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.scale = (scale_x, scale_y);
        }
    }

    /// Makes `target` follow `source`'s scale-x and scale-y.
    pub fn bind_scale(&mut self, source: ActorId, target: ActorId) {
        if source == target || !self.actors.contains_key(source) {
            return;
        }
        if let Some(actor) = self.actors.get_mut(target) {
            actor.scale_source = Some(source);
        }
    }

    /// Effective scale, following scale bindings.
    pub fn scale(&self, id: ActorId) -> (f64, f64) {
        let mut current = id;
        // bindings are never longer than the tree is deep
        for _ in 0..=self.actors.len() {
            let Some(actor) = self.actors.get(current) else { break };
            match actor.scale_source {
                Some(source) if self.actors.contains_key(source) => current = source,
                _ => return actor.scale,
            }
        }
        (1.0, 1.0)
    }

    pub fn width(&self, id: ActorId) -> f64 { self.actors.get(id).map_or(0.0, |a| a.width) }

    pub fn height(&self, id: ActorId) -> f64 { self.actors.get(id).map_or(0.0, |a| a.height) }

    pub fn position(&self, id: ActorId) -> Point {
        self.actors.get(id).map_or(Point::ZERO, |a| Point::new(a.x, a.y))
    }

    pub fn opacity(&self, id: ActorId) -> u8 { self.actors.get(id).map_or(0, |a| a.opacity) }

    pub fn translation_z(&self, id: ActorId) -> f64 {
        self.actors.get(id).map_or(0.0, |a| a.translation_z)
    }

    pub fn add_constraint(&mut self, id: ActorId, constraint: BindConstraint) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.constraints.push(constraint);
        }
    }

    pub fn constraints(&self, id: ActorId) -> &[BindConstraint] {
        self.actors.get(id).map(|a| a.constraints.as_slice()).unwrap_or(&[])
    }

    pub fn set_constraint_offset(&mut self, id: ActorId, index: usize, offset: f64) {
        if let Some(c) = self.actors.get_mut(id).and_then(|a| a.constraints.get_mut(index)) {
            c.offset = offset;
        }
    }

    /// Geometry after applying bind constraints.
    pub fn allocation(&self, id: ActorId) -> Rect { self.allocation_inner(id, 0) }

    fn allocation_inner(&self, id: ActorId, depth: usize) -> Rect {
        let Some(actor) = self.actors.get(id) else { return Rect::ZERO };
        let mut rect = actor.rect();
        if depth > self.actors.len() {
            return rect;
        }
        for c in &actor.constraints {
            if !self.actors.contains_key(c.source) {
                continue;
            }
            let source = self.allocation_inner(c.source, depth + 1);
            match c.coordinate {
                BindCoordinate::X => rect.x = source.x + c.offset,
                BindCoordinate::Y => rect.y = source.y + c.offset,
                BindCoordinate::Width => rect.width = source.width + c.offset,
                BindCoordinate::Height => rect.height = source.height + c.offset,
            }
        }
        rect
    }

    pub fn add_effect(&mut self, id: ActorId, effect: BlurEffect) {
        if let Some(actor) = self.actors.get_mut(id) {
            actor.effects.push(effect);
        }
    }

    /// First blur effect attached to the actor.
    pub fn blur_effect(&self, id: ActorId) -> Option<BlurEffect> {
        self.actors.get(id)?.effects.first().copied()
    }

    pub fn blur_effect_mut(&mut self, id: ActorId) -> Option<&mut BlurEffect> {
        self.actors.get_mut(id)?.effects.first_mut()
    }

    // ------------------------------------------------------------- listeners

    pub fn connect(
        &mut self,
        source: ActorId,
        property: Property,
        callback: impl FnMut(&mut Stage) + 'static,
    ) -> ListenerId {
        self.listeners.insert(Listener {
            source,
            property,
            callback: Some(Box::new(callback)),
        })
    }

    pub fn listener_count(&self, source: ActorId) -> usize {
        self.listeners.values().filter(|l| l.source == source).count()
    }

    fn notify(&mut self, source: ActorId, property: Property) {
        let ids: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, l)| l.source == source && l.property == property)
            .map(|(id, _)| id)
            .collect();

        for id in ids {
            let Some(mut callback) = self.listeners.get_mut(id).and_then(|l| l.callback.take())
            else {
                continue;
            };
            trace!(?source, ?property, "notify");
            callback(self);
            if let Some(listener) = self.listeners.get_mut(id) {
                listener.callback = Some(callback);
            }
        }
    }

    // --------------------------------------------------------------- windows

    /// Maps a window: creates its actor on top of the window group.
    pub fn add_window(&mut self, window: Window) -> ActorId {
        let id = window.id();
        let frame = window.frame_rect();
        if let Some(old) = self.window_actor(id) {
            self.destroy(old);
        }

        let actor = self.create_actor(ActorKind::WindowActor(id));
        self.add_child(self.window_group, actor);
        self.set_rect(actor, frame);
        self.windows.insert(id, window);
        self.window_actors.push((actor, id));
        actor
    }

    pub fn remove_window(&mut self, id: WindowId) {
        if let Some(actor) = self.window_actor(id) {
            self.destroy(actor);
        }
        self.windows.remove(&id);
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> { self.windows.get(&id) }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> { self.windows.get_mut(&id) }

    pub fn window_actor(&self, id: WindowId) -> Option<ActorId> {
        self.window_actors.iter().find(|&&(_, wid)| wid == id).map(|&(actor, _)| actor)
    }

    /// The window shown by a window actor, preview, container or clone.
    pub fn window_of(&self, actor: ActorId) -> Option<WindowId> {
        match self.actors.get(actor)?.kind {
            ActorKind::WindowActor(w)
            | ActorKind::WindowPreview(w)
            | ActorKind::WindowContainer(w)
            | ActorKind::WindowClone(w) => Some(w),
            _ => None,
        }
    }

    /// Window actors with their windows, bottom-most first.
    pub fn window_actors(&self) -> Vec<(ActorId, WindowId)> { self.window_actors.clone() }

    /// Moves/resizes a window and its actor to `frame`.
    pub fn move_resize_window(&mut self, id: WindowId, frame: Rect) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.set_frame_rect(frame);
        self.sync_window_actor(id);
    }

    pub fn make_fullscreen(&mut self, id: WindowId) {
        let Some(monitor) = self.windows.get(&id).map(|w| w.monitor) else { return };
        let monitor_rect = self.monitor(monitor).map_or(Rect::ZERO, |m| m.rect);
        if let Some(window) = self.windows.get_mut(&id) {
            window.enter_fullscreen(monitor_rect);
        }
        self.sync_window_actor(id);
    }

    pub fn unmake_fullscreen(&mut self, id: WindowId) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.leave_fullscreen();
        }
        self.sync_window_actor(id);
    }

    fn sync_window_actor(&mut self, id: WindowId) {
        let (Some(actor), Some(frame)) =
            (self.window_actor(id), self.windows.get(&id).map(|w| w.frame_rect()))
        else {
            return;
        };
        self.set_rect(actor, frame);
    }

    // -------------------------------------------------------------- monitors

    pub fn monitors(&self) -> &[Monitor] { &self.monitors }

    pub fn monitor(&self, index: usize) -> Option<&Monitor> { self.monitors.get(index) }

    pub fn set_monitors(&mut self, monitors: Vec<Monitor>) { self.monitors = monitors; }

    /// Whether the host renders scaled monitors into scaled framebuffers.
    pub fn set_framebuffer_scaling(&mut self, enabled: bool) { self.framebuffer_scaling = enabled; }

    /// Backing scale factor used for padding math: 1 with framebuffer
    /// scaling, the monitor scale otherwise.
    pub fn window_scale_factor(&self, id: WindowId) -> f64 {
        if self.framebuffer_scaling {
            return 1.0;
        }
        self.windows
            .get(&id)
            .and_then(|w| self.monitor(w.monitor))
            .map_or(1.0, |m| m.scale)
    }

    // ----------------------------------------------------------------- menus

    pub fn background_menu(&self, background: ActorId) -> Option<&[MenuItem]> {
        self.menus.get(&background).map(Vec::as_slice)
    }

    pub fn background_menu_mut(&mut self, background: ActorId) -> &mut Vec<MenuItem> {
        self.menus.entry(background).or_default()
    }

    /// Backgrounds that currently carry a menu.
    pub fn backgrounds_with_menus(&self) -> Vec<ActorId> {
        let mut backgrounds: Vec<_> = self.menus.keys().copied().collect();
        backgrounds.sort();
        backgrounds
    }

    // ----------------------------------------------------------------- debug

    pub fn draw_tree(&self, root: ActorId) -> String {
        let mut out = String::new();
        if let Err(e) = ascii_tree::write_tree(&mut out, &self.get_ascii_tree(root)) {
            warn!("failed to draw stage tree: {e}");
        }
        out
    }

    fn get_ascii_tree(&self, id: ActorId) -> ascii_tree::Tree {
        let Some(actor) = self.actors.get(id) else {
            return ascii_tree::Tree::Leaf(vec![format!("{id:?} (destroyed)")]);
        };
        let rect = self.allocation(id);
        let mut desc = match actor.name {
            Some(name) => format!("{name} {:?}", actor.kind),
            None => format!("{:?}", actor.kind),
        };
        desc.push_str(&format!(
            " [{:.1}, {:.1} {:.1}x{:.1}]",
            rect.x, rect.y, rect.width, rect.height
        ));
        if actor.opacity != 255 {
            desc.push_str(&format!(" opacity={}", actor.opacity));
        }
        if actor.translation_z != 0.0 {
            desc.push_str(&format!(" z={:.3}", actor.translation_z));
        }
        if let Some(effect) = actor.effects.first() {
            desc.push_str(&format!(" blur(r={}, s={})", effect.radius, effect.sigma));
        }

        let children: Vec<_> = actor.children.iter().map(|&c| self.get_ascii_tree(c)).collect();
        if children.is_empty() {
            ascii_tree::Tree::Leaf(vec![desc])
        } else {
            ascii_tree::Tree::Node(desc, children)
        }
    }
}
