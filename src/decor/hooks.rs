//! Interception points in the host.
//!
//! The host publishes a [`HookTable`] with four named slots and always calls
//! through the table. [`install`] swaps wrappers into the slots; each wrapper
//! calls the original first and then decorates its result. The returned
//! [`HookGuard`] puts the original implementations back when released or
//! dropped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::config::config_file;
use crate::decor::clone::WindowRecord;
use crate::decor::{Decorations, PresentationContext};
use crate::model::stage::{ActorId, MenuItem, Stage};
use crate::model::window::WindowId;

/// Version of the calling convention the wrappers are written against.
pub const HOOK_TABLE_VERSION: u32 = 1;

pub const MENU_LABEL: &str = "Rounded Corners Settings…";

/// Overview thumbnail created for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPreview {
    pub preview: ActorId,
    pub container: ActorId,
}

pub type AddWindowClone = Rc<dyn Fn(&mut Stage, WindowId) -> Option<WindowPreview>>;
pub type CreateWorkspaceWindows = Rc<dyn Fn(&mut Stage, ActorId) -> Vec<WindowRecord>>;
pub type SizeChangeWindowDone = Rc<dyn Fn(&mut Stage, ActorId)>;
pub type AddBackgroundMenu = Rc<dyn Fn(&mut Stage, ActorId, usize)>;

#[derive(Clone, Default)]
pub struct HookSlots {
    pub add_window_clone: Option<AddWindowClone>,
    pub create_workspace_windows: Option<CreateWorkspaceWindows>,
    pub size_change_window_done: Option<SizeChangeWindowDone>,
    pub add_background_menu: Option<AddBackgroundMenu>,
}

impl HookSlots {
    fn missing(&self) -> Option<&'static str> {
        if self.add_window_clone.is_none() {
            Some("add_window_clone")
        } else if self.create_workspace_windows.is_none() {
            Some("create_workspace_windows")
        } else if self.size_change_window_done.is_none() {
            Some("size_change_window_done")
        } else if self.add_background_menu.is_none() {
            Some("add_background_menu")
        } else {
            None
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("Hook table version mismatch: expected {expected}, host has {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Host does not provide the {0} hook")]
    MissingHook(&'static str),
    #[error("Hooks are already installed")]
    AlreadyInstalled,
}

pub struct HookTable {
    version: u32,
    slots: RefCell<HookSlots>,
    installed: Cell<bool>,
}

impl HookTable {
    pub fn new(version: u32, slots: HookSlots) -> Rc<Self> {
        Rc::new(HookTable {
            version,
            slots: RefCell::new(slots),
            installed: Cell::new(false),
        })
    }

    pub fn version(&self) -> u32 { self.version }

    pub fn is_installed(&self) -> bool { self.installed.get() }

    /// Current slot contents.
    pub fn slots(&self) -> HookSlots { self.slots.borrow().clone() }

    // The slot is cloned out before calling so wrappers may re-enter the table.

    pub fn add_window_clone(&self, stage: &mut Stage, window: WindowId) -> Option<WindowPreview> {
        let hook = self.slots.borrow().add_window_clone.clone()?;
        hook(stage, window)
    }

    pub fn create_workspace_windows(&self, stage: &mut Stage, group: ActorId) -> Vec<WindowRecord> {
        let hook = self.slots.borrow().create_workspace_windows.clone();
        hook.map(|hook| hook(stage, group)).unwrap_or_default()
    }

    pub fn size_change_window_done(&self, stage: &mut Stage, actor: ActorId) {
        let hook = self.slots.borrow().size_change_window_done.clone();
        if let Some(hook) = hook {
            hook(stage, actor);
        }
    }

    pub fn add_background_menu(&self, stage: &mut Stage, background: ActorId, layout: usize) {
        let hook = self.slots.borrow().add_background_menu.clone();
        if let Some(hook) = hook {
            hook(stage, background, layout);
        }
    }
}

/// Holds the original implementations while wrappers are installed.
///
/// Dropping the guard only restores the hook slots. The settings entries
/// added to background menus stay until [`HookGuard::release`] runs, since
/// removing them needs the stage.
#[must_use = "dropping the guard uninstalls the hooks"]
pub struct HookGuard {
    table: Rc<HookTable>,
    originals: Option<HookSlots>,
}

impl HookGuard {
    /// Restores the originals and removes the injected menu entries.
    pub fn release(mut self, stage: &mut Stage) {
        self.restore();
        for background in stage.backgrounds_with_menus() {
            stage.background_menu_mut(background).retain(|item| item.label != MENU_LABEL);
        }
    }

    fn restore(&mut self) {
        if let Some(originals) = self.originals.take() {
            *self.table.slots.borrow_mut() = originals;
            self.table.installed.set(false);
            debug!("hooks restored");
        }
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) { self.restore() }
}

fn menu_item() -> MenuItem {
    MenuItem {
        label: MENU_LABEL.to_string(),
        command: format!("xdg-open {}", config_file().display()),
    }
}

fn add_menu_item(stage: &mut Stage, background: ActorId) {
    let menu = stage.background_menu_mut(background);
    if !menu.iter().any(|item| item.label == MENU_LABEL) {
        menu.push(menu_item());
    }
}

/// Installs the decoration wrappers into `table`.
///
/// Fails without touching the table if the host speaks another version, lacks
/// a slot, or is already patched.
pub fn install(
    table: &Rc<HookTable>,
    decorations: &Rc<RefCell<Decorations>>,
    stage: &mut Stage,
) -> Result<HookGuard, HookError> {
    if table.version != HOOK_TABLE_VERSION {
        return Err(HookError::VersionMismatch {
            expected: HOOK_TABLE_VERSION,
            found: table.version,
        });
    }
    if table.installed.get() {
        return Err(HookError::AlreadyInstalled);
    }
    let originals = table.slots();
    let (Some(orig_clone), Some(orig_workspace), Some(orig_size_done), Some(orig_menu)) = (
        originals.add_window_clone.clone(),
        originals.create_workspace_windows.clone(),
        originals.size_change_window_done.clone(),
        originals.add_background_menu.clone(),
    ) else {
        return Err(HookError::MissingHook(originals.missing().unwrap_or_default()));
    };

    let d = decorations.clone();
    let add_window_clone: AddWindowClone = Rc::new(move |stage: &mut Stage, window: WindowId| {
        let preview = orig_clone(stage, window)?;
        match d.try_borrow() {
            Ok(decorations) => {
                decorations.decorate(
                    stage,
                    PresentationContext::Overview,
                    window,
                    preview.preview,
                    preview.container,
                );
            }
            Err(_) => warn!(%window, "decorations busy, overview clone left bare"),
        }
        Some(preview)
    });

    let d = decorations.clone();
    let create_workspace_windows: CreateWorkspaceWindows =
        Rc::new(move |stage: &mut Stage, group: ActorId| {
            let records = orig_workspace(stage, group);
            match d.try_borrow() {
                Ok(decorations) => {
                    for record in &records {
                        let Some(window) = stage.window_of(record.window_actor) else { continue };
                        decorations.decorate(
                            stage,
                            PresentationContext::WorkspaceSwitch,
                            window,
                            group,
                            record.clone,
                        );
                    }
                }
                Err(_) => warn!("decorations busy, workspace clones left bare"),
            }
            records
        });

    let d = decorations.clone();
    let size_change_window_done: SizeChangeWindowDone =
        Rc::new(move |stage: &mut Stage, actor: ActorId| {
            orig_size_done(stage, actor);
            match d.try_borrow_mut() {
                Ok(mut decorations) => decorations.refresh(stage, actor),
                Err(_) => warn!(?actor, "decorations busy, skipping refresh"),
            }
        });

    let add_background_menu: AddBackgroundMenu =
        Rc::new(move |stage: &mut Stage, background: ActorId, layout: usize| {
            orig_menu(stage, background, layout);
            add_menu_item(stage, background);
        });

    *table.slots.borrow_mut() = HookSlots {
        add_window_clone: Some(add_window_clone),
        create_workspace_windows: Some(create_workspace_windows),
        size_change_window_done: Some(size_change_window_done),
        add_background_menu: Some(add_background_menu),
    };
    table.installed.set(true);

    for background in stage.backgrounds_with_menus() {
        add_menu_item(stage, background);
    }
    debug!("hooks installed");

    Ok(HookGuard { table: table.clone(), originals: Some(originals) })
}
