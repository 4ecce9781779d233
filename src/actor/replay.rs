//! Scenario replay against the simulated host.
//!
//! A scenario is a text file with one RON-encoded [`Step`] per line. Empty
//! lines and lines starting with `//` are skipped. Time only moves on `Wait`,
//! so replays are deterministic.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::actor::effects::{Event, Extension};
use crate::common::config::Config;
use crate::model::stage::Monitor;
use crate::model::window::{Window, WindowId};
use crate::sys::geometry::Rect;
use crate::sys::host::Host;
use crate::sys::timer::ManualTimers;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Step {
    /// Replaces the monitor layout and reports the change.
    Monitors(Vec<Monitor>),
    FramebufferScaling(bool),
    Map {
        id: u32,
        #[serde(default)]
        app: Option<String>,
        frame: Rect,
        #[serde(default)]
        monitor: usize,
    },
    Unmap(u32),
    Resize { id: u32, frame: Rect },
    Maximize { id: u32, horizontally: bool, vertically: bool },
    Fullscreen { id: u32, on: bool },
    Focus(u32),
    OpenOverview,
    /// Overview layout step: the preview container of `id` is `scale` times
    /// the window frame.
    LayoutPreview { id: u32, scale: f64 },
    CloseOverview,
    SwitchWorkspace,
    CloneDepth { id: u32, z: f64 },
    EndWorkspaceSwitch,
    AddBackground { monitor: usize },
    BlurLoaded,
    SetBlurEnabled(bool),
    Wait { ms: u64 },
    Enable,
    Disable,
    /// Prints the render tree.
    Dump,
}

pub struct Replay {
    host: Host,
    extension: Extension,
    timers: Rc<RefCell<ManualTimers>>,
}

impl Replay {
    pub fn new(config: Config) -> Self {
        let timers = Rc::new(RefCell::new(ManualTimers::new()));
        Replay {
            host: Host::new(),
            extension: Extension::new(config, Box::new(timers.clone())),
            timers,
        }
    }

    pub fn host(&self) -> &Host { &self.host }

    pub fn extension(&self) -> &Extension { &self.extension }

    fn event(&mut self, event: Event) -> anyhow::Result<()> {
        Ok(self.extension.handle_event(&mut self.host, event)?)
    }

    pub fn apply(&mut self, step: Step, out: &mut impl Write) -> anyhow::Result<()> {
        let _span = info_span!("step", ?step).entered();
        debug!("applying");
        match step {
            Step::Monitors(monitors) => {
                self.host.set_monitors(monitors);
                self.event(Event::MonitorsChanged)?;
            }
            Step::FramebufferScaling(on) => self.host.stage_mut().set_framebuffer_scaling(on),
            Step::Map { id, app, frame, monitor } => {
                let mut window = Window::new(WindowId::new(id), app.as_deref(), frame);
                window.monitor = monitor;
                self.host.map_window(window);
                self.event(Event::WindowMapped(WindowId::new(id)))?;
            }
            Step::Unmap(id) => {
                self.host.unmap_window(WindowId::new(id));
                self.event(Event::WindowUnmapped(WindowId::new(id)))?;
            }
            Step::Resize { id, frame } => self.host.resize(WindowId::new(id), frame),
            Step::Maximize { id, horizontally, vertically } => {
                self.host.maximize(WindowId::new(id), horizontally, vertically)
            }
            Step::Fullscreen { id, on } => self.host.set_fullscreen(WindowId::new(id), on),
            Step::Focus(id) => self.host.focus(WindowId::new(id)),
            Step::OpenOverview => {
                self.host.open_overview();
            }
            Step::LayoutPreview { id, scale } => self.host.resize_preview(WindowId::new(id), scale),
            Step::CloseOverview => self.host.close_overview(),
            Step::SwitchWorkspace => {
                self.host.switch_workspace();
            }
            Step::CloneDepth { id, z } => self.host.set_clone_depth(WindowId::new(id), z),
            Step::EndWorkspaceSwitch => self.host.end_workspace_switch(),
            Step::AddBackground { monitor } => {
                self.host.add_background(monitor);
            }
            Step::BlurLoaded => self.event(Event::BlurLoaded)?,
            Step::SetBlurEnabled(enabled) => {
                let mut config = self.extension.decorations().config.clone();
                config.blur.enabled = enabled;
                self.event(Event::ConfigChanged(Box::new(config)))?;
            }
            Step::Wait { ms } => {
                let due = self.timers.borrow_mut().advance(Duration::from_millis(ms));
                for timer in due {
                    self.event(Event::RecoveryDue(timer))?;
                }
            }
            Step::Enable => self.extension.enable(&mut self.host)?,
            Step::Disable => self.extension.disable(&mut self.host)?,
            Step::Dump => {
                let stage = self.host.stage();
                write!(out, "{}", stage.draw_tree(stage.root()))?;
            }
        }
        Ok(())
    }

    pub fn run(&mut self, input: impl BufRead, out: &mut impl Write) -> anyhow::Result<()> {
        for (index, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let step: Step = ron::de::from_str(line)
                .with_context(|| format!("line {}: invalid step `{line}`", index + 1))?;
            self.apply(step, out).with_context(|| format!("line {}", index + 1))?;
        }
        Ok(())
    }
}

/// Replays the scenario at `path` with effects enabled from the start.
pub fn replay(path: &Path, config: Config, out: &mut impl Write) -> anyhow::Result<Replay> {
    let file = BufReader::new(
        File::open(path).with_context(|| format!("opening scenario {}", path.display()))?,
    );
    let mut replay = Replay::new(config);
    replay.extension.enable(&mut replay.host)?;
    replay.run(file, out)?;
    Ok(replay)
}
