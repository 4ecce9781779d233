//! The effects controller.
//!
//! Owns the decorations, the installed hooks, the scale-change recovery and the
//! blur status flag, and reacts to host and settings events. Everything runs on
//! the thread that owns the [`Host`].

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actor;
use crate::common::config::{Config, SettingsKey};
use crate::decor::Decorations;
use crate::decor::hooks::{self, HookError, HookGuard};
use crate::decor::recovery::ScaleChangeRecovery;
use crate::decor::status::BlurStatus;
use crate::model::window::WindowId;
use crate::sys::host::Host;
use crate::sys::timer::{Timer, TimerScheduler};

#[derive(Debug)]
pub enum Event {
    /// The monitor layout or a scale factor changed.
    MonitorsChanged,
    /// The blur provider finished loading.
    BlurLoaded,
    ConfigChanged(Box<Config>),
    SettingChanged(SettingsKey),
    WindowMapped(WindowId),
    WindowUnmapped(WindowId),
    RecoveryDue(Timer),
}

impl From<Timer> for Event {
    fn from(timer: Timer) -> Self { Event::RecoveryDue(timer) }
}

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Effects are already enabled")]
    AlreadyEnabled,
    #[error("Effects are not enabled")]
    NotEnabled,
    #[error("Hook installation failed: {0}")]
    Hooks(#[from] HookError),
}

pub struct Extension {
    decorations: Rc<RefCell<Decorations>>,
    guard: Option<HookGuard>,
    recovery: ScaleChangeRecovery,
    timers: Box<dyn TimerScheduler>,
    status: BlurStatus,
}

impl Extension {
    pub fn new(config: Config, timers: Box<dyn TimerScheduler>) -> Self {
        Self::with_decorations(Decorations::new(config), timers)
    }

    pub fn with_decorations(decorations: Decorations, timers: Box<dyn TimerScheduler>) -> Self {
        Extension {
            decorations: Rc::new(RefCell::new(decorations)),
            guard: None,
            recovery: ScaleChangeRecovery::new(),
            timers,
            status: BlurStatus::new(),
        }
    }

    pub fn is_enabled(&self) -> bool { self.guard.is_some() }

    pub fn decorations(&self) -> Ref<'_, Decorations> { self.decorations.borrow() }

    pub fn blur_status(&self) -> &BlurStatus { &self.status }

    pub fn recovery(&self) -> &ScaleChangeRecovery { &self.recovery }

    pub fn enable(&mut self, host: &mut Host) -> Result<(), ControllerError> {
        if self.is_enabled() {
            return Err(ControllerError::AlreadyEnabled);
        }
        let table = host.hooks().clone();
        let guard = hooks::install(&table, &self.decorations, host.stage_mut())?;
        self.decorations.borrow_mut().enable_managers(host.stage_mut());
        self.guard = Some(guard);
        info!("effects enabled");
        Ok(())
    }

    pub fn disable(&mut self, host: &mut Host) -> Result<(), ControllerError> {
        let Some(guard) = self.guard.take() else {
            return Err(ControllerError::NotEnabled);
        };
        guard.release(host.stage_mut());
        let restored = self.recovery.cancel(host);
        if restored > 0 {
            debug!(restored, "restored windows from a pending recovery");
        }
        self.decorations.borrow_mut().disable_managers(host.stage_mut());
        info!("effects disabled");
        Ok(())
    }

    #[instrument(name = "effects::handle_event", skip(self, host))]
    pub fn handle_event(&mut self, host: &mut Host, event: Event) -> Result<(), ControllerError> {
        if !self.is_enabled() {
            match event {
                // the flag is published regardless of whether effects run
                Event::BlurLoaded => {
                    self.status.mark_loaded();
                }
                // keep the config current for the next enable
                Event::ConfigChanged(config) => self.decorations.borrow_mut().config = *config,
                event => debug!(?event, "effects disabled, ignoring"),
            }
            return Ok(());
        }

        let stage = host.stage_mut();
        match event {
            Event::MonitorsChanged => {
                self.recovery.trigger(host, &self.decorations, self.timers.as_mut());
            }
            Event::BlurLoaded => {
                if self.status.mark_loaded() {
                    let mut decorations = self.decorations.borrow_mut();
                    if decorations.config.blur.enabled {
                        decorations.set_blur_enabled(stage, true);
                    }
                }
            }
            Event::ConfigChanged(config) => {
                let keys = self.decorations.borrow().config.changed_keys(&config);
                self.decorations.borrow_mut().config = *config;
                for key in keys {
                    self.apply_setting(host, key);
                }
            }
            Event::SettingChanged(key) => self.apply_setting(host, key),
            Event::WindowMapped(window) => {
                self.decorations.borrow_mut().window_added(stage, window);
            }
            Event::WindowUnmapped(window) => {
                self.decorations.borrow_mut().window_removed(stage, window);
            }
            Event::RecoveryDue(timer) => {
                self.recovery.on_timer(host, &timer);
            }
        }
        Ok(())
    }

    fn apply_setting(&mut self, host: &mut Host, key: SettingsKey) {
        let stage = host.stage_mut();
        let mut decorations = self.decorations.borrow_mut();
        debug!(%key, "setting changed");
        match key {
            SettingsKey::BlurEnabled => {
                let enabled = decorations.config.blur.enabled;
                decorations.set_blur_enabled(stage, enabled);
            }
            // everything else feeds the managers' geometry and appearance
            _ => {
                decorations.disable_managers(stage);
                decorations.enable_managers(stage);
            }
        }
    }

    /// Handles events until the channel closes or `shutdown` fires.
    pub async fn run(&mut self, host: &mut Host, mut events: Receiver, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = events.recv() => {
                    let Some((span, event)) = msg else { break };
                    let _guard = span.enter();
                    if let Err(e) = self.handle_event(host, event) {
                        warn!("effects: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::decor::recovery::RECOVERY_DELAY;
    use crate::model::window::Window;
    use crate::sys::geometry::Rect;
    use crate::sys::timer::{ManualTimers, TokioTimers};

    fn setup(blur_enabled: bool) -> (Extension, Host, Rc<RefCell<ManualTimers>>) {
        let mut config = Config::default();
        config.blur.enabled = blur_enabled;
        config.blur.apps = vec!["app".to_string()];
        let timers = Rc::new(RefCell::new(ManualTimers::new()));
        let extension = Extension::new(config, Box::new(timers.clone()));
        let mut host = Host::new();
        let frame = Rect::new(0.0, 0.0, 800.0, 600.0);
        host.map_window(Window::new(WindowId::new(1), Some("app"), frame));
        (extension, host, timers)
    }

    fn fire_due(
        extension: &mut Extension,
        host: &mut Host,
        timers: &Rc<RefCell<ManualTimers>>,
        by: Duration,
    ) {
        let due = timers.borrow_mut().advance(by);
        for timer in due {
            extension.handle_event(host, Event::RecoveryDue(timer)).unwrap();
        }
    }

    #[test]
    fn enable_twice_is_an_error() {
        let (mut extension, mut host, _) = setup(false);
        extension.enable(&mut host).unwrap();
        assert!(matches!(extension.enable(&mut host), Err(ControllerError::AlreadyEnabled)));
        extension.disable(&mut host).unwrap();
        assert!(matches!(extension.disable(&mut host), Err(ControllerError::NotEnabled)));
    }

    #[test]
    fn blur_setting_toggles_blur_manager() {
        let (mut extension, mut host, _) = setup(false);
        extension.enable(&mut host).unwrap();
        assert!(!extension.decorations().blur.is_enabled());

        let mut config = extension.decorations().config.clone();
        config.blur.enabled = true;
        extension.handle_event(&mut host, Event::ConfigChanged(Box::new(config))).unwrap();
        assert!(extension.decorations().blur.is_enabled());
        assert!(extension.decorations().blur.query(WindowId::new(1)).is_some());

        let mut config = extension.decorations().config.clone();
        config.blur.enabled = false;
        extension.handle_event(&mut host, Event::ConfigChanged(Box::new(config))).unwrap();
        assert!(!extension.decorations().blur.is_enabled());
    }

    #[test]
    fn blur_loaded_publishes_once() {
        let (mut extension, mut host, _) = setup(true);
        let mut rx = extension.blur_status().subscribe();
        extension.enable(&mut host).unwrap();

        extension.handle_event(&mut host, Event::BlurLoaded).unwrap();
        extension.handle_event(&mut host, Event::BlurLoaded).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(!rx.has_changed().unwrap());
        assert!(extension.decorations().blur.is_enabled());
    }

    #[test]
    fn recovery_round_trip_through_events() {
        let (mut extension, mut host, timers) = setup(false);
        extension.enable(&mut host).unwrap();

        extension.handle_event(&mut host, Event::MonitorsChanged).unwrap();
        assert!(host.stage().window(WindowId::new(1)).unwrap().fullscreen);
        let shadow = extension.decorations().shadow.query(WindowId::new(1)).unwrap();
        assert_eq!(host.stage().opacity(shadow), 0);
        assert_eq!(host.stage().allocation(shadow), Rect::new(-80.0, -80.0, 2080.0, 1240.0));

        fire_due(&mut extension, &mut host, &timers, RECOVERY_DELAY);
        let win = host.stage().window(WindowId::new(1)).unwrap();
        assert!(!win.fullscreen);
        assert!(!win.has_recovery_marker());
        assert_eq!(win.frame_rect(), Rect::new(0.0, 0.0, 800.0, 600.0));
        assert_eq!(host.stage().allocation(shadow), Rect::new(-80.0, -80.0, 960.0, 760.0));
    }

    #[test]
    fn disable_with_pending_recovery_restores_windows() {
        let (mut extension, mut host, timers) = setup(false);
        extension.enable(&mut host).unwrap();
        extension.handle_event(&mut host, Event::MonitorsChanged).unwrap();

        extension.disable(&mut host).unwrap();
        assert!(!host.stage().window(WindowId::new(1)).unwrap().fullscreen);

        // stale timer fires after teardown and finds its token cancelled
        host.set_fullscreen(WindowId::new(1), true);
        fire_due(&mut extension, &mut host, &timers, RECOVERY_DELAY);
        assert!(host.stage().window(WindowId::new(1)).unwrap().fullscreen);
    }

    #[test]
    fn mapped_windows_get_a_shadow() {
        let (mut extension, mut host, _) = setup(false);
        extension.enable(&mut host).unwrap();
        host.map_window(Window::new(WindowId::new(2), None, Rect::new(10.0, 10.0, 100.0, 100.0)));
        extension.handle_event(&mut host, Event::WindowMapped(WindowId::new(2))).unwrap();
        let shadow = extension.decorations().shadow.query(WindowId::new(2));
        assert!(shadow.is_some_and(|s| host.stage().contains(s)));

        host.unmap_window(WindowId::new(2));
        extension.handle_event(&mut host, Event::WindowUnmapped(WindowId::new(2))).unwrap();
        assert_eq!(extension.decorations().shadow.query(WindowId::new(2)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drives_tokio_timers() {
        let (tx, rx) = actor::channel();
        let timers = Box::new(TokioTimers::new(tx.clone()));
        let mut extension = Extension::new(Config::default(), timers);
        let mut host = Host::new();
        host.map_window(Window::new(WindowId::new(1), None, Rect::new(0.0, 0.0, 300.0, 200.0)));
        extension.enable(&mut host).unwrap();

        let shutdown = CancellationToken::new();
        tx.send(Event::MonitorsChanged);
        let stop = shutdown.clone();
        let mut run = Box::pin(extension.run(&mut host, rx, shutdown));
        tokio::select! {
            _ = &mut run => panic!("run loop exited early"),
            _ = tokio::time::sleep(Duration::from_secs(3)) => stop.cancel(),
        }
        run.await;

        assert!(extension.is_enabled());
        assert!(extension.recovery().pending().is_none());
        let win = host.stage().window(WindowId::new(1)).unwrap();
        assert!(!win.fullscreen);
        assert!(!win.has_recovery_marker());
    }
}
