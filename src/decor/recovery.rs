//! Recovery from monitor reconfiguration.
//!
//! After a scale change the host may keep stale frame and buffer rectangles
//! until something forces a relayout. Every non-fullscreen window is briefly
//! forced into fullscreen and restored two seconds later. Both toggles go
//! through the host so the installed resize hook refreshes the decorations.

use std::cell::RefCell;
use std::time::Duration;

use tracing::{debug, info};

use crate::decor::Decorations;
use crate::sys::host::Host;
use crate::sys::timer::{Timer, TimerScheduler};

pub const RECOVERY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct ScaleChangeRecovery {
    next_id: u64,
    pending: Option<Timer>,
}

impl ScaleChangeRecovery {
    pub fn new() -> Self { Self::default() }

    pub fn pending(&self) -> Option<&Timer> { self.pending.as_ref() }

    /// Runs the recovery pass and schedules the restore. Returns how many
    /// windows were forced into fullscreen.
    ///
    /// `decorations` must not be borrowed by the caller; the resize hook
    /// borrows it while each window is toggled.
    pub fn trigger(
        &mut self,
        host: &mut Host,
        decorations: &RefCell<Decorations>,
        timers: &mut dyn TimerScheduler,
    ) -> usize {
        {
            let mut decorations = decorations.borrow_mut();
            decorations.disable_managers(host.stage_mut());
            decorations.enable_managers(host.stage_mut());
        }

        // windows still marked by an earlier pass are restored by this one
        if let Some(previous) = self.pending.take() {
            previous.cancel();
        }

        let mut marked = 0;
        for (_, id) in host.stage().window_actors() {
            let Some(window) = host.stage_mut().window_mut(id) else { continue };
            if window.fullscreen {
                continue;
            }
            window.set_recovery_marker(true);
            host.set_fullscreen(id, true);
            marked += 1;
        }

        self.next_id += 1;
        let timer = Timer::new(self.next_id);
        timers.schedule(RECOVERY_DELAY, timer.clone());
        self.pending = Some(timer);

        info!(marked, "monitors changed, forcing relayout");
        marked
    }

    /// Handles a fired recovery timer. Returns how many windows were restored.
    pub fn on_timer(&mut self, host: &mut Host, timer: &Timer) -> usize {
        if timer.is_cancelled() {
            debug!(id = timer.id(), "recovery timer was cancelled");
            return 0;
        }
        if self.pending.as_ref().is_some_and(|p| p.id() == timer.id()) {
            self.pending = None;
        }
        restore_marked(host)
    }

    /// Cancels a pending restore and restores marked windows right away.
    pub fn cancel(&mut self, host: &mut Host) -> usize {
        let Some(pending) = self.pending.take() else { return 0 };
        pending.cancel();
        restore_marked(host)
    }
}

fn restore_marked(host: &mut Host) -> usize {
    let mut restored = 0;
    for (_, id) in host.stage().window_actors() {
        let Some(window) = host.stage_mut().window_mut(id) else { continue };
        if !window.has_recovery_marker() {
            continue;
        }
        window.set_recovery_marker(false);
        host.set_fullscreen(id, false);
        restored += 1;
    }
    debug!(restored, "recovery restored windows");
    restored
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::common::config::Config;
    use crate::decor::hooks;
    use crate::model::window::{Window, WindowId};
    use crate::sys::geometry::Rect;
    use crate::sys::timer::ManualTimers;

    fn setup() -> (Host, RefCell<Decorations>) {
        let mut host = Host::new();
        for i in 1..=3 {
            let frame = Rect::new(10.0 * i as f64, 10.0, 400.0, 300.0);
            host.map_window(Window::new(WindowId::new(i), Some("app"), frame));
        }
        host.set_fullscreen(WindowId::new(2), true);
        let decorations = RefCell::new(Decorations::new(Config::default()));
        decorations.borrow_mut().enable_managers(host.stage_mut());
        (host, decorations)
    }

    fn fullscreen(host: &Host, id: u32) -> bool {
        host.stage().window(WindowId::new(id)).unwrap().fullscreen
    }

    fn marked(host: &Host, id: u32) -> bool {
        host.stage().window(WindowId::new(id)).unwrap().has_recovery_marker()
    }

    #[test]
    fn only_non_fullscreen_windows_are_marked() {
        let (mut host, decorations) = setup();
        let mut timers = ManualTimers::new();
        let mut recovery = ScaleChangeRecovery::new();

        assert_eq!(recovery.trigger(&mut host, &decorations, &mut timers), 2);
        assert!(marked(&host, 1) && fullscreen(&host, 1));
        assert!(!marked(&host, 2) && fullscreen(&host, 2));
        assert!(marked(&host, 3) && fullscreen(&host, 3));

        let due = timers.advance(RECOVERY_DELAY);
        assert_eq!(due.len(), 1);
        assert_eq!(recovery.on_timer(&mut host, &due[0]), 2);

        assert!(!marked(&host, 1) && !fullscreen(&host, 1));
        assert!(fullscreen(&host, 2), "already fullscreen window was touched");
        assert!(!marked(&host, 3) && !fullscreen(&host, 3));
        assert_eq!(
            host.stage().window(WindowId::new(1)).unwrap().frame_rect(),
            Rect::new(10.0, 10.0, 400.0, 300.0)
        );
    }

    #[test]
    fn retrigger_cancels_the_previous_timer() {
        let (mut host, decorations) = setup();
        let mut timers = ManualTimers::new();
        let mut recovery = ScaleChangeRecovery::new();

        recovery.trigger(&mut host, &decorations, &mut timers);
        timers.advance(Duration::from_secs(1));
        // second pass sees the marked windows as fullscreen and leaves them be
        assert_eq!(recovery.trigger(&mut host, &decorations, &mut timers), 0);

        let due = timers.advance(Duration::from_secs(1));
        assert_eq!(due.len(), 1);
        assert_eq!(recovery.on_timer(&mut host, &due[0]), 0);
        assert!(marked(&host, 1));

        let due = timers.advance(Duration::from_secs(1));
        assert_eq!(recovery.on_timer(&mut host, &due[0]), 2);
        assert!(!fullscreen(&host, 1));
        assert!(recovery.pending().is_none());
    }

    #[test]
    fn cancel_restores_immediately_and_disarms_timer() {
        let (mut host, decorations) = setup();
        let mut timers = ManualTimers::new();
        let mut recovery = ScaleChangeRecovery::new();

        recovery.trigger(&mut host, &decorations, &mut timers);
        assert_eq!(recovery.cancel(&mut host), 2);
        assert!(!fullscreen(&host, 3));

        // the window is fullscreened by the user before the stale timer fires
        host.set_fullscreen(WindowId::new(3), true);
        let due = timers.advance(RECOVERY_DELAY);
        assert_eq!(recovery.on_timer(&mut host, &due[0]), 0);
        assert!(fullscreen(&host, 3));
    }

    #[test]
    fn trigger_rebuilds_manager_state() {
        let (mut host, decorations) = setup();
        let before = decorations.borrow().shadow.query(WindowId::new(1)).unwrap();
        let mut timers = ManualTimers::new();
        ScaleChangeRecovery::new().trigger(&mut host, &decorations, &mut timers);

        let after = decorations.borrow().shadow.query(WindowId::new(1)).unwrap();
        assert!(!host.stage().contains(before));
        assert!(host.stage().contains(after));
    }

    #[test]
    fn decorations_follow_the_fullscreen_toggle() {
        let mut host = Host::new();
        let frame = Rect::new(100.0, 100.0, 800.0, 600.0);
        host.map_window(Window::new(WindowId::new(1), Some("app"), frame));
        let decorations = Rc::new(RefCell::new(Decorations::new(Config::default())));
        decorations.borrow_mut().enable_managers(host.stage_mut());
        let table = host.hooks().clone();
        let guard = hooks::install(&table, &decorations, host.stage_mut()).unwrap();

        let mut timers = ManualTimers::new();
        let mut recovery = ScaleChangeRecovery::new();
        recovery.trigger(&mut host, &decorations, &mut timers);

        let shadow = decorations.borrow().shadow.query(WindowId::new(1)).unwrap();
        assert_eq!(host.stage().opacity(shadow), 0);
        assert_eq!(host.stage().allocation(shadow), Rect::new(-80.0, -80.0, 2080.0, 1240.0));

        let due = timers.advance(RECOVERY_DELAY);
        assert_eq!(recovery.on_timer(&mut host, &due[0]), 1);
        let unfocused = Config::default().shadow.unfocused_opacity;
        assert_eq!(host.stage().opacity(shadow), unfocused);
        assert_eq!(host.stage().allocation(shadow), Rect::new(20.0, 20.0, 960.0, 760.0));

        guard.release(host.stage_mut());
    }
}
