//! One-shot timers for the event loop.
//!
//! A scheduled [`Timer`] comes back to its owner once its delay has elapsed,
//! unless its cancellation token fired first. Owners must still check
//! [`Timer::is_cancelled`] when it comes back: cancellation can race with
//! delivery.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::actor;

#[derive(Debug, Clone)]
pub struct Timer {
    id: u64,
    token: CancellationToken,
}

impl Timer {
    pub fn new(id: u64) -> Self { Timer { id, token: CancellationToken::new() } }

    pub fn id(&self) -> u64 { self.id }

    pub fn cancel(&self) { self.token.cancel() }

    pub fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    pub fn token(&self) -> &CancellationToken { &self.token }
}

pub trait TimerScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer);
}

/// Delivers fired timers as events on an actor channel.
pub struct TokioTimers<E> {
    events: actor::Sender<E>,
}

impl<E> TokioTimers<E> {
    pub fn new(events: actor::Sender<E>) -> Self { TokioTimers { events } }
}

impl<E: From<Timer> + Send + 'static> TimerScheduler for TokioTimers<E> {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        let events = self.events.clone();
        let token = timer.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => trace!(id = timer.id, "timer cancelled"),
                _ = tokio::time::sleep(delay) => events.send(E::from(timer)),
            }
        });
    }
}

/// Timers driven by hand, for replay and tests.
#[derive(Debug, Default)]
pub struct ManualTimers {
    now: Duration,
    pending: Vec<(Duration, Timer)>,
}

impl ManualTimers {
    pub fn new() -> Self { Self::default() }

    pub fn now(&self) -> Duration { self.now }

    pub fn pending(&self) -> usize { self.pending.len() }

    /// Moves the clock forward and returns every timer that came due, in
    /// deadline order. Cancelled timers are returned too.
    pub fn advance(&mut self, by: Duration) -> Vec<Timer> {
        self.now += by;
        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(deadline, _)| *deadline <= now);
        self.pending = pending;
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, timer)| timer).collect()
    }
}

impl TimerScheduler for ManualTimers {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.pending.push((self.now + delay, timer));
    }
}

// shared between the controller that schedules and the driver that advances
impl TimerScheduler for std::rc::Rc<std::cell::RefCell<ManualTimers>> {
    fn schedule(&mut self, delay: Duration, timer: Timer) { self.borrow_mut().schedule(delay, timer) }
}
