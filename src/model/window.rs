use serde::{Deserialize, Serialize};

use crate::sys::geometry::Rect;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u32);

impl WindowId {
    pub const fn new(id: u32) -> Self { WindowId(id) }

    pub fn as_u32(&self) -> u32 { self.0 }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "win#{}", self.0)
    }
}

/// A host window as seen by the decorations.
///
/// Windows are owned by the host; the decorations only read their state, with
/// the exception of the recovery marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    id: WindowId,
    app_id: Option<String>,
    frame: Rect,
    pub maximized_horizontally: bool,
    pub maximized_vertically: bool,
    pub fullscreen: bool,
    pub monitor: usize,
    pub focused: bool,
    /// Frame to return to when leaving fullscreen.
    saved_frame: Option<Rect>,
    recovery_marker: bool,
}

impl Window {
    pub fn new(id: WindowId, app_id: Option<&str>, frame: Rect) -> Self {
        Window {
            id,
            app_id: app_id.map(str::to_owned),
            frame,
            maximized_horizontally: false,
            maximized_vertically: false,
            fullscreen: false,
            monitor: 0,
            focused: false,
            saved_frame: None,
            recovery_marker: false,
        }
    }

    #[inline]
    pub fn id(&self) -> WindowId { self.id }

    /// The application identity (wm-class instance) used for per-app overrides.
    #[inline]
    pub fn app_id(&self) -> Option<&str> { self.app_id.as_deref() }

    #[inline]
    pub fn frame_rect(&self) -> Rect { self.frame }

    pub fn set_frame_rect(&mut self, frame: Rect) { self.frame = frame; }

    #[inline]
    pub fn is_maximized_or_fullscreen(&self) -> bool {
        self.maximized_horizontally || self.maximized_vertically || self.fullscreen
    }

    pub(crate) fn enter_fullscreen(&mut self, monitor_rect: Rect) {
        if self.fullscreen {
            return;
        }
        self.saved_frame = Some(self.frame);
        self.frame = monitor_rect;
        self.fullscreen = true;
    }

    pub(crate) fn leave_fullscreen(&mut self) {
        if !self.fullscreen {
            return;
        }
        if let Some(frame) = self.saved_frame.take() {
            self.frame = frame;
        }
        self.fullscreen = false;
    }

    /// Set on windows forced into fullscreen by the scale-change recovery.
    #[inline]
    pub fn has_recovery_marker(&self) -> bool { self.recovery_marker }

    pub(crate) fn set_recovery_marker(&mut self, marked: bool) { self.recovery_marker = marked; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullscreen_round_trip_restores_frame() {
        let frame = Rect::new(100.0, 100.0, 640.0, 480.0);
        let mut win = Window::new(WindowId::new(7), Some("org.example.App"), frame);

        win.enter_fullscreen(Rect::new(0.0, 0.0, 1920.0, 1080.0));
        assert!(win.fullscreen);
        assert_eq!(win.frame_rect(), Rect::new(0.0, 0.0, 1920.0, 1080.0));

        // entering twice must not clobber the saved frame
        win.enter_fullscreen(Rect::new(0.0, 0.0, 2560.0, 1440.0));
        win.leave_fullscreen();
        assert!(!win.fullscreen);
        assert_eq!(win.frame_rect(), frame);
    }

    #[test]
    fn maximized_or_fullscreen() {
        let mut win = Window::new(WindowId::new(1), None, Rect::ZERO);
        assert!(!win.is_maximized_or_fullscreen());
        win.maximized_vertically = true;
        assert!(win.is_maximized_or_fullscreen());
    }
}
