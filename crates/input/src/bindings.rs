use std::collections::{HashMap, HashSet};
use std::fmt;

use glam::Vec3;

/// A named action the frame driver reacts to.
///
/// The render core consumes camera moves and toggles, never raw key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Unknown,
    CamForward,
    CamReverse,
    CamLeft,
    CamRight,
    CamUp,
    CamDown,
    LineLeft,
    LineRight,
    CameraFollow,
    Pause,
    Reload,
    Debug,
}

/// Physical keys the default bindings use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Q,
    E,
    F,
    R,
    Space,
    Backslash,
    LeftArrow,
    RightArrow,
    Escape,
}

/// Movement requested by the held camera keys for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraDelta {
    /// Move in camera space: +X right, -Z forward.
    pub local: Vec3,
    /// World-space vertical move, applied independent of orientation.
    pub vertical: f32,
}

impl CameraDelta {
    pub fn is_zero(&self) -> bool {
        self.local == Vec3::ZERO && self.vertical == 0.0
    }
}

type Handler = Box<dyn FnMut(Action)>;

/// Key-to-action table with held-state tracking and toggle handlers.
#[derive(Default)]
pub struct Bindings {
    keys: HashMap<KeyCode, Action>,
    handlers: HashMap<Action, Handler>,
    pressed: HashSet<Action>,
}

impl Bindings {
    /// An empty table; every key maps to [`Action::Unknown`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_bindings() -> Self {
        Self::new()
            .bind(KeyCode::W, Action::CamForward)
            .bind(KeyCode::S, Action::CamReverse)
            .bind(KeyCode::A, Action::CamLeft)
            .bind(KeyCode::D, Action::CamRight)
            .bind(KeyCode::Q, Action::CamUp)
            .bind(KeyCode::E, Action::CamDown)
            .bind(KeyCode::RightArrow, Action::LineRight)
            .bind(KeyCode::LeftArrow, Action::LineLeft)
            .bind(KeyCode::F, Action::CameraFollow)
            .bind(KeyCode::Space, Action::Pause)
            .bind(KeyCode::R, Action::Reload)
            .bind(KeyCode::Backslash, Action::Debug)
    }

    pub fn bind(mut self, key: KeyCode, action: Action) -> Self {
        self.keys.insert(key, action);
        self
    }

    pub fn lookup(&self, key: KeyCode) -> Action {
        self.keys.get(&key).copied().unwrap_or(Action::Unknown)
    }

    /// Register the handler fired each time `action` is pressed. Replaces any
    /// earlier handler for the same action.
    pub fn on(&mut self, action: Action, handler: impl FnMut(Action) + 'static) {
        self.handlers.insert(action, Box::new(handler));
    }

    /// Mark the key's action held and fire its handler, if any.
    pub fn press(&mut self, key: KeyCode) -> Action {
        let action = self.lookup(key);
        self.pressed.insert(action);
        if let Some(handler) = self.handlers.get_mut(&action) {
            tracing::debug!(?key, ?action, "action fired");
            handler(action);
        }
        action
    }

    pub fn release(&mut self, key: KeyCode) -> Action {
        let action = self.lookup(key);
        self.pressed.remove(&action);
        action
    }

    pub fn pressed(&self, action: Action) -> bool {
        self.pressed.contains(&action)
    }

    /// Combine the held camera keys into one frame's movement.
    /// Opposite keys held together cancel out.
    pub fn camera_delta(&self, speed: f32) -> CameraDelta {
        let axis = |pos: Action, neg: Action| {
            (self.pressed(pos) as i32 - self.pressed(neg) as i32) as f32 * speed
        };
        CameraDelta {
            local: Vec3::new(
                axis(Action::CamRight, Action::CamLeft),
                0.0,
                -axis(Action::CamForward, Action::CamReverse),
            ),
            vertical: axis(Action::CamUp, Action::CamDown),
        }
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("keys", &self.keys)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("pressed", &self.pressed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn default_keys_resolve() {
        let b = Bindings::default_bindings();
        assert_eq!(b.lookup(KeyCode::W), Action::CamForward);
        assert_eq!(b.lookup(KeyCode::Space), Action::Pause);
        assert_eq!(b.lookup(KeyCode::Backslash), Action::Debug);
        assert_eq!(b.lookup(KeyCode::Escape), Action::Unknown);
    }

    #[test]
    fn press_and_release_track_held_state() {
        let mut b = Bindings::default_bindings();
        assert!(!b.pressed(Action::CamLeft));
        assert_eq!(b.press(KeyCode::A), Action::CamLeft);
        assert!(b.pressed(Action::CamLeft));
        b.release(KeyCode::A);
        assert!(!b.pressed(Action::CamLeft));
    }

    #[test]
    fn handler_fires_on_every_press() {
        let mut b = Bindings::default_bindings();
        let paused = Rc::new(Cell::new(false));
        let flag = Rc::clone(&paused);
        b.on(Action::Pause, move |_| flag.set(!flag.get()));

        b.press(KeyCode::Space);
        assert!(paused.get());
        b.release(KeyCode::Space);
        b.press(KeyCode::Space);
        assert!(!paused.get());
        // Releasing never fires.
        b.release(KeyCode::Space);
        assert!(!paused.get());
    }

    #[test]
    fn forward_is_negative_z() {
        let mut b = Bindings::default_bindings();
        b.press(KeyCode::W);
        b.press(KeyCode::D);
        let d = b.camera_delta(0.5);
        assert_eq!(d.local, Vec3::new(0.5, 0.0, -0.5));
        assert_eq!(d.vertical, 0.0);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut b = Bindings::default_bindings();
        b.press(KeyCode::Q);
        b.press(KeyCode::E);
        b.press(KeyCode::W);
        b.press(KeyCode::S);
        assert!(b.camera_delta(1.0).is_zero());
        b.release(KeyCode::E);
        assert_eq!(b.camera_delta(1.0).vertical, 1.0);
    }

    #[test]
    fn unbound_keys_hold_unknown() {
        let mut b = Bindings::new();
        assert_eq!(b.press(KeyCode::W), Action::Unknown);
        assert!(b.pressed(Action::Unknown));
        assert!(b.camera_delta(1.0).is_zero());
    }
}
