//! Key bindings mapped to named actions.
//!
//! # Invariants
//! - Unbound keys resolve to [`Action::Unknown`], never to an error.
//! - Handlers fire on press only; release just clears the held state.
//! - The render core never sees key codes, only actions and camera deltas.

mod bindings;

pub use bindings::{Action, Bindings, CameraDelta, KeyCode};

pub fn crate_info() -> &'static str {
    "lumen-input v0.1.0"
}
