// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window-system glue: winit re-export, input state and surface events.
pub use winit;

mod events;
mod input;

pub use events::{surface_event, MinimizeWatch};
pub use input::InputState;
