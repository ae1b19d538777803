// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashSet;

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keyboard and mouse state, owned by the frame loop.
///
/// `pressed`/`released` hold edges seen since the last `flush`; `down` holds
/// whatever is currently held.
#[derive(Debug, Default)]
pub struct InputState {
    keys_pressed: HashSet<KeyCode>,
    keys_down: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,

    buttons_pressed: HashSet<MouseButton>,
    buttons_down: HashSet<MouseButton>,
    buttons_released: HashSet<MouseButton>,

    cursor: Option<(f64, f64)>,
    delta: (f64, f64),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one window event in. Returns true if it was an input event.
    pub fn handle(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return true;
                }
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.key_down(code),
                        ElementState::Released => self.key_up(code),
                    }
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.button_down(*button),
                    ElementState::Released => self.button_up(*button),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(position.x, position.y);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                true
            }
            _ => false,
        }
    }

    pub fn key_down(&mut self, code: KeyCode) {
        if self.keys_down.insert(code) {
            self.keys_pressed.insert(code);
        }
    }

    pub fn key_up(&mut self, code: KeyCode) {
        if self.keys_down.remove(&code) {
            self.keys_released.insert(code);
        }
    }

    pub fn button_down(&mut self, button: MouseButton) {
        if self.buttons_down.insert(button) {
            self.buttons_pressed.insert(button);
        }
    }

    pub fn button_up(&mut self, button: MouseButton) {
        if self.buttons_down.remove(&button) {
            self.buttons_released.insert(button);
        }
    }

    /// Deltas accumulate until the next `flush`; the first position after
    /// the cursor enters yields no delta.
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        if let Some((px, py)) = self.cursor {
            self.delta.0 += x - px;
            self.delta.1 += y - py;
        }
        self.cursor = Some((x, y));
    }

    pub fn pressed(&self, code: KeyCode) -> bool {
        self.keys_pressed.contains(&code)
    }

    pub fn down(&self, code: KeyCode) -> bool {
        self.keys_down.contains(&code)
    }

    pub fn released(&self, code: KeyCode) -> bool {
        self.keys_released.contains(&code)
    }

    pub fn button_pressed(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }

    pub fn button_held(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    pub fn button_released(&self, button: MouseButton) -> bool {
        self.buttons_released.contains(&button)
    }

    pub fn cursor(&self) -> Option<(f64, f64)> {
        self.cursor
    }

    pub fn cursor_delta(&self) -> (f64, f64) {
        self.delta
    }

    /// End of tick: drops edges and the accumulated delta.
    pub fn flush(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.buttons_pressed.clear();
        self.buttons_released.clear();
        self.delta = (0.0, 0.0);
    }

    /// Focus lost: nothing can be assumed held any more.
    pub fn flush_all(&mut self) {
        self.flush();
        self.keys_down.clear();
        self.buttons_down.clear();
    }
}
