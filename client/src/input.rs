//! Keyboard sampling with edge detection, turned into session commands

use crate::network::ClientCommand;
use macroquad::prelude::*;
use shared::{KeyAction, PaddleKey};

/// Key state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySample {
    pub up: bool,
    pub down: bool,
    pub quit: bool,
    pub graph: bool,
}

/// Collects key transitions between frames. Only changes are reported, so a
/// held key produces one `key_down` and one `key_up`.
pub struct InputManager {
    previous: KeySample,
    graph_toggled: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            previous: KeySample::default(),
            graph_toggled: false,
        }
    }

    /// Samples the keyboard (W/S or arrows, Esc to quit, G for the graph)
    pub fn update(&mut self) -> Vec<ClientCommand> {
        let sample = KeySample {
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            quit: is_key_down(KeyCode::Escape),
            graph: is_key_down(KeyCode::G),
        };
        self.edges(sample)
    }

    pub fn edges(&mut self, sample: KeySample) -> Vec<ClientCommand> {
        let mut commands = Vec::new();

        if let Some(action) = transition(self.previous.up, sample.up) {
            commands.push(ClientCommand::Input {
                key: PaddleKey::Up,
                action,
            });
        }
        if let Some(action) = transition(self.previous.down, sample.down) {
            commands.push(ClientCommand::Input {
                key: PaddleKey::Down,
                action,
            });
        }
        if sample.quit && !self.previous.quit {
            commands.push(ClientCommand::Quit);
        }
        if sample.graph && !self.previous.graph {
            self.graph_toggled = true;
        }

        self.previous = sample;
        commands
    }

    /// True once per G press
    pub fn take_graph_toggle(&mut self) -> bool {
        std::mem::take(&mut self.graph_toggled)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

fn transition(was: bool, is: bool) -> Option<KeyAction> {
    match (was, is) {
        (false, true) => Some(KeyAction::KeyDown),
        (true, false) => Some(KeyAction::KeyUp),
        _ => None,
    }
}
