use serde::Deserialize;

use super::world::Vector;

pub type Scancode = u16;

pub const KEY_STATE_SIZE: usize = 512;

pub const SCANCODE_A: Scancode = 4;
pub const SCANCODE_D: Scancode = 7;
pub const SCANCODE_S: Scancode = 22;
pub const SCANCODE_W: Scancode = 26;
pub const SCANCODE_RIGHT: Scancode = 79;
pub const SCANCODE_LEFT: Scancode = 80;
pub const SCANCODE_DOWN: Scancode = 81;
pub const SCANCODE_UP: Scancode = 82;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Key { code: Scancode, down: bool },
    MouseMove { position: Vector },
    MouseClick { down: bool, position: Vector },
    MouseWheel { delta: i32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCommand {
    pub up: u8,
    pub down: u8,
    pub left: u8,
    pub right: u8,
}

impl UserCommand {
    pub fn velocity(&self, speed: i32) -> Vector {
        Vector {
            x: speed * (i32::from(self.right) - i32::from(self.left)) / 255,
            y: speed * (i32::from(self.down) - i32::from(self.up)) / 255,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub up: Vec<Scancode>,
    pub down: Vec<Scancode>,
    pub left: Vec<Scancode>,
    pub right: Vec<Scancode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            up: vec![SCANCODE_UP, SCANCODE_W],
            down: vec![SCANCODE_DOWN, SCANCODE_S],
            left: vec![SCANCODE_LEFT, SCANCODE_A],
            right: vec![SCANCODE_RIGHT, SCANCODE_D],
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyStateTable {
    down: [bool; KEY_STATE_SIZE],
}

impl Default for KeyStateTable {
    fn default() -> Self {
        Self {
            down: [false; KEY_STATE_SIZE],
        }
    }
}

impl KeyStateTable {
    pub fn apply(&mut self, event: &Event) {
        if let Event::Key { code, down } = *event {
            if let Some(slot) = self.down.get_mut(usize::from(code)) {
                *slot = down;
            }
        }
    }

    pub fn is_down(&self, code: Scancode) -> bool {
        self.down.get(usize::from(code)).copied().unwrap_or(false)
    }

    pub fn command(&self, bindings: &KeyBindings) -> UserCommand {
        let magnitude = |codes: &[Scancode]| {
            if codes.iter().any(|code| self.is_down(*code)) {
                255
            } else {
                0
            }
        };
        UserCommand {
            up: magnitude(&bindings.up),
            down: magnitude(&bindings.down),
            left: magnitude(&bindings.left),
            right: magnitude(&bindings.right),
        }
    }
}
