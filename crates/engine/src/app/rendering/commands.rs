use crate::app::bridge::ImageHandle;
use crate::app::world::{Color, Size, Vector};

pub const DEFAULT_COMMAND_CAPACITY: usize = 2048;
pub const BACKGROUND_COLOR: Color = Color::rgba(168, 168, 168, 255);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    Rect {
        pos: Vector,
        size: Size,
        color: Color,
    },
    Pic {
        image: ImageHandle,
        pos: Vector,
        size: Size,
        src_pos: Vector,
        src_size: Size,
    },
    Text { pos: Vector, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommandList {
    commands: Vec<RenderCommand>,
    capacity: usize,
    dropped: usize,
}

impl RenderCommandList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub(crate) fn from_parts(commands: Vec<RenderCommand>, capacity: usize, dropped: usize) -> Self {
        debug_assert!(commands.len() <= capacity);
        Self {
            commands,
            capacity,
            dropped,
        }
    }

    pub fn push(&mut self, command: RenderCommand) -> bool {
        if self.commands.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.commands.push(command);
        true
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderCommand> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for RenderCommandList {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_COMMAND_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32) -> RenderCommand {
        RenderCommand::Rect {
            pos: Vector { x, y: 0 },
            size: Size { w: 1, h: 1 },
            color: BACKGROUND_COLOR,
        }
    }

    #[test]
    fn push_past_capacity_counts_drops() {
        let mut list = RenderCommandList::with_capacity(2);
        assert!(list.push(rect(0)));
        assert!(list.push(rect(1)));
        assert!(!list.push(rect(2)));

        assert_eq!(list.len(), 2);
        assert_eq!(list.dropped(), 1);
        assert_eq!(list.commands()[1], rect(1));
    }
}
