use super::world::{Size, Vector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Camera {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    size: Size,
    bounds: Size,
}

impl Camera {
    pub fn new(size: Size, bounds: Size) -> Self {
        let mut camera = Self::default();
        camera.set_size(size);
        camera.set_bounds(bounds);
        camera
    }

    /// An axis where the bounds are smaller than the viewport saturates to 0.
    pub fn set(&mut self, x: i32, y: i32) {
        self.left = clamp_axis(x, self.bounds.w.saturating_sub(self.size.w));
        self.top = clamp_axis(y, self.bounds.h.saturating_sub(self.size.h));
        self.right = self.left.saturating_add(self.size.w);
        self.bottom = self.top.saturating_add(self.size.h);
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
        self.set(self.left, self.top);
    }

    pub fn set_bounds(&mut self, bounds: Size) {
        self.bounds = bounds;
        self.set(self.left, self.top);
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn origin(&self) -> Vector {
        Vector {
            x: self.left,
            y: self.top,
        }
    }

    pub fn to_screen(&self, world: Vector) -> Vector {
        Vector {
            x: world.x.saturating_sub(self.left),
            y: world.y.saturating_sub(self.top),
        }
    }
}

fn clamp_axis(value: i32, max: i32) -> i32 {
    if max <= 0 {
        return 0;
    }
    value.clamp(0, max)
}
