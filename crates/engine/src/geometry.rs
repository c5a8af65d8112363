use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Visible drawing area in screen pixels. Origin is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True once a point has left the viewport by more than `offset` on any side.
    pub fn is_beyond(&self, position: Vec2, offset: f32) -> bool {
        position.x < -offset
            || position.x > offset + self.width
            || position.y < -offset
            || position.y > offset + self.height
    }
}

/// Euclidean norm of a displayed size; the fallback eviction margin.
pub fn diagonal(width: f32, height: f32) -> f32 {
    (width * width + height * height).sqrt()
}

/// Host-owned facts read by the runtime at the moment they are needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageState {
    pub viewport: Viewport,
    pub visible: bool,
    pub loading_blocked: bool,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            visible: true,
            loading_blocked: false,
        }
    }
}
