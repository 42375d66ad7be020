use crate::app::world::Vec2;

#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Uniform world-to-screen mapping: the world pixel rectangle is scaled to
/// fit the viewport and centered, leaving letterbox bars outside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameTransform {
    pub(crate) scale: f32,
    pub(crate) offset_x: f32,
    pub(crate) offset_y: f32,
}

pub(crate) fn frame_transform(
    viewport: Viewport,
    world_width_px: f32,
    world_height_px: f32,
) -> FrameTransform {
    let safe_world_w = world_width_px.max(1.0);
    let safe_world_h = world_height_px.max(1.0);
    let scale_x = viewport.width as f32 / safe_world_w;
    let scale_y = viewport.height as f32 / safe_world_h;
    let scale = scale_x.min(scale_y).max(f32::EPSILON);

    FrameTransform {
        scale,
        offset_x: (viewport.width as f32 - safe_world_w * scale) / 2.0,
        offset_y: (viewport.height as f32 - safe_world_h * scale) / 2.0,
    }
}

impl FrameTransform {
    pub(crate) fn screen_x(&self, world_x: f32) -> i32 {
        (self.offset_x + world_x * self.scale).round() as i32
    }

    pub(crate) fn screen_y(&self, world_y: f32) -> i32 {
        (self.offset_y + world_y * self.scale).round() as i32
    }

    pub(crate) fn screen_len(&self, world_len: f32) -> i32 {
        (world_len * self.scale).round().max(1.0) as i32
    }
}

pub fn world_to_screen_px(
    viewport: Viewport,
    world_size_px: (f32, f32),
    world_pos: Vec2,
) -> (i32, i32) {
    let transform = frame_transform(viewport, world_size_px.0, world_size_px.1);
    (transform.screen_x(world_pos.x), transform.screen_y(world_pos.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_center_maps_to_viewport_center_when_aspect_matches() {
        let viewport = Viewport {
            width: 800,
            height: 600,
        };
        let (x, y) = world_to_screen_px(viewport, (400.0, 300.0), Vec2 { x: 200.0, y: 150.0 });
        assert_eq!(x, 400);
        assert_eq!(y, 300);
    }

    #[test]
    fn wide_viewport_letterboxes_horizontally() {
        let viewport = Viewport {
            width: 1000,
            height: 300,
        };
        let transform = frame_transform(viewport, 300.0, 300.0);
        assert_eq!(transform.scale, 1.0);
        assert_eq!(transform.offset_x, 350.0);
        assert_eq!(transform.offset_y, 0.0);
    }

    #[test]
    fn degenerate_world_size_does_not_produce_infinite_scale() {
        let viewport = Viewport {
            width: 640,
            height: 480,
        };
        let transform = frame_transform(viewport, 0.0, 0.0);
        assert!(transform.scale.is_finite());
        assert!(transform.scale > 0.0);
    }
}
