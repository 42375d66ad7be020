use thiserror::Error;

/// Side length of one grid cell in world pixels. The grid resolution is
/// fixed for the lifetime of the process; positions are continuous pixels.
pub const TILE_SIZE_PX: f32 = 32.0;

pub type Rgba = [u8; 4];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn unit_vector(self) -> Vec2 {
        match self {
            Direction::Up => Vec2 { x: 0.0, y: -1.0 },
            Direction::Down => Vec2 { x: 0.0, y: 1.0 },
            Direction::Left => Vec2 { x: -1.0, y: 0.0 },
            Direction::Right => Vec2 { x: 1.0, y: 0.0 },
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileKind {
    #[default]
    Empty,
    Wall,
}

impl TileKind {
    pub fn is_wall(self) -> bool {
        matches!(self, TileKind::Wall)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<TileKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileGridError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tiles: Vec<TileKind>) -> Result<Self, TileGridError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TileGridError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width_px(&self) -> f32 {
        self.width as f32 * TILE_SIZE_PX
    }

    pub fn height_px(&self) -> f32 {
        self.height as f32 * TILE_SIZE_PX
    }

    pub fn tile_at(&self, x: u32, y: u32) -> Option<TileKind> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Resolves a continuous pixel position to its bounding cell by
    /// floor-division. Out-of-grid positions resolve to `None`.
    pub fn cell_at_point(&self, point: Vec2) -> Option<TileCoord> {
        let tx = (point.x / TILE_SIZE_PX).floor();
        let ty = (point.y / TILE_SIZE_PX).floor();
        if tx < 0.0 || ty < 0.0 || tx >= self.width as f32 || ty >= self.height as f32 {
            return None;
        }
        Some(TileCoord {
            x: tx as u32,
            y: ty as u32,
        })
    }

    pub fn center_px(&self) -> Vec2 {
        Vec2 {
            x: self.width_px() / 2.0,
            y: self.height_px() / 2.0,
        }
    }
}

/// Axis-aligned rectangle in pixel space. Corners may arrive in either
/// order; all containment goes through `normalized`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PixelRect {
    pub fn normalized(self) -> PixelRect {
        PixelRect {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn contains_point(self, point: Vec2) -> bool {
        let rect = self.normalized();
        point.x >= rect.x1 && point.x <= rect.x2 && point.y >= rect.y1 && point.y <= rect.y2
    }

    pub fn width(self) -> f32 {
        let rect = self.normalized();
        rect.x2 - rect.x1
    }

    pub fn height(self) -> f32 {
        let rect = self.normalized();
        rect.y2 - rect.y1
    }

    /// Distance from a point to the rectangle edge, zero inside.
    pub fn distance_to_point(self, point: Vec2) -> f32 {
        let rect = self.normalized();
        let dx = (rect.x1 - point.x).max(0.0).max(point.x - rect.x2);
        let dy = (rect.y1 - point.y).max(0.0).max(point.y - rect.y2);
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

/// Inclusive cell-space envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl TileRect {
    pub fn contains_cell(self, cell: TileCoord) -> bool {
        cell.x >= self.x_min && cell.x <= self.x_max && cell.y >= self.y_min && cell.y <= self.y_max
    }

    pub fn to_pixel_rect(self) -> PixelRect {
        PixelRect {
            x1: self.x_min as f32 * TILE_SIZE_PX,
            y1: self.y_min as f32 * TILE_SIZE_PX,
            x2: (self.x_max + 1) as f32 * TILE_SIZE_PX,
            y2: (self.y_max + 1) as f32 * TILE_SIZE_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub id: String,
    pub label: String,
    pub route: String,
    pub cells: Vec<TileCoord>,
    pub fill: Rgba,
    pub fill_dark: Option<Rgba>,
    pub image_key: Option<String>,
    pub auto_navigate: bool,
    pub banner: Option<String>,
}

impl Building {
    /// Min/max envelope of the occupied cells. A building with no cells has
    /// no envelope: it never renders and is never near.
    pub fn bounding_box(&self) -> Option<TileRect> {
        let first = self.cells.first()?;
        let mut envelope = TileRect {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        for cell in &self.cells[1..] {
            envelope.x_min = envelope.x_min.min(cell.x);
            envelope.y_min = envelope.y_min.min(cell.y);
            envelope.x_max = envelope.x_max.max(cell.x);
            envelope.y_max = envelope.y_max.max(cell.y);
        }
        Some(envelope)
    }

    pub fn footprint_px(&self) -> Option<PixelRect> {
        self.bounding_box().map(TileRect::to_pixel_rect)
    }

    pub fn display_label(&self) -> &str {
        self.banner.as_deref().unwrap_or(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureSpecies {
    pub name: String,
    pub body: Rgba,
    pub half_size_px: i32,
    pub speed_factor: f32,
    pub wander_min_px: f32,
    pub wander_max_px: f32,
    pub timer_min_s: f32,
    pub timer_max_s: f32,
}

/// One moving body. Player, companion, and creatures all share this record;
/// the simulation owns every instance exclusively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Agent {
    pub position: Vec2,
    pub direction: Direction,
    pub frame: u32,
    pub is_moving: bool,
    pub target: Option<Vec2>,
    pub move_timer: f32,
}

impl Agent {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            direction: Direction::Down,
            frame: 0,
            is_moving: false,
            target: None,
            move_timer: 0.0,
        }
    }

    pub fn advance_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Creature {
    pub agent: Agent,
    pub species: CreatureSpecies,
}

/// The one mounted world: static geometry plus the live agents. Constructed
/// once from configuration; only the frame loop's simulation mutates it.
#[derive(Debug, Clone)]
pub struct WorldState {
    pub grid: TileGrid,
    pub walkable_rects: Vec<PixelRect>,
    pub buildings: Vec<Building>,
    pub background_image_key: Option<String>,
    pub player: Agent,
    pub companion: Agent,
    pub creatures: Vec<Creature>,
}

impl WorldState {
    pub fn new(grid: TileGrid, player_spawn: Vec2) -> Self {
        Self {
            grid,
            walkable_rects: Vec::new(),
            buildings: Vec::new(),
            background_image_key: None,
            player: Agent::at(player_spawn),
            companion: Agent::at(player_spawn),
            creatures: Vec::new(),
        }
    }

    pub fn cell_in_building(&self, cell: TileCoord) -> bool {
        self.buildings
            .iter()
            .filter_map(Building::bounding_box)
            .any(|envelope| envelope.contains_cell(cell))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    quit_requested: bool,
    direction: Option<Direction>,
    interact_pressed: bool,
    confirm_pressed: bool,
    cancel_pressed: bool,
    window_width: u32,
    window_height: u32,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        quit_requested: bool,
        direction: Option<Direction>,
        interact_pressed: bool,
        confirm_pressed: bool,
        cancel_pressed: bool,
        window_width: u32,
        window_height: u32,
    ) -> Self {
        Self {
            quit_requested,
            direction,
            interact_pressed,
            confirm_pressed,
            cancel_pressed,
            window_width,
            window_height,
        }
    }

    pub fn with_quit_requested(mut self, quit_requested: bool) -> Self {
        self.quit_requested = quit_requested;
        self
    }

    pub fn with_direction(mut self, direction: Option<Direction>) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_interact_pressed(mut self, interact_pressed: bool) -> Self {
        self.interact_pressed = interact_pressed;
        self
    }

    pub fn with_confirm_pressed(mut self, confirm_pressed: bool) -> Self {
        self.confirm_pressed = confirm_pressed;
        self
    }

    pub fn with_cancel_pressed(mut self, cancel_pressed: bool) -> Self {
        self.cancel_pressed = cancel_pressed;
        self
    }

    pub fn with_window_size(mut self, window_size: (u32, u32)) -> Self {
        self.window_width = window_size.0;
        self.window_height = window_size.1;
        self
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn interact_pressed(&self) -> bool {
        self.interact_pressed
    }

    pub fn confirm_pressed(&self) -> bool {
        self.confirm_pressed
    }

    pub fn cancel_pressed(&self) -> bool {
        self.cancel_pressed
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommand {
    None,
    /// A route transition is imminent; presenting this frame is pointless.
    SkipRender,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalLink {
    pub label: String,
    pub href: String,
    pub new_tab: bool,
}

/// Hand-off payload for the dialog chrome. The simulation owns the open/close
/// state machine; the renderer only draws what it is handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalPayload {
    pub title: Option<String>,
    pub body: String,
    pub confirm_text: String,
    pub cancel_text: Option<String>,
    pub links: Vec<ModalLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastBanner {
    pub headline: String,
    pub detail: Option<String>,
    pub accent: Rgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityHint {
    pub building_id: String,
    pub label: String,
    pub fill: Rgba,
}

pub trait Simulation {
    fn load(&mut self, world: &mut WorldState);
    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut WorldState,
    ) -> SimCommand;
    fn unload(&mut self, world: &mut WorldState);
    fn modal_panel(&self) -> Option<ModalPayload> {
        None
    }
    fn toast_banner(&self) -> Option<ToastBanner> {
        None
    }
    fn diagnostics_lines(&self, _world: &WorldState) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rejects_wrong_tile_count() {
        let result = TileGrid::new(3, 2, vec![TileKind::Empty; 5]);
        assert_eq!(
            result,
            Err(TileGridError::TileCountMismatch {
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn cell_at_point_uses_floor_division_on_boundaries() {
        let grid = TileGrid::new(4, 4, vec![TileKind::Empty; 16]).expect("grid");
        let on_boundary = Vec2 {
            x: TILE_SIZE_PX,
            y: TILE_SIZE_PX,
        };
        assert_eq!(grid.cell_at_point(on_boundary), Some(TileCoord { x: 1, y: 1 }));
    }

    #[test]
    fn cell_at_point_fails_outside_the_grid() {
        let grid = TileGrid::new(2, 2, vec![TileKind::Empty; 4]).expect("grid");
        assert_eq!(grid.cell_at_point(Vec2 { x: -0.1, y: 0.0 }), None);
        assert_eq!(
            grid.cell_at_point(Vec2 {
                x: 2.0 * TILE_SIZE_PX,
                y: 0.0
            }),
            None
        );
    }

    #[test]
    fn rect_containment_is_corner_order_independent() {
        let forward = PixelRect {
            x1: 50.0,
            y1: 10.0,
            x2: 100.0,
            y2: 40.0,
        };
        let reversed = PixelRect {
            x1: 100.0,
            y1: 40.0,
            x2: 50.0,
            y2: 10.0,
        };
        let inside = Vec2 { x: 75.0, y: 25.0 };
        let outside = Vec2 { x: 49.0, y: 25.0 };

        assert!(forward.contains_point(inside));
        assert!(reversed.contains_point(inside));
        assert!(!forward.contains_point(outside));
        assert!(!reversed.contains_point(outside));
    }

    #[test]
    fn zero_area_rect_contains_only_its_own_point() {
        let rect = PixelRect {
            x1: 10.0,
            y1: 10.0,
            x2: 10.0,
            y2: 10.0,
        };
        assert!(rect.contains_point(Vec2 { x: 10.0, y: 10.0 }));
        assert!(!rect.contains_point(Vec2 { x: 10.5, y: 10.0 }));
    }

    #[test]
    fn building_envelope_spans_non_rectangular_footprints() {
        let building = Building {
            id: "hall".to_string(),
            label: "Hall".to_string(),
            route: "/hall".to_string(),
            cells: vec![
                TileCoord { x: 2, y: 2 },
                TileCoord { x: 2, y: 3 },
                TileCoord { x: 5, y: 2 },
            ],
            fill: [200, 120, 80, 255],
            fill_dark: None,
            image_key: None,
            auto_navigate: false,
            banner: None,
        };
        assert_eq!(
            building.bounding_box(),
            Some(TileRect {
                x_min: 2,
                y_min: 2,
                x_max: 5,
                y_max: 3
            })
        );
    }

    #[test]
    fn building_without_cells_has_no_envelope() {
        let building = Building {
            id: "ghost".to_string(),
            label: "Ghost".to_string(),
            route: "/ghost".to_string(),
            cells: Vec::new(),
            fill: [0, 0, 0, 255],
            fill_dark: None,
            image_key: None,
            auto_navigate: false,
            banner: None,
        };
        assert_eq!(building.bounding_box(), None);
        assert_eq!(building.footprint_px(), None);
    }

    #[test]
    fn direction_unit_vectors_are_cardinal() {
        for direction in Direction::ALL {
            let vector = direction.unit_vector();
            assert_eq!(vector.x.abs() + vector.y.abs(), 1.0);
        }
    }

    #[test]
    fn rect_distance_is_zero_inside_and_euclidean_outside() {
        let rect = PixelRect {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        };
        assert_eq!(rect.distance_to_point(Vec2 { x: 5.0, y: 5.0 }), 0.0);
        let corner = rect.distance_to_point(Vec2 { x: 13.0, y: 14.0 });
        assert!((corner - 5.0).abs() < 0.0001);
    }
}
