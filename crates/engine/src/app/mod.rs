mod collision;
mod diagnostics;
mod input;
mod loop_runner;
mod rendering;
mod world;

pub use collision::is_walkable;
pub use diagnostics::{DiagnosticsHandle, DiagnosticsSnapshot};
pub use input::InputAction;
pub use loop_runner::{run_app, run_app_with_diagnostics, AppError, LoopConfig};
pub use rendering::{world_to_screen_px, Renderer, Viewport};
pub use world::{
    Agent, Building, Creature, CreatureSpecies, Direction, InputSnapshot, ModalLink,
    ModalPayload, PixelRect, ProximityHint, Rgba, SimCommand, Simulation, TileCoord, TileGrid,
    TileGridError, TileKind, TileRect, ToastBanner, Vec2, WorldState, TILE_SIZE_PX,
};
