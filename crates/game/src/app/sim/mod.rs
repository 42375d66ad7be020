use std::collections::HashSet;

use engine::{
    is_walkable, Agent, Creature, CreatureSpecies, Direction, InputSnapshot, ModalLink,
    ModalPayload, PixelRect, ProximityHint, SimCommand, Simulation, ToastBanner, Vec2,
    WorldState, TILE_SIZE_PX,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, info, warn};

const PLAYER_SPEED_PX_PER_SECOND: f32 = 150.0;
const COMPANION_SPEED_RATIO: f32 = 0.7;
const AMBIENT_SPEED_PX_PER_SECOND: f32 = 60.0;
const PLAYER_PROBE_HALF_EXTENT_PX: f32 = 10.0;
const COMPANION_PROBE_HALF_EXTENT_PX: f32 = 7.0;
const CREATURE_PROBE_HALF_EXTENT_PX: f32 = 6.0;
const FOLLOW_DISTANCE_PX: f32 = 40.0;
const FOLLOW_EPSILON_PX: f32 = 2.0;
const WANDER_ARRIVAL_EPSILON_PX: f32 = 2.0;
const WANDER_EARLY_ARRIVAL_CAP_S: f32 = 0.4;
const CREATURE_PLACEMENT_ATTEMPTS: u32 = 50;
const BUILDING_INTERACT_RADIUS_PX: f32 = 48.0;
const PROXIMITY_HINT_STAGE_TWO_S: f32 = 1.0;
const DEFAULT_CONFIRM_TEXT: &str = "OK";
const DEFAULT_CANCEL_TEXT: &str = "Close";
const INTERACT_HINT_TEXT: &str = "Press E to enter";

include!("types.rs");
include!("util.rs");
include!("systems.rs");
include!("sim_impl.rs");

pub(crate) fn build_simulation(
    config: SimConfig,
    shell: Box<dyn Shell>,
) -> Box<dyn Simulation> {
    let seed: u64 = rand::random();
    Box::new(TownSimulation::new(config, shell, seed))
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
