use std::fs;
use std::path::{Path, PathBuf};

use engine::{
    Building, CreatureSpecies, ModalLink, PixelRect, Rgba, TileCoord, TileGrid, TileGridError,
    TileKind, Vec2, WorldState,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::sim::{CreatureSeed, SimConfig, TriggerZoneSpec, ZoneAction, ZoneModalSpec};

const WALL_GLYPH: char = '#';

/// The JSON world file, as written on disk. Row strings keep the map
/// hand-editable; everything else is plain data.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorldFile {
    grid: Vec<String>,
    spawn: PointFile,
    #[serde(default)]
    walkable_rects: Vec<RectFile>,
    #[serde(default)]
    buildings: Vec<BuildingFile>,
    #[serde(default)]
    zones: Vec<ZoneFile>,
    #[serde(default)]
    background_image: Option<String>,
    #[serde(default = "default_true")]
    can_close_dialog: bool,
    #[serde(default)]
    creatures: Vec<CreatureFile>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct PointFile {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RectFile {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct BuildingFile {
    id: String,
    label: String,
    route: String,
    positions: Vec<[u32; 2]>,
    color: String,
    #[serde(default)]
    color_dark: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    auto_navigate: bool,
    #[serde(default)]
    banner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ZoneFile {
    id: String,
    rect: RectFile,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    modal: Option<ModalFile>,
    #[serde(default)]
    on_confirm: Option<ActionFile>,
    #[serde(default)]
    on_cancel: Option<ActionFile>,
    #[serde(default)]
    once: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ModalFile {
    #[serde(default)]
    title: Option<String>,
    body: String,
    #[serde(default)]
    confirm_text: Option<String>,
    #[serde(default)]
    cancel_text: Option<String>,
    #[serde(default)]
    actions: Vec<LinkFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct LinkFile {
    label: String,
    href: String,
    #[serde(default)]
    new_tab: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ActionFile {
    Navigate { route: String },
    Toast { message: String },
}

#[derive(Debug, Clone, Deserialize)]
struct CreatureFile {
    name: String,
    color: String,
    #[serde(default = "default_creature_half_size")]
    half_size_px: i32,
    speed_factor: f32,
    wander_min_px: f32,
    wander_max_px: f32,
    timer_min_s: f32,
    timer_max_s: f32,
    count: u32,
}

fn default_creature_half_size() -> i32 {
    7
}

#[derive(Debug, Error)]
pub(crate) enum WorldConfigError {
    #[error("failed to read world file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse world file {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("world grid has no rows")]
    EmptyGrid,
    #[error("world grid row {row} has {actual} cells, expected {expected}")]
    RaggedGrid {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("invalid color {value:?} on {owner}")]
    Color { owner: String, value: String },
    #[error(transparent)]
    Grid(#[from] TileGridError),
}

#[derive(Debug)]
pub(crate) struct WorldSetup {
    pub(crate) world: WorldState,
    pub(crate) sim: SimConfig,
}

pub(crate) fn load_world_setup(path: &Path) -> Result<WorldSetup, WorldConfigError> {
    let text = fs::read_to_string(path).map_err(|source| WorldConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = parse_world_file(&text, path)?;
    build_world_setup(file)
}

pub(crate) fn parse_world_file(text: &str, path: &Path) -> Result<WorldFile, WorldConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        WorldConfigError::Parse {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

/// The compiled-in fallback town, used when no world file is present.
const DEFAULT_WORLD_JSON: &str = r#########################"{
  "grid": [
    "########################",
    "#......................#",
    "#......................#",
    "#....###......###......#",
    "#....###......###......#",
    "#......................#",
    "#......................#",
    "#..........#...........#",
    "#..........#...........#",
    "#......................#",
    "#......................#",
    "#......................#",
    "#......................#",
    "#......................#",
    "#......................#",
    "########################"
  ],
  "spawn": { "x": 384.0, "y": 384.0 },
  "walkable_rects": [
    { "x1": 352.0, "y1": 224.0, "x2": 384.0, "y2": 288.0 }
  ],
  "buildings": [
    {
      "id": "town-hall",
      "label": "Town Hall",
      "route": "/hall",
      "positions": [[5, 3], [6, 3], [7, 3], [5, 4], [6, 4], [7, 4]],
      "color": "#a65a47",
      "color_dark": "#703d30",
      "image": "buildings/town-hall"
    },
    {
      "id": "market",
      "label": "Market",
      "route": "/market",
      "positions": [[14, 3], [15, 3], [16, 3], [14, 4], [15, 4], [16, 4]],
      "color": "#4a77a6",
      "auto_navigate": true
    }
  ],
  "zones": [
    {
      "id": "welcome",
      "rect": { "x1": 320.0, "y1": 320.0, "x2": 448.0, "y2": 448.0 },
      "modal": {
        "title": "Welcome",
        "body": "Walk with WASD. Press E near a building to enter it.",
        "confirm_text": "Got it"
      },
      "once": true
    },
    {
      "id": "notice-board",
      "rect": { "x1": 352.0, "y1": 192.0, "x2": 416.0, "y2": 256.0 },
      "message": "The notice board is empty today.",
      "on_confirm": { "kind": "toast", "message": "Checked the notice board" }
    }
  ],
  "creatures": [
    {
      "name": "cat",
      "color": "#8a6d4f",
      "half_size_px": 6,
      "speed_factor": 1.0,
      "wander_min_px": 24.0,
      "wander_max_px": 96.0,
      "timer_min_s": 1.0,
      "timer_max_s": 3.0,
      "count": 2
    },
    {
      "name": "goose",
      "color": "#d9d4c8",
      "half_size_px": 8,
      "speed_factor": 0.6,
      "wander_min_px": 48.0,
      "wander_max_px": 160.0,
      "timer_min_s": 2.0,
      "timer_max_s": 5.0,
      "count": 3
    }
  ]
}"#########################;

pub(crate) fn default_world_setup() -> WorldSetup {
    let file = parse_world_file(DEFAULT_WORLD_JSON, Path::new("<built-in>"))
        .expect("built-in world parses");
    build_world_setup(file).expect("built-in world is valid")
}

pub(crate) fn build_world_setup(file: WorldFile) -> Result<WorldSetup, WorldConfigError> {
    let grid = decode_grid(&file.grid)?;

    let mut buildings = Vec::with_capacity(file.buildings.len());
    for building in &file.buildings {
        if building.positions.is_empty() {
            warn!(building = %building.id, "building_has_no_cells");
        }
        buildings.push(Building {
            id: building.id.clone(),
            label: building.label.clone(),
            route: building.route.clone(),
            cells: building
                .positions
                .iter()
                .map(|[x, y]| TileCoord { x: *x, y: *y })
                .collect(),
            fill: parse_color(&building.color, &building.id)?,
            fill_dark: building
                .color_dark
                .as_deref()
                .map(|value| parse_color(value, &building.id))
                .transpose()?,
            image_key: building.image.clone(),
            auto_navigate: building.auto_navigate,
            banner: building.banner.clone(),
        });
    }

    let zones = file
        .zones
        .iter()
        .map(|zone| TriggerZoneSpec {
            id: zone.id.clone(),
            rect: rect_from_file(zone.rect),
            message: zone.message.clone(),
            modal: zone.modal.as_ref().map(|modal| ZoneModalSpec {
                title: modal.title.clone(),
                body: modal.body.clone(),
                confirm_text: modal.confirm_text.clone(),
                cancel_text: modal.cancel_text.clone(),
                links: modal
                    .actions
                    .iter()
                    .map(|link| ModalLink {
                        label: link.label.clone(),
                        href: link.href.clone(),
                        new_tab: link.new_tab,
                    })
                    .collect(),
            }),
            on_confirm: zone.on_confirm.as_ref().map(action_from_file),
            on_cancel: zone.on_cancel.as_ref().map(action_from_file),
            once: zone.once,
        })
        .collect();

    let mut creatures = Vec::with_capacity(file.creatures.len());
    for creature in &file.creatures {
        creatures.push(CreatureSeed {
            species: CreatureSpecies {
                name: creature.name.clone(),
                body: parse_color(&creature.color, &creature.name)?,
                half_size_px: creature.half_size_px,
                speed_factor: creature.speed_factor,
                wander_min_px: creature.wander_min_px.min(creature.wander_max_px),
                wander_max_px: creature.wander_max_px.max(creature.wander_min_px),
                timer_min_s: creature.timer_min_s.min(creature.timer_max_s),
                timer_max_s: creature.timer_max_s.max(creature.timer_min_s),
            },
            count: creature.count,
        });
    }

    let spawn = Vec2 {
        x: file.spawn.x,
        y: file.spawn.y,
    };
    let mut world = WorldState::new(grid, spawn);
    world.walkable_rects = file.walkable_rects.iter().copied().map(rect_from_file).collect();
    world.buildings = buildings;
    world.background_image_key = file.background_image.clone();

    info!(
        grid_w = world.grid.width(),
        grid_h = world.grid.height(),
        buildings = world.buildings.len(),
        zones = file.zones.len(),
        "world_config_loaded"
    );

    Ok(WorldSetup {
        world,
        sim: SimConfig {
            player_spawn: spawn,
            can_close_dialog: file.can_close_dialog,
            zones,
            creatures,
        },
    })
}

fn decode_grid(rows: &[String]) -> Result<TileGrid, WorldConfigError> {
    let first = rows.first().ok_or(WorldConfigError::EmptyGrid)?;
    let width = first.chars().count();
    if width == 0 {
        return Err(WorldConfigError::EmptyGrid);
    }

    let mut tiles = Vec::with_capacity(width * rows.len());
    for (row_index, row) in rows.iter().enumerate() {
        let actual = row.chars().count();
        if actual != width {
            return Err(WorldConfigError::RaggedGrid {
                row: row_index,
                expected: width,
                actual,
            });
        }
        for glyph in row.chars() {
            tiles.push(if glyph == WALL_GLYPH {
                TileKind::Wall
            } else {
                TileKind::Empty
            });
        }
    }

    Ok(TileGrid::new(width as u32, rows.len() as u32, tiles)?)
}

fn rect_from_file(rect: RectFile) -> PixelRect {
    PixelRect {
        x1: rect.x1,
        y1: rect.y1,
        x2: rect.x2,
        y2: rect.y2,
    }
}

fn action_from_file(action: &ActionFile) -> ZoneAction {
    match action {
        ActionFile::Navigate { route } => ZoneAction::Navigate {
            route: route.clone(),
        },
        ActionFile::Toast { message } => ZoneAction::Toast {
            message: message.clone(),
        },
    }
}

/// `#rrggbb` or `#rrggbbaa`.
fn parse_color(value: &str, owner: &str) -> Result<Rgba, WorldConfigError> {
    let color_error = || WorldConfigError::Color {
        owner: owner.to_string(),
        value: value.to_string(),
    };

    let hex = value.strip_prefix('#').ok_or_else(color_error)?;
    if hex.len() != 6 && hex.len() != 8 {
        return Err(color_error());
    }
    let mut channels = [0u8; 4];
    channels[3] = 255;
    for (index, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
        let text = std::str::from_utf8(chunk).map_err(|_| color_error())?;
        channels[index] = u8::from_str_radix(text, 16).map_err(|_| color_error())?;
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_world_builds() {
        let setup = default_world_setup();
        assert_eq!(setup.world.grid.width(), 24);
        assert_eq!(setup.world.grid.height(), 16);
        assert_eq!(setup.world.buildings.len(), 2);
        assert_eq!(setup.sim.zones.len(), 2);
        assert!(setup.sim.creatures.iter().map(|seed| seed.count).sum::<u32>() >= 5);
    }

    #[test]
    fn parse_error_names_the_offending_path() {
        let text = r###"{ "grid": ["##"], "spawn": { "x": "oops", "y": 1.0 } }"###;
        let error = parse_world_file(text, Path::new("bad.json")).unwrap_err();
        match error {
            WorldConfigError::Parse { json_path, .. } => {
                assert!(json_path.contains("spawn"), "path was {json_path}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ragged_grid_is_rejected_with_row_number() {
        let file = parse_world_file(
            r####"{ "grid": ["###", "##"], "spawn": { "x": 1.0, "y": 1.0 } }"####,
            Path::new("ragged.json"),
        )
        .expect("parses");
        match build_world_setup(file).unwrap_err() {
            WorldConfigError::RaggedGrid { row, expected, actual } => {
                assert_eq!(row, 1);
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_grid_is_rejected() {
        let file = parse_world_file(
            r#"{ "grid": [], "spawn": { "x": 1.0, "y": 1.0 } }"#,
            Path::new("empty.json"),
        )
        .expect("parses");
        assert!(matches!(
            build_world_setup(file),
            Err(WorldConfigError::EmptyGrid)
        ));
    }

    #[test]
    fn building_without_positions_is_kept_but_inert() {
        let file = parse_world_file(
            r##"{
                "grid": ["...", "...", "..."],
                "spawn": { "x": 48.0, "y": 48.0 },
                "buildings": [{
                    "id": "ghost", "label": "Ghost", "route": "/ghost",
                    "positions": [], "color": "#112233"
                }]
            }"##,
            Path::new("ghost.json"),
        )
        .expect("parses");
        let setup = build_world_setup(file).expect("builds");
        assert_eq!(setup.world.buildings.len(), 1);
        assert!(setup.world.buildings[0].bounding_box().is_none());
    }

    #[test]
    fn colors_parse_in_both_hex_widths() {
        assert_eq!(parse_color("#112233", "t").expect("rgb"), [17, 34, 51, 255]);
        assert_eq!(
            parse_color("#11223344", "t").expect("rgba"),
            [17, 34, 51, 68]
        );
        assert!(parse_color("112233", "t").is_err());
        assert!(parse_color("#1122", "t").is_err());
        assert!(parse_color("#11223g", "t").is_err());
    }

    #[test]
    fn creature_ranges_normalize_inverted_bounds() {
        let file = parse_world_file(
            r##"{
                "grid": ["...", "...", "..."],
                "spawn": { "x": 48.0, "y": 48.0 },
                "creatures": [{
                    "name": "crab", "color": "#aa3322", "speed_factor": 0.8,
                    "wander_min_px": 90.0, "wander_max_px": 30.0,
                    "timer_min_s": 4.0, "timer_max_s": 2.0, "count": 1
                }]
            }"##,
            Path::new("crab.json"),
        )
        .expect("parses");
        let setup = build_world_setup(file).expect("builds");
        let species = &setup.sim.creatures[0].species;
        assert!(species.wander_min_px <= species.wander_max_px);
        assert!(species.timer_min_s <= species.timer_max_s);
    }

    #[test]
    fn world_file_round_trips_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(DEFAULT_WORLD_JSON.as_bytes()).expect("write");
        let setup = load_world_setup(file.path()).expect("loads");
        assert_eq!(setup.world.buildings.len(), 2);
        assert!(setup.sim.can_close_dialog);
    }

    #[test]
    fn missing_file_reports_read_error() {
        let error = load_world_setup(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(error, WorldConfigError::Read { .. }));
    }
}
