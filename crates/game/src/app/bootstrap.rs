use std::path::PathBuf;

use engine::{resolve_app_paths, LoopConfig, Simulation, StartupError, WorldState};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{self, WorldConfigError, WorldSetup};
use super::sim::{self, LoggingShell};

const WORLD_FILE_ENV_VAR: &str = "TOWNLET_WORLD";
const WORLD_FILE_NAME: &str = "world.json";
const WINDOW_TITLE: &str = "Townlet";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) simulation: Box<dyn Simulation>,
    pub(crate) world: WorldState,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    WorldConfig(#[from] WorldConfigError),
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    info!("=== Townlet Startup ===");

    let setup = load_setup()?;
    let simulation = sim::build_simulation(setup.sim, Box::new(LoggingShell));
    let config = LoopConfig {
        window_title: WINDOW_TITLE.to_string(),
        ..LoopConfig::default()
    };

    Ok(AppWiring {
        config,
        simulation,
        world: setup.world,
    })
}

fn load_setup() -> Result<WorldSetup, BootstrapError> {
    if let Some(path) = world_file_override() {
        info!(path = %path.display(), "world_file_override");
        return Ok(config::load_world_setup(&path)?);
    }

    let default_path = resolve_app_paths()?.assets_dir.join(WORLD_FILE_NAME);
    if default_path.is_file() {
        info!(path = %default_path.display(), "world_file");
        return Ok(config::load_world_setup(&default_path)?);
    }

    info!("no world file found; using the built-in town");
    Ok(config::default_world_setup())
}

fn world_file_override() -> Option<PathBuf> {
    std::env::var_os(WORLD_FILE_ENV_VAR).map(PathBuf::from)
}
