use engine::{resolve_app_paths, AppPaths, LevelSource, LoopConfig, SimulationConfig, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{
    apply_handoff_override, load_simulation_config, ConfigError, CONFIG_FILE_NAME,
    HANDOFF_ENV_VAR,
};
use super::level::DemoLevel;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) paths: AppPaths,
    pub(crate) simulation: SimulationConfig,
    pub(crate) level: Box<dyn LevelSource>,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();

    let paths = resolve_app_paths()?;
    info!(root = %paths.root.display(), "startup");

    let simulation = load_simulation_config(&paths.base_assets_dir.join(CONFIG_FILE_NAME))?;
    let simulation =
        apply_handoff_override(simulation, std::env::var(HANDOFF_ENV_VAR).ok().as_deref())?;

    Ok(AppWiring {
        config: loop_config_for(&simulation),
        paths,
        simulation,
        level: Box::new(DemoLevel::default()),
    })
}

fn loop_config_for(simulation: &SimulationConfig) -> LoopConfig {
    let defaults = LoopConfig::default();
    LoopConfig {
        window_width: u32::try_from(simulation.viewport.w).unwrap_or(defaults.window_width),
        window_height: u32::try_from(simulation.viewport.h).unwrap_or(defaults.window_height),
        ..defaults
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
