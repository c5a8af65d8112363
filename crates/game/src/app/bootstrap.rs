use std::env;
use std::path::PathBuf;
use std::time::Duration;

use engine::{resolve_scene_paths, ActorRuntime, FsAssetSource, RuntimeConfig};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::balloons;
use super::feed::CommandFeed;
use super::loop_runner::LoopConfig;
use super::presets::PresetScriptHost;
use super::AppError;

const CONFIG_ENV_VAR: &str = "SCANARIUM_CONFIG";
const SCENE_ENV_VAR: &str = "SCANARIUM_SCENE";
const RUN_SECONDS_ENV_VAR: &str = "SCANARIUM_RUN_SECONDS";

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) runtime: ActorRuntime,
    pub(crate) feed: CommandFeed,
    /// Present when the scene keeps a cloud layer.
    pub(crate) clouds: Option<SmallRng>,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Scanarium Startup ===");

    let config_path = env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    let mut config = match &config_path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(scene) = scene_override(env::var(SCENE_ENV_VAR).ok()) {
        config.scene = scene;
        config.validate()?;
    }
    let run_for = parse_run_seconds(env::var(RUN_SECONDS_ENV_VAR).ok().as_deref())?;

    let paths = resolve_scene_paths(&config.scene, &config.script_extension)?;
    info!(
        scene = config.scene.as_str(),
        config = %config_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "defaults".to_string()),
        scene_dir = %paths.scene_dir.display(),
        dynamic_scene_dir = %paths.dynamic_scene_dir.display(),
        "startup"
    );

    let assets = FsAssetSource::spawn(paths).map_err(AppError::AssetWorker)?;
    let mut runtime = ActorRuntime::new(&config, Box::new(assets), Box::new(PresetScriptHost));

    let clouds = if config.scene == balloons::SCENE_NAME {
        let mut rng = cloud_rng(config.rng_seed);
        balloons::install(&mut runtime, cloud_rng(config.rng_seed.map(|seed| seed ^ 0x5eed)));
        let spawned = balloons::spawn_clouds(&mut runtime, &mut rng, true);
        info!(spawned, "initial_clouds_requested");
        Some(rng)
    } else {
        None
    };

    let feed = CommandFeed::from_stdin().map_err(AppError::CommandFeed)?;

    Ok(AppWiring {
        loop_config: LoopConfig {
            run_for,
            ..LoopConfig::default()
        },
        runtime,
        feed,
        clouds,
    })
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

fn cloud_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}

fn scene_override(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_run_seconds(raw: Option<&str>) -> Result<Option<Duration>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let invalid = |reason: String| AppError::InvalidEnv {
        var: RUN_SECONDS_ENV_VAR,
        value: raw.to_string(),
        reason,
    };
    let seconds = raw
        .parse::<f64>()
        .map_err(|error| invalid(error.to_string()))?;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(invalid("expected a positive number of seconds".to_string()));
    }
    Ok(Some(Duration::from_secs_f64(seconds)))
}
