use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod asset_keys;
pub mod assets;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod factory;
pub mod geometry;
pub mod loader;
pub mod population;
pub mod runtime;
pub mod scheduler;
pub mod selector;

pub use asset_keys::AssetKeyError;
pub use assets::{
    texture_key, AssetCompletion, AssetError, AssetPayload, AssetRequest, AssetSource,
    FsAssetSource, ManualAssetSource, Texture,
};
pub use catalog::{
    CatalogError, CatalogSnapshot, CatalogUpdate, CatalogVersion, ConfigCatalog,
    FULL_CATALOG_FILE, LATEST_CATALOG_FILE,
};
pub use commands::{
    CommandEnvelope, CommandKind, CommandOptions, CommandOutcome, CommandPayload,
    CommandReplayGuard, CommandSpawn, Navigation, RecentCommandWindow, Toggle,
};
pub use config::{ConfigError, RuntimeConfig};
pub use factory::{
    Actor, ActorConstructor, ActorFactory, ActorId, ActorStatus, ActorUpdateError, CreateError,
    FrameTime, KindRegistry, LiveActor, OnCreated, SpawnContext, SpawnParameters,
};
pub use geometry::{StageState, Vec2, Viewport};
pub use loader::{ImageState, ResourceLoader, ScriptState};
pub use population::{
    ActorPopulation, DestroyCallback, DestroyContext, DestroySubscription, PopulationStats,
    RemovalReason, ReplayQueue, SpawnOrder,
};
pub use runtime::{ActorRuntime, ScriptError, ScriptHost};
pub use scheduler::{ScheduledWork, SpawnScheduler};
pub use selector::{pick_from, pick_next, ActorSpec, CandidatePools, TriedSet, SAMPLE_FLAVOR};

pub const ROOT_ENV_VAR: &str = "SCANARIUM_ROOT";

/// Where one scene's static definitions and dynamic content live.
#[derive(Debug, Clone)]
pub struct ScenePaths {
    /// Kind definitions: `actors/<kind>/<kind>.<ext>`.
    pub scene_dir: PathBuf,
    /// Catalogs and scanned flavor images.
    pub dynamic_scene_dir: PathBuf,
    pub script_extension: String,
}

impl ScenePaths {
    pub fn for_scene(root: &Path, scene: &str, script_extension: &str) -> Self {
        Self {
            scene_dir: root.join("scenes").join(scene),
            dynamic_scene_dir: root.join("dynamic").join("scenes").join(scene),
            script_extension: script_extension.to_string(),
        }
    }

    pub fn script_path(&self, kind: &str) -> PathBuf {
        self.scene_dir
            .join("actors")
            .join(kind)
            .join(format!("{kind}.{}", self.script_extension))
    }

    pub fn image_path(&self, kind: &str, flavor: &str) -> PathBuf {
        self.dynamic_scene_dir
            .join("actors")
            .join(kind)
            .join(format!("{flavor}.png"))
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "SCANARIUM_ROOT is set but does not point to a valid content root: {path}\n\
A valid root contains a scenes/ directory."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect content root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing scenes/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/scanarium\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
    #[error("scene {scene:?} does not exist under {root}")]
    UnknownScene { root: PathBuf, scene: String },
}

/// Resolves the content root and checks that `scene` exists in it.
pub fn resolve_scene_paths(scene: &str, script_extension: &str) -> Result<ScenePaths, StartupError> {
    let root = resolve_root()?;
    let paths = ScenePaths::for_scene(&root, scene, script_extension);
    if !paths.scene_dir.is_dir() {
        return Err(StartupError::UnknownScene {
            root,
            scene: scene.to_string(),
        });
    }
    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_content_root(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_content_root(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_content_root(path: &Path) -> bool {
    path.join("scenes").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
