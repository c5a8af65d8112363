use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::asset_keys::validate_asset_key;
use crate::ScenePaths;

use super::{AssetCompletion, AssetError, AssetPayload, AssetRequest, AssetSource, Texture};

/// Loads scene assets from disk on a dedicated worker thread.
pub struct FsAssetSource {
    requests: Option<Sender<AssetRequest>>,
    completions: Receiver<AssetCompletion>,
    worker: Option<JoinHandle<()>>,
}

impl FsAssetSource {
    pub fn spawn(paths: ScenePaths) -> io::Result<Self> {
        let (request_tx, request_rx) = unbounded::<AssetRequest>();
        let (completion_tx, completion_rx) = unbounded::<AssetCompletion>();
        let worker = thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || run_worker(&paths, request_rx, completion_tx))?;
        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            worker: Some(worker),
        })
    }

    /// Blocks until one completion arrives or the timeout passes.
    pub fn wait_completed(&self, timeout: Duration) -> Option<AssetCompletion> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl AssetSource for FsAssetSource {
    fn request(&mut self, request: AssetRequest) {
        let Some(sender) = &self.requests else {
            return;
        };
        if let Err(error) = sender.send(request) {
            warn!(request = ?error.0, "asset_worker_disconnected");
        }
    }

    fn poll_completed(&mut self) -> Vec<AssetCompletion> {
        self.completions.try_iter().collect()
    }
}

impl Drop for FsAssetSource {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("asset_worker_panicked");
            }
        }
    }
}

fn run_worker(
    paths: &ScenePaths,
    requests: Receiver<AssetRequest>,
    completions: Sender<AssetCompletion>,
) {
    for request in requests.iter() {
        let result = load(paths, &request);
        debug!(request = ?request, ok = result.is_ok(), "asset_loaded");
        if completions.send(AssetCompletion { request, result }).is_err() {
            break;
        }
    }
}

fn load(paths: &ScenePaths, request: &AssetRequest) -> Result<AssetPayload, AssetError> {
    match request {
        AssetRequest::Catalog(version) => {
            read_text(&paths.dynamic_scene_dir.join(version.file_name())).map(AssetPayload::Text)
        }
        AssetRequest::Script { kind } => {
            checked_key(kind)?;
            read_text(&paths.script_path(kind)).map(AssetPayload::Text)
        }
        AssetRequest::Image(spec) => {
            checked_key(&spec.kind)?;
            checked_key(&spec.flavor)?;
            let path = paths.image_path(&spec.kind, &spec.flavor);
            let (width, height) = image::image_dimensions(&path).map_err(|source| match source {
                image::ImageError::IoError(source) => AssetError::Read {
                    path: path.clone(),
                    source,
                },
                source => AssetError::Decode {
                    path: path.clone(),
                    source,
                },
            })?;
            Ok(AssetPayload::Texture(Texture::for_spec(spec, width, height)))
        }
    }
}

fn checked_key(key: &str) -> Result<(), AssetError> {
    validate_asset_key(key).map_err(|source| AssetError::InvalidKey {
        key: key.to_string(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String, AssetError> {
    fs::read_to_string(path).map_err(|source| AssetError::Read {
        path: PathBuf::from(path),
        source,
    })
}
