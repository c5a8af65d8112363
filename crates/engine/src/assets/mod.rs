mod fs;
mod manual;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::asset_keys::AssetKeyError;
use crate::catalog::CatalogVersion;
use crate::selector::ActorSpec;

pub use fs::FsAssetSource;
pub use manual::ManualAssetSource;

/// Decoded flavor image, addressed by the rendering layer as `<kind>-<flavor>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub key: String,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    pub fn for_spec(spec: &ActorSpec, width: u32, height: u32) -> Self {
        Self {
            key: texture_key(&spec.kind, &spec.flavor),
            width,
            height,
        }
    }
}

pub fn texture_key(kind: &str, flavor: &str) -> String {
    format!("{kind}-{flavor}")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetRequest {
    Catalog(CatalogVersion),
    Script { kind: String },
    Image(ActorSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPayload {
    Text(String),
    Texture(Texture),
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("asset source returned {actual} for {request:?}")]
    UnexpectedPayload {
        request: AssetRequest,
        actual: &'static str,
    },
    #[error("invalid asset key {key:?}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: AssetKeyError,
    },
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug)]
pub struct AssetCompletion {
    pub request: AssetRequest,
    pub result: Result<AssetPayload, AssetError>,
}

impl AssetCompletion {
    pub fn into_text(self) -> (AssetRequest, Result<String, AssetError>) {
        let request = self.request;
        let result = match self.result {
            Ok(AssetPayload::Text(text)) => Ok(text),
            Ok(AssetPayload::Texture(_)) => Err(AssetError::UnexpectedPayload {
                request: request.clone(),
                actual: "texture",
            }),
            Err(error) => Err(error),
        };
        (request, result)
    }

    pub fn into_texture(self) -> (AssetRequest, Result<Texture, AssetError>) {
        let request = self.request;
        let result = match self.result {
            Ok(AssetPayload::Texture(texture)) => Ok(texture),
            Ok(AssetPayload::Text(_)) => Err(AssetError::UnexpectedPayload {
                request: request.clone(),
                actual: "text",
            }),
            Err(error) => Err(error),
        };
        (request, result)
    }
}

/// Fire-and-forget loader. Completions are collected later on the frame thread.
pub trait AssetSource {
    fn request(&mut self, request: AssetRequest);
    fn poll_completed(&mut self) -> Vec<AssetCompletion>;
}
