use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::info;

use super::bridge::{EngineRequest, EngineResponse, Image, ImageHandle};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} is too large ({width}x{height})")]
    TooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    #[error("image handle space exhausted")]
    HandlesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImagePixels {
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug)]
pub struct ImageStore {
    asset_root: PathBuf,
    next_handle: u32,
    images: HashMap<ImageHandle, ImagePixels>,
}

impl ImageStore {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            next_handle: 0,
            images: HashMap::new(),
        }
    }

    pub fn load(&mut self, path: &str) -> Result<Image, AssetError> {
        let full_path = self.asset_root.join(path);
        let decoded = ImageReader::open(&full_path)
            .map_err(|source| AssetError::Open {
                path: full_path.clone(),
                source,
            })?
            .decode()
            .map_err(|source| AssetError::Decode {
                path: full_path.clone(),
                source,
            })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let (Ok(width_i32), Ok(height_i32)) = (i32::try_from(width), i32::try_from(height)) else {
            return Err(AssetError::TooLarge {
                path: full_path,
                width,
                height,
            });
        };

        let handle = ImageHandle(self.next_handle);
        self.next_handle = self
            .next_handle
            .checked_add(1)
            .ok_or(AssetError::HandlesExhausted)?;
        self.images.insert(
            handle,
            ImagePixels {
                width,
                height,
                rgba: decoded.into_raw(),
            },
        );
        info!(path = %path, handle = handle.0, width, height, "image_loaded");

        Ok(Image {
            handle,
            width: width_i32,
            height: height_i32,
        })
    }

    pub fn get(&self, handle: ImageHandle) -> Option<&ImagePixels> {
        self.images.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn handle_request(&mut self, request: &EngineRequest) -> EngineResponse {
        match request {
            EngineRequest::LoadImage { path } => {
                EngineResponse::LoadImage(self.load(path).map_err(|err| err.to_string()))
            }
        }
    }
}
