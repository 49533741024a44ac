use thiserror::Error;

use super::world::{Size, Vector};

#[derive(Debug, Clone, PartialEq)]
pub struct TileMap {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    layers: Vec<TileLayer>,
    tilesets: Vec<Tileset>,
    object_groups: Vec<ObjectGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayer {
    pub name: String,
    pub tileset: usize,
    tiles: Vec<u32>,
}

impl TileLayer {
    pub fn new(name: impl Into<String>, tileset: usize, tiles: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            tileset,
            tiles,
        }
    }

    pub fn tiles(&self) -> &[u32] {
        &self.tiles
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tileset {
    pub name: String,
    pub image_source: String,
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGroup {
    pub name: String,
    pub objects: Vec<MapObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    pub kind: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileMapError {
    #[error("layer '{layer}' tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("layer '{layer}' references missing tileset {tileset}")]
    MissingTileset { layer: String, tileset: usize },
    #[error("tile size must be non-zero (got {width}x{height})")]
    ZeroTileSize { width: u32, height: u32 },
    #[error("tileset '{name}' has a zero tile dimension")]
    ZeroTilesetTileSize { name: String },
}

impl TileMap {
    pub fn new(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        layers: Vec<TileLayer>,
        tilesets: Vec<Tileset>,
        object_groups: Vec<ObjectGroup>,
    ) -> Result<Self, TileMapError> {
        if tile_width == 0 || tile_height == 0 {
            return Err(TileMapError::ZeroTileSize {
                width: tile_width,
                height: tile_height,
            });
        }
        if let Some(tileset) = tilesets
            .iter()
            .find(|tileset| tileset.tile_width == 0 || tileset.tile_height == 0)
        {
            return Err(TileMapError::ZeroTilesetTileSize {
                name: tileset.name.clone(),
            });
        }

        let expected = width as usize * height as usize;
        for layer in &layers {
            if layer.tiles.len() != expected {
                return Err(TileMapError::TileCountMismatch {
                    layer: layer.name.clone(),
                    expected,
                    actual: layer.tiles.len(),
                });
            }
            if layer.tileset >= tilesets.len() {
                return Err(TileMapError::MissingTileset {
                    layer: layer.name.clone(),
                    tileset: layer.tileset,
                });
            }
        }

        Ok(Self {
            width,
            height,
            tile_width,
            tile_height,
            layers,
            tilesets,
            object_groups,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn layers(&self) -> &[TileLayer] {
        &self.layers
    }

    pub fn tilesets(&self) -> &[Tileset] {
        &self.tilesets
    }

    pub fn tileset_for(&self, layer: &TileLayer) -> Option<&Tileset> {
        self.tilesets.get(layer.tileset)
    }

    pub fn pixel_size(&self) -> Size {
        Size {
            w: (self.width as i64 * self.tile_width as i64).min(i32::MAX as i64) as i32,
            h: (self.height as i64 * self.tile_height as i64).min(i32::MAX as i64) as i32,
        }
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, layer: usize, x: u32, y: u32) -> Option<u32> {
        let index = self.index_of(x, y)?;
        self.layers.get(layer)?.tiles.get(index).copied()
    }

    pub fn tile_at_layer(&self, layer: &TileLayer, x: u32, y: u32) -> Option<u32> {
        let index = self.index_of(x, y)?;
        layer.tiles.get(index).copied()
    }

    pub fn find_object(&self, kind: &str) -> Option<Vector> {
        self.object_groups
            .iter()
            .flat_map(|group| group.objects.iter())
            .find(|object| object.kind == kind)
            .map(|object| Vector {
                x: object.x.round() as i32,
                y: object.y.round() as i32,
            })
    }
}
