use engine::{
    Level, LevelError, LevelSource, MapObject, ObjectGroup, TileLayer, TileMap, Tileset,
};

pub(crate) const TILESET_IMAGE: &str = "base/tiles.png";
pub(crate) const PLAYER_SPRITE: &str = "base/player.png";

const TILE_SIZE: u32 = 64;
const GRASS_LIGHT: u32 = 1;
const GRASS_DARK: u32 = 2;
const WALL: u32 = 3;
const FLOWER: u32 = 5;
const ROCK: u32 = 6;

#[derive(Debug, Clone)]
pub(crate) struct DemoLevel {
    width: u32,
    height: u32,
}

impl DemoLevel {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for DemoLevel {
    fn default() -> Self {
        Self::new(64, 48)
    }
}

impl LevelSource for DemoLevel {
    fn load_level(&mut self) -> Result<Level, LevelError> {
        if self.width < 3 || self.height < 3 {
            return Err(LevelError::Unavailable {
                name: "demo".to_string(),
                reason: format!("{}x{} is too small for a bordered map", self.width, self.height),
            });
        }

        let map = TileMap::new(
            self.width,
            self.height,
            TILE_SIZE,
            TILE_SIZE,
            vec![
                TileLayer::new("ground", 0, self.ground_tiles()),
                TileLayer::new("decoration", 0, self.decoration_tiles()),
            ],
            vec![Tileset {
                name: "terrain".to_string(),
                image_source: TILESET_IMAGE.to_string(),
                tile_width: TILE_SIZE,
                tile_height: TILE_SIZE,
                columns: None,
            }],
            vec![ObjectGroup {
                name: "spawns".to_string(),
                objects: vec![MapObject {
                    kind: "player".to_string(),
                    x: (TILE_SIZE * 3) as f32,
                    y: (TILE_SIZE * 3) as f32,
                }],
            }],
        )?;

        Ok(Level {
            map,
            player_sprite: Some(PLAYER_SPRITE.to_string()),
        })
    }
}

impl DemoLevel {
    fn is_border(&self, x: u32, y: u32) -> bool {
        x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height
    }

    fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| (x, y)))
    }

    fn ground_tiles(&self) -> Vec<u32> {
        self.cells()
            .map(|(x, y)| {
                if self.is_border(x, y) {
                    WALL
                } else if (x + y) % 2 == 0 {
                    GRASS_LIGHT
                } else {
                    GRASS_DARK
                }
            })
            .collect()
    }

    fn decoration_tiles(&self) -> Vec<u32> {
        self.cells()
            .map(|(x, y)| {
                if self.is_border(x, y) {
                    return 0;
                }
                // Fixed hash so the layout is identical on every run.
                match (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)) % 23 {
                    0 => FLOWER,
                    1 => ROCK,
                    _ => 0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use engine::{Size, Vector};

    use super::*;

    #[test]
    fn demo_level_has_border_and_checkerboard() {
        let level = DemoLevel::new(8, 6).load_level().expect("level");
        let map = &level.map;

        assert_eq!(map.pixel_size(), Size { w: 512, h: 384 });
        assert_eq!(map.tile_at(0, 0, 0), Some(WALL));
        assert_eq!(map.tile_at(0, 7, 5), Some(WALL));
        assert_eq!(map.tile_at(0, 1, 1), Some(GRASS_LIGHT));
        assert_eq!(map.tile_at(0, 2, 1), Some(GRASS_DARK));
        assert_eq!(level.player_sprite.as_deref(), Some(PLAYER_SPRITE));
    }

    #[test]
    fn decoration_never_covers_the_border() {
        let level = DemoLevel::default().load_level().expect("level");
        let map = &level.map;
        for x in 0..map.width() {
            assert_eq!(map.tile_at(1, x, 0), Some(0));
            assert_eq!(map.tile_at(1, x, map.height() - 1), Some(0));
        }
        let decorated = map.layers()[1].tiles().iter().filter(|id| **id != 0).count();
        assert!(decorated > 0);
    }

    #[test]
    fn spawn_object_marks_the_player_start() {
        let level = DemoLevel::default().load_level().expect("level");
        assert_eq!(
            level.map.find_object("player"),
            Some(Vector { x: 192, y: 192 })
        );
    }

    #[test]
    fn tiny_maps_are_rejected() {
        let err = DemoLevel::new(2, 10).load_level().expect_err("too small");
        assert!(matches!(err, LevelError::Unavailable { .. }));
    }
}
