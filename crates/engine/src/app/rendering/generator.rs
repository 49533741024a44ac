use crate::app::bridge::ImageCatalog;
use crate::app::camera::Camera;
use crate::app::tilemap::{TileLayer, TileMap};
use crate::app::world::{Entity, GameState, Size, Vector};

use super::commands::{RenderCommand, RenderCommandList, BACKGROUND_COLOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleTiles {
    pub x_start: u32,
    pub x_end: u32,
    pub y_start: u32,
    pub y_end: u32,
}

impl VisibleTiles {
    pub fn cell_count(&self) -> usize {
        (self.x_end - self.x_start) as usize * (self.y_end - self.y_start) as usize
    }
}

struct TileCandidate {
    command: RenderCommand,
    distance_sq: i64,
}

/// Paint order is background, tile layers in declaration order, then entities
/// in slot order. When the list would overflow `capacity` the background is
/// always kept, entities are kept next (lowest slots first), and the tiles
/// farthest from the viewport centre are dropped first.
pub fn generate(
    state: &GameState,
    map: &TileMap,
    images: &ImageCatalog,
    capacity: usize,
) -> RenderCommandList {
    let camera = &state.camera;
    let background = RenderCommand::Rect {
        pos: Vector::default(),
        size: camera.size(),
        color: BACKGROUND_COLOR,
    };
    let tiles = tile_candidates(camera, map, images);
    let entities: Vec<RenderCommand> = state
        .entities
        .iter()
        .map(|(_, entity)| entity_command(camera, entity, images))
        .collect();

    if capacity == 0 {
        return RenderCommandList::from_parts(Vec::new(), 0, 1 + tiles.len() + entities.len());
    }

    let mut budget = capacity - 1;
    let entity_keep = entities.len().min(budget);
    budget -= entity_keep;
    let keep_tile = tile_keep_mask(&tiles, budget);
    let tiles_kept = keep_tile.iter().filter(|keep| **keep).count();
    let dropped = (entities.len() - entity_keep) + (tiles.len() - tiles_kept);

    let mut commands = Vec::with_capacity(1 + tiles_kept + entity_keep);
    commands.push(background);
    commands.extend(
        tiles
            .into_iter()
            .zip(keep_tile)
            .filter_map(|(tile, keep)| keep.then_some(tile.command)),
    );
    commands.extend(entities.into_iter().take(entity_keep));

    RenderCommandList::from_parts(commands, capacity, dropped)
}

pub fn visible_tiles(camera: &Camera, map: &TileMap) -> VisibleTiles {
    let tw = i64::from(map.tile_width().max(1));
    let th = i64::from(map.tile_height().max(1));
    let left = i64::from(camera.left().max(0));
    let top = i64::from(camera.top().max(0));
    let right = i64::from(camera.right().max(0));
    let bottom = i64::from(camera.bottom().max(0));
    let map_w = i64::from(map.width());
    let map_h = i64::from(map.height());

    let x_start = (left / tw).min(map_w);
    let x_end = ceil_div(right, tw).clamp(x_start, map_w);
    let y_start = (top / th).min(map_h);
    let y_end = ceil_div(bottom, th).clamp(y_start, map_h);

    VisibleTiles {
        x_start: x_start as u32,
        x_end: x_end as u32,
        y_start: y_start as u32,
        y_end: y_end as u32,
    }
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}

fn tile_candidates(camera: &Camera, map: &TileMap, images: &ImageCatalog) -> Vec<TileCandidate> {
    let visible = visible_tiles(camera, map);
    let mut out = Vec::with_capacity(visible.cell_count());
    for layer in map.layers() {
        push_layer_tiles(camera, map, layer, images, visible, &mut out);
    }
    out
}

fn push_layer_tiles(
    camera: &Camera,
    map: &TileMap,
    layer: &TileLayer,
    images: &ImageCatalog,
    visible: VisibleTiles,
    out: &mut Vec<TileCandidate>,
) {
    let Some(tileset) = map.tileset_for(layer) else {
        return;
    };
    let Some(image) = images.get(&tileset.image_source) else {
        return;
    };
    let columns = tileset
        .columns
        .unwrap_or_else(|| u32::try_from(image.width).unwrap_or(0) / tileset.tile_width);
    if columns == 0 {
        return;
    }

    let tw = map.tile_width() as i32;
    let th = map.tile_height() as i32;
    let src_size = Size {
        w: tileset.tile_width as i32,
        h: tileset.tile_height as i32,
    };
    let view = camera.size();
    let (centre_x, centre_y) = (i64::from(view.w) / 2, i64::from(view.h) / 2);

    for y in visible.y_start..visible.y_end {
        for x in visible.x_start..visible.x_end {
            let Some(id) = map.tile_at_layer(layer, x, y) else {
                continue;
            };
            if id == 0 {
                continue;
            }
            let pos = camera.to_screen(Vector {
                x: x as i32 * tw,
                y: y as i32 * th,
            });
            let dx = i64::from(pos.x) + i64::from(tw) / 2 - centre_x;
            let dy = i64::from(pos.y) + i64::from(th) / 2 - centre_y;
            out.push(TileCandidate {
                command: RenderCommand::Pic {
                    image: image.handle,
                    pos,
                    size: Size { w: tw, h: th },
                    src_pos: Vector {
                        x: (id % columns) as i32 * src_size.w,
                        y: (id / columns) as i32 * src_size.h,
                    },
                    src_size,
                },
                distance_sq: dx * dx + dy * dy,
            });
        }
    }
}

/// Marks the `budget` tiles nearest the viewport centre; ties go to the
/// earlier-emitted tile.
fn tile_keep_mask(tiles: &[TileCandidate], budget: usize) -> Vec<bool> {
    if tiles.len() <= budget {
        return vec![true; tiles.len()];
    }
    let mut order: Vec<usize> = (0..tiles.len()).collect();
    order.sort_by_key(|&index| (tiles[index].distance_sq, index));
    let mut keep = vec![false; tiles.len()];
    for &index in order.iter().take(budget) {
        keep[index] = true;
    }
    keep
}

fn entity_command(camera: &Camera, entity: &Entity, images: &ImageCatalog) -> RenderCommand {
    let pos = camera.to_screen(entity.pos);
    match entity.image.and_then(|handle| images.by_handle(handle)) {
        Some(image) => RenderCommand::Pic {
            image: image.handle,
            pos,
            size: entity.size,
            src_pos: Vector::default(),
            src_size: Size {
                w: image.width,
                h: image.height,
            },
        },
        None => RenderCommand::Rect {
            pos,
            size: entity.size,
            color: entity.color,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bridge::{Image, ImageHandle};
    use crate::app::tilemap::Tileset;
    use crate::app::world::Color;

    const TILES: &str = "base/tiles.png";
    const PLAYER: &str = "base/player.png";

    fn catalog() -> ImageCatalog {
        let mut images = ImageCatalog::default();
        images.insert(
            TILES,
            Image {
                handle: ImageHandle(0),
                width: 256,
                height: 128,
            },
        );
        images.insert(
            PLAYER,
            Image {
                handle: ImageHandle(1),
                width: 32,
                height: 64,
            },
        );
        images
    }

    fn filled_map(width: u32, height: u32, layers: usize) -> TileMap {
        let layers = (0..layers)
            .map(|n| TileLayer::new(format!("layer{n}"), 0, vec![1; (width * height) as usize]))
            .collect();
        TileMap::new(
            width,
            height,
            64,
            64,
            layers,
            vec![Tileset {
                name: "ground".to_string(),
                image_source: TILES.to_string(),
                tile_width: 64,
                tile_height: 64,
                columns: None,
            }],
            Vec::new(),
        )
        .expect("map")
    }

    fn state_with_camera(map: &TileMap, view: Size) -> GameState {
        let mut state = GameState::with_capacity(8);
        state.camera = Camera::new(view, map.pixel_size());
        state
    }

    fn tile_count(list: &RenderCommandList) -> usize {
        list.iter()
            .filter(|command| matches!(command, RenderCommand::Pic { image, .. } if *image == ImageHandle(0)))
            .count()
    }

    #[test]
    fn background_comes_first_sized_to_camera() {
        let map = filled_map(4, 4, 1);
        let state = state_with_camera(&map, Size { w: 128, h: 64 });
        let list = generate(&state, &map, &catalog(), 64);

        assert_eq!(
            list.commands()[0],
            RenderCommand::Rect {
                pos: Vector::default(),
                size: Size { w: 128, h: 64 },
                color: Color::rgba(168, 168, 168, 255),
            }
        );
    }

    #[test]
    fn culling_emits_only_cells_overlapping_viewport() {
        let map = filled_map(100, 100, 1);
        let mut state = state_with_camera(&map, Size { w: 1280, h: 720 });
        let list = generate(&state, &map, &catalog(), 2048);
        assert_eq!(tile_count(&list), 20 * 12);

        state.camera.set(5, 0);
        let list = generate(&state, &map, &catalog(), 2048);
        assert_eq!(tile_count(&list), 21 * 12);
        assert_eq!(list.dropped(), 0);
    }

    #[test]
    fn tile_count_is_independent_of_map_size() {
        let view = Size { w: 1280, h: 1280 };
        for side in [20, 100, 400] {
            let map = filled_map(side, side, 1);
            let state = state_with_camera(&map, view);
            let list = generate(&state, &map, &catalog(), 2048);
            assert_eq!(tile_count(&list), 400, "map side {side}");
        }
    }

    #[test]
    fn empty_tiles_are_skipped() {
        let mut map_tiles = vec![0; 4];
        map_tiles[3] = 2;
        let map = TileMap::new(
            2,
            2,
            64,
            64,
            vec![TileLayer::new("ground", 0, map_tiles)],
            vec![Tileset {
                name: "ground".to_string(),
                image_source: TILES.to_string(),
                tile_width: 64,
                tile_height: 64,
                columns: None,
            }],
            Vec::new(),
        )
        .expect("map");
        let state = state_with_camera(&map, Size { w: 128, h: 128 });
        let list = generate(&state, &map, &catalog(), 16);

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.commands()[1],
            RenderCommand::Pic {
                image: ImageHandle(0),
                pos: Vector { x: 64, y: 64 },
                size: Size { w: 64, h: 64 },
                src_pos: Vector { x: 128, y: 0 },
                src_size: Size { w: 64, h: 64 },
            }
        );
    }

    #[test]
    fn source_rect_wraps_by_columns_and_offsets_by_camera() {
        let mut tiles = vec![0; 3 * 2];
        tiles[5] = 9;
        let map = TileMap::new(
            3,
            2,
            32,
            32,
            vec![TileLayer::new("deco", 0, tiles)],
            vec![Tileset {
                name: "deco".to_string(),
                image_source: TILES.to_string(),
                tile_width: 16,
                tile_height: 16,
                columns: Some(4),
            }],
            Vec::new(),
        )
        .expect("map");
        let mut state = state_with_camera(&map, Size { w: 64, h: 64 });
        state.camera.set(10, 0);
        let list = generate(&state, &map, &catalog(), 16);

        assert!(list.commands().contains(&RenderCommand::Pic {
            image: ImageHandle(0),
            pos: Vector { x: 54, y: 32 },
            size: Size { w: 32, h: 32 },
            src_pos: Vector { x: 16, y: 32 },
            src_size: Size { w: 16, h: 16 },
        }));
    }

    #[test]
    fn entities_follow_tiles_in_slot_order() {
        let map = filled_map(2, 2, 2);
        let mut state = state_with_camera(&map, Size { w: 128, h: 128 });
        state
            .entities
            .insert(
                Entity::new(
                    Vector { x: 10, y: 20 },
                    Size { w: 64, h: 128 },
                    Color::rgba(255, 0, 0, 255),
                )
                .with_image(Some(ImageHandle(1))),
            )
            .expect("player");
        state
            .entities
            .insert(Entity::new(
                Vector { x: 1, y: 2 },
                Size { w: 8, h: 8 },
                Color::rgba(0, 0, 255, 255),
            ))
            .expect("marker");

        let list = generate(&state, &map, &catalog(), 64);

        assert_eq!(list.len(), 1 + 8 + 2);
        assert_eq!(
            list.commands()[9],
            RenderCommand::Pic {
                image: ImageHandle(1),
                pos: Vector { x: 10, y: 20 },
                size: Size { w: 64, h: 128 },
                src_pos: Vector::default(),
                src_size: Size { w: 32, h: 64 },
            }
        );
        assert_eq!(
            list.commands()[10],
            RenderCommand::Rect {
                pos: Vector { x: 1, y: 2 },
                size: Size { w: 8, h: 8 },
                color: Color::rgba(0, 0, 255, 255),
            }
        );
    }

    #[test]
    fn unknown_entity_image_falls_back_to_rect() {
        let map = filled_map(1, 1, 0);
        let mut state = state_with_camera(&map, Size { w: 64, h: 64 });
        state
            .entities
            .insert(
                Entity::new(Vector::default(), Size { w: 4, h: 4 }, Color::default())
                    .with_image(Some(ImageHandle(42))),
            )
            .expect("entity");

        let list = generate(&state, &map, &catalog(), 8);
        assert!(matches!(list.commands()[1], RenderCommand::Rect { .. }));
    }

    #[test]
    fn overflow_keeps_background_entities_and_nearest_tiles() {
        let map = filled_map(3, 3, 1);
        let mut state = state_with_camera(&map, Size { w: 192, h: 192 });
        state
            .entities
            .insert(Entity::new(Vector::default(), Size { w: 4, h: 4 }, Color::default()))
            .expect("entity");

        let list = generate(&state, &map, &catalog(), 3);

        assert_eq!(list.len(), 3);
        assert_eq!(list.dropped(), 8);
        assert!(matches!(list.commands()[0], RenderCommand::Rect { .. }));
        assert!(matches!(
            list.commands()[1],
            RenderCommand::Pic { pos: Vector { x: 64, y: 64 }, .. }
        ));
        assert!(matches!(list.commands()[2], RenderCommand::Rect { .. }));
    }

    #[test]
    fn overflow_preserves_paint_order_of_surviving_tiles() {
        let map = filled_map(4, 1, 1);
        let state = state_with_camera(&map, Size { w: 256, h: 64 });
        let list = generate(&state, &map, &catalog(), 3);

        let xs: Vec<i32> = list
            .iter()
            .filter_map(|command| match command {
                RenderCommand::Pic { pos, .. } => Some(pos.x),
                _ => None,
            })
            .collect();
        assert_eq!(xs, vec![64, 128]);
        assert_eq!(list.dropped(), 2);
    }

    #[test]
    fn entities_past_capacity_drop_highest_slots() {
        let map = filled_map(1, 1, 1);
        let mut state = state_with_camera(&map, Size { w: 64, h: 64 });
        for x in 0..4 {
            state
                .entities
                .insert(Entity::new(Vector { x, y: 0 }, Size { w: 1, h: 1 }, Color::default()))
                .expect("entity");
        }

        let list = generate(&state, &map, &catalog(), 3);

        assert_eq!(list.len(), 3);
        assert_eq!(list.dropped(), 3);
        assert!(matches!(
            list.commands()[2],
            RenderCommand::Rect { pos: Vector { x: 1, y: 0 }, .. }
        ));
    }

    #[test]
    fn zero_capacity_yields_empty_list() {
        let map = filled_map(2, 2, 1);
        let state = state_with_camera(&map, Size { w: 128, h: 128 });
        let list = generate(&state, &map, &catalog(), 0);
        assert!(list.is_empty());
        assert_eq!(list.dropped(), 5);
    }

    #[test]
    fn layer_with_unknown_tileset_image_is_skipped() {
        let map = filled_map(2, 2, 1);
        let state = state_with_camera(&map, Size { w: 128, h: 128 });
        let list = generate(&state, &map, &ImageCatalog::default(), 16);
        assert_eq!(list.len(), 1);
    }
}
