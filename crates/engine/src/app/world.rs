use serde::Deserialize;
use thiserror::Error;

use super::bridge::ImageHandle;
use super::camera::Camera;
use super::input::UserCommand;

pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Size {
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub pos: Vector,
    pub vel: Vector,
    pub size: Size,
    pub color: Color,
    pub image: Option<ImageHandle>,
}

impl Entity {
    pub fn new(pos: Vector, size: Size, color: Color) -> Self {
        Self {
            pos,
            vel: Vector::default(),
            size,
            color,
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<ImageHandle>) -> Self {
        self.image = image;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    index: u32,
    generation: u32,
}

impl EntityKey {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity store is full (capacity {capacity})")]
    CapacityExhausted { capacity: usize },
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

#[derive(Debug, Clone)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    len: usize,
}

impl EntityStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            len: 0,
        }
    }

    pub fn insert(&mut self, entity: Entity) -> Result<EntityKey, WorldError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            self.len += 1;
            return Ok(EntityKey {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.len() >= self.capacity {
            return Err(WorldError::CapacityExhausted {
                capacity: self.capacity,
            });
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entity: Some(entity),
        });
        self.len += 1;
        Ok(EntityKey {
            index,
            generation: 0,
        })
    }

    pub fn remove(&mut self, key: EntityKey) -> Option<Entity> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let removed = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(removed)
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|entity| {
                (
                    EntityKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entity,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.slots.iter_mut().filter_map(|slot| slot.entity.as_mut())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ENTITY_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionRules {
    pub speed: i32,
    pub integration_scale_ns: i64,
    pub follow_margin: i32,
    pub clamp_to_bounds: bool,
}

impl Default for MotionRules {
    fn default() -> Self {
        Self {
            speed: 4,
            integration_scale_ns: 5_000_000,
            follow_margin: 200,
            clamp_to_bounds: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub time_ms: i64,
    pub frame_time_ns: i64,
    pub entities: EntityStore,
    pub camera: Camera,
    pub local_entity: Option<EntityKey>,
}

impl GameState {
    pub fn with_capacity(entity_capacity: usize) -> Self {
        Self {
            entities: EntityStore::with_capacity(entity_capacity),
            ..Self::default()
        }
    }

    pub fn local_entity(&self) -> Option<&Entity> {
        self.local_entity.and_then(|key| self.entities.get(key))
    }

    pub fn advance(&mut self, dt_ns: i64, command: UserCommand, rules: &MotionRules) {
        self.frame_time_ns = dt_ns;
        self.time_ms = self.time_ms.saturating_add(dt_ns / 1_000_000);

        let vel = command.velocity(rules.speed);
        let steps = i32::try_from(dt_ns / rules.integration_scale_ns.max(1)).unwrap_or(i32::MAX);
        let bounds = self.camera.bounds();

        for entity in self.entities.iter_mut() {
            entity.vel = vel;
            entity.pos.x = entity.pos.x.saturating_add(steps.saturating_mul(vel.x));
            entity.pos.y = entity.pos.y.saturating_add(steps.saturating_mul(vel.y));
            if rules.clamp_to_bounds {
                clamp_to_bounds(entity, bounds);
            }
        }

        self.follow_local_entity(rules.follow_margin);
    }

    /// Soft-follow: recentres only once the local entity moves past the
    /// margin on the edge it is travelling towards.
    pub fn follow_local_entity(&mut self, margin: i32) {
        let Some(entity) = self.local_entity().copied() else {
            return;
        };
        let camera = &mut self.camera;
        let size = camera.size();

        if entity.vel.x > 0 && entity.pos.x > camera.right() - margin {
            camera.set(entity.pos.x - size.w + margin, camera.top());
        } else if entity.vel.x < 0 && entity.pos.x < camera.left() + margin {
            camera.set(entity.pos.x - margin, camera.top());
        }

        if entity.vel.y > 0 && entity.pos.y > camera.bottom() - margin {
            camera.set(camera.left(), entity.pos.y - size.h + margin);
        } else if entity.vel.y < 0 && entity.pos.y < camera.top() + margin {
            camera.set(camera.left(), entity.pos.y - margin);
        }
    }
}

fn clamp_to_bounds(entity: &mut Entity, bounds: Size) {
    let max_x = (bounds.w - entity.size.w).max(0);
    let max_y = (bounds.h - entity.size.h).max(0);
    entity.pos.x = entity.pos.x.clamp(0, max_x);
    entity.pos.y = entity.pos.y.clamp(0, max_y);
}
