use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, tick, Receiver, Sender, TryRecvError, TrySendError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bridge::{BridgeClient, BridgeError, ImageCatalog};
use super::camera::Camera;
use super::handoff::{mailbox, FrameSlot, HandoffMode, MailboxSender, SharedWorld, StopToken};
use super::input::{Event, KeyBindings, KeyStateTable};
use super::rendering::{generate, RenderCommandList, DEFAULT_COMMAND_CAPACITY};
use super::tilemap::{TileMap, TileMapError};
use super::world::{
    Color, Entity, GameState, MotionRules, Size, Vector, WorldError, DEFAULT_ENTITY_CAPACITY,
};

pub const SIMULATION_THREAD_NAME: &str = "simulation";
pub const PLAYER_OBJECT_KIND: &str = "player";
pub const PLAYER_COLOR: Color = Color::rgba(255, 0, 0, 255);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_period_ms: u64,
    pub speed: i32,
    pub integration_scale_ns: i64,
    pub follow_margin: i32,
    pub viewport: Size,
    pub max_tick_delta_ms: u64,
    pub bridge_timeout_ms: u64,
    pub command_capacity: usize,
    pub entity_capacity: usize,
    pub input_queue_capacity: usize,
    pub handoff: HandoffMode,
    pub key_bindings: KeyBindings,
    pub player_spawn: Vector,
    pub player_size: Size,
    pub clamp_entities_to_bounds: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 8,
            speed: 4,
            integration_scale_ns: 5_000_000,
            follow_margin: 200,
            viewport: Size { w: 1280, h: 720 },
            max_tick_delta_ms: 250,
            bridge_timeout_ms: 10_000,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
            input_queue_capacity: 256,
            handoff: HandoffMode::default(),
            key_bindings: KeyBindings::default(),
            player_spawn: Vector { x: 100, y: 100 },
            player_size: Size { w: 64, h: 128 },
            clamp_entities_to_bounds: false,
        }
    }
}

impl SimulationConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    pub fn max_tick_delta(&self) -> Duration {
        Duration::from_millis(self.max_tick_delta_ms.max(1))
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms.max(1))
    }

    pub fn motion_rules(&self) -> MotionRules {
        MotionRules {
            speed: self.speed,
            integration_scale_ns: self.integration_scale_ns.max(1),
            follow_margin: self.follow_margin,
            clamp_to_bounds: self.clamp_entities_to_bounds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Level {
    pub map: TileMap,
    pub player_sprite: Option<String>,
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("level map is invalid: {0}")]
    InvalidMap(#[from] TileMapError),
}

pub trait LevelSource: Send {
    fn load_level(&mut self) -> Result<Level, LevelError>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to obtain level: {0}")]
    Level(#[from] LevelError),
    #[error("failed to load level images: {0}")]
    Bridge(#[from] BridgeError),
    #[error("failed to populate world: {0}")]
    World(#[from] WorldError),
    #[error("loading was cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct LoadedScene {
    pub state: GameState,
    pub map: Arc<TileMap>,
    pub images: Arc<ImageCatalog>,
}

pub fn load_scene(
    source: &mut dyn LevelSource,
    bridge: &BridgeClient,
    config: &SimulationConfig,
    stop: &StopToken,
) -> Result<LoadedScene, LoadError> {
    let level = source.load_level()?;

    let mut images = ImageCatalog::default();
    let paths = level
        .player_sprite
        .iter()
        .chain(level.map.tilesets().iter().map(|tileset| &tileset.image_source));
    for path in paths {
        if stop.is_stopped() {
            return Err(LoadError::Cancelled);
        }
        if images.contains(path) {
            continue;
        }
        let image = bridge.load_image(path).map_err(|err| match err {
            BridgeError::Cancelled { .. } => LoadError::Cancelled,
            other => LoadError::Bridge(other),
        })?;
        debug!(
            path = %path,
            handle = image.handle.0,
            width = image.width,
            height = image.height,
            "image_loaded"
        );
        images.insert(path.clone(), image);
    }

    let mut state = GameState::with_capacity(config.entity_capacity);
    state.camera = Camera::new(config.viewport, level.map.pixel_size());

    let spawn = level
        .map
        .find_object(PLAYER_OBJECT_KIND)
        .unwrap_or(config.player_spawn);
    let player_image = level
        .player_sprite
        .as_deref()
        .and_then(|path| images.get(path))
        .map(|image| image.handle);
    let player = Entity::new(spawn, config.player_size, PLAYER_COLOR).with_image(player_image);
    state.local_entity = Some(state.entities.insert(player)?);

    Ok(LoadedScene {
        state,
        map: Arc::new(level.map),
        images: Arc::new(images),
    })
}

#[derive(Debug, Clone)]
pub struct SceneView {
    shared: SharedWorld,
    map: Arc<TileMap>,
    images: Arc<ImageCatalog>,
    command_capacity: usize,
}

impl SceneView {
    pub fn shared(&self) -> &SharedWorld {
        &self.shared
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn images(&self) -> &ImageCatalog {
        &self.images
    }

    pub fn render_commands(&self) -> RenderCommandList {
        let state = self.shared.snapshot();
        generate(&state, &self.map, &self.images, self.command_capacity)
    }
}

#[derive(Debug)]
pub enum SimulationStatus {
    Ready(SceneView),
    Failed(LoadError),
}

#[derive(Debug)]
pub struct Simulation {
    shared: SharedWorld,
    map: Arc<TileMap>,
    images: Arc<ImageCatalog>,
    keys: KeyStateTable,
    bindings: KeyBindings,
    rules: MotionRules,
    max_tick_delta: Duration,
    command_capacity: usize,
}

impl Simulation {
    pub fn new(scene: LoadedScene, config: &SimulationConfig) -> Self {
        Self {
            shared: SharedWorld::new(scene.state),
            map: scene.map,
            images: scene.images,
            keys: KeyStateTable::default(),
            bindings: config.key_bindings.clone(),
            rules: config.motion_rules(),
            max_tick_delta: config.max_tick_delta(),
            command_capacity: config.command_capacity,
        }
    }

    pub fn view(&self) -> SceneView {
        SceneView {
            shared: self.shared.clone(),
            map: Arc::clone(&self.map),
            images: Arc::clone(&self.images),
            command_capacity: self.command_capacity,
        }
    }

    pub fn drain_input(&mut self, input: &Receiver<Event>) -> usize {
        let mut drained = 0;
        loop {
            match input.try_recv() {
                Ok(event) => {
                    self.keys.apply(&event);
                    drained += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return drained,
            }
        }
    }

    pub fn step(&mut self, dt: Duration) {
        let dt = dt.min(self.max_tick_delta);
        let dt_ns = i64::try_from(dt.as_nanos()).unwrap_or(i64::MAX);
        let command = self.keys.command(&self.bindings);
        let rules = self.rules;
        self.shared.tick(|state| state.advance(dt_ns, command, &rules));
    }

    pub fn render_commands(&self) -> RenderCommandList {
        self.view().render_commands()
    }
}

#[derive(Debug)]
pub struct SimulationHandle {
    join: Option<JoinHandle<()>>,
    stop: StopToken,
    status: Receiver<SimulationStatus>,
    frames: FrameSlot<RenderCommandList>,
    input: Sender<Event>,
}

impl SimulationHandle {
    pub fn send_input(&self, event: Event) -> bool {
        match self.input.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(?event, "input_queue_full");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn poll_status(&self) -> Option<SimulationStatus> {
        self.status.try_recv().ok()
    }

    pub fn frames_mut(&mut self) -> &mut FrameSlot<RenderCommandList> {
        &mut self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn shutdown(&mut self) {
        self.stop.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("simulation_thread_panicked");
            }
        }
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ThreadChannels {
    input: Receiver<Event>,
    status: Sender<SimulationStatus>,
    frames: MailboxSender<RenderCommandList>,
    stop: StopToken,
}

pub fn spawn_simulation(
    source: Box<dyn LevelSource>,
    bridge: BridgeClient,
    config: SimulationConfig,
) -> io::Result<SimulationHandle> {
    let (input_tx, input_rx) = bounded(config.input_queue_capacity.max(1));
    let (status_tx, status_rx) = bounded(1);
    let (frames_tx, frames_rx) = mailbox();
    let stop = StopToken::default();
    let channels = ThreadChannels {
        input: input_rx,
        status: status_tx,
        frames: frames_tx,
        stop: stop.clone(),
    };
    let bridge = bridge
        .with_timeout(config.bridge_timeout())
        .with_stop(stop.clone());

    let join = thread::Builder::new()
        .name(SIMULATION_THREAD_NAME.to_string())
        .spawn(move || run_simulation(source, bridge, config, channels))?;

    Ok(SimulationHandle {
        join: Some(join),
        stop,
        status: status_rx,
        frames: FrameSlot::new(frames_rx),
        input: input_tx,
    })
}

fn run_simulation(
    mut source: Box<dyn LevelSource>,
    bridge: BridgeClient,
    config: SimulationConfig,
    channels: ThreadChannels,
) {
    info!(
        tick_period_ms = config.tick_period_ms,
        handoff = config.handoff.as_str(),
        "simulation_loading"
    );
    let scene = match load_scene(source.as_mut(), &bridge, &config, &channels.stop) {
        Ok(scene) => scene,
        Err(LoadError::Cancelled) => {
            info!("simulation_cancelled");
            return;
        }
        Err(load_error) => {
            error!(error = %load_error, "simulation_failed");
            let _ = channels.status.send(SimulationStatus::Failed(load_error));
            return;
        }
    };
    drop(bridge);

    let mut simulation = Simulation::new(scene, &config);
    info!(
        entity_count = simulation.shared.snapshot().entities.len(),
        image_count = simulation.images.len(),
        "simulation_ready"
    );
    if channels
        .status
        .send(SimulationStatus::Ready(simulation.view()))
        .is_err()
    {
        return;
    }
    if config.handoff == HandoffMode::Mailbox {
        channels.frames.publish(simulation.render_commands());
    }

    let ticker = tick(config.tick_period());
    let mut last_tick = Instant::now();
    while !channels.stop.is_stopped() {
        if ticker.recv().is_err() {
            break;
        }
        if channels.stop.is_stopped() {
            break;
        }
        simulation.drain_input(&channels.input);
        let now = Instant::now();
        simulation.step(now.saturating_duration_since(last_tick));
        last_tick = now;

        if config.handoff == HandoffMode::Mailbox {
            channels.frames.publish(simulation.render_commands());
        }
    }
    info!(ticks = simulation.shared.tick_count(), "simulation_stopped");
}
