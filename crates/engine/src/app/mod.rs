mod assets;
mod bridge;
mod camera;
mod handoff;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod simulation;
mod tilemap;
mod world;

pub use assets::{AssetError, ImagePixels, ImageStore};
pub use bridge::{
    engine_bridge, BridgeClient, BridgeError, BridgeHost, EngineRequest, EngineResponse, Image,
    ImageCatalog, ImageHandle, DEFAULT_BRIDGE_TIMEOUT,
};
pub use camera::Camera;
pub use handoff::{
    mailbox, FrameFreshness, FrameSlot, HandoffMode, MailboxReceiver, MailboxSender, SharedWorld,
    StopToken, WorldBuffers,
};
pub use input::{
    Event, KeyBindings, KeyStateTable, Scancode, UserCommand, KEY_STATE_SIZE, SCANCODE_A,
    SCANCODE_D, SCANCODE_DOWN, SCANCODE_LEFT, SCANCODE_RIGHT, SCANCODE_S, SCANCODE_UP, SCANCODE_W,
};
pub use loop_runner::{run_app, run_app_with_metrics, scancode_for_key, AppError, LoopConfig};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    generate, visible_tiles, RenderCommand, RenderCommandList, Renderer, Viewport, VisibleTiles,
    BACKGROUND_COLOR, DEFAULT_COMMAND_CAPACITY,
};
pub use simulation::{
    load_scene, spawn_simulation, Level, LevelError, LevelSource, LoadError, LoadedScene,
    SceneView, Simulation, SimulationConfig, SimulationHandle, SimulationStatus, PLAYER_COLOR,
    PLAYER_OBJECT_KIND, SIMULATION_THREAD_NAME,
};
pub use tilemap::{MapObject, ObjectGroup, TileLayer, TileMap, TileMapError, Tileset};
pub use world::{
    Color, Entity, EntityKey, EntityStore, GameState, MotionRules, Size, Vector, WorldError,
    DEFAULT_ENTITY_CAPACITY,
};
