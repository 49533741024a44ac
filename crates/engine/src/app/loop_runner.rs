use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event as WinitEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::AppPaths;

use super::assets::ImageStore;
use super::bridge::engine_bridge;
use super::handoff::{FrameFreshness, HandoffMode};
use super::input::{Event, Scancode};
use super::metrics::MetricsAccumulator;
use super::rendering::{RenderCommandList, Renderer};
use super::simulation::{
    spawn_simulation, LevelSource, LoadError, SceneView, SimulationConfig, SimulationStatus,
};
use super::world::Vector;
use super::MetricsHandle;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub metrics_log_interval: Duration,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Scroller".to_string(),
            window_width: 1280,
            window_height: 720,
            metrics_log_interval: Duration::from_secs(1),
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to start simulation thread: {0}")]
    SpawnSimulation(#[source] std::io::Error),
    #[error("simulation failed to load: {0}")]
    Simulation(#[source] LoadError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(
    config: LoopConfig,
    app_paths: &AppPaths,
    simulation_config: SimulationConfig,
    level: Box<dyn LevelSource>,
) -> Result<(), AppError> {
    let metrics_handle = MetricsHandle::default();
    run_app_with_metrics(config, app_paths, simulation_config, level, metrics_handle)
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    app_paths: &AppPaths,
    simulation_config: SimulationConfig,
    level: Box<dyn LevelSource>,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(Arc::clone(&window)).map_err(AppError::CreateRenderer)?;
    let mut images = ImageStore::new(app_paths.root.join("assets"));

    event_loop.set_control_flow(ControlFlow::Poll);

    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let handoff = simulation_config.handoff;
    info!(
        tick_period_ms = simulation_config.tick_period_ms,
        handoff = handoff.as_str(),
        command_capacity = simulation_config.command_capacity,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        "loop_config"
    );

    let (bridge_client, bridge_host) = engine_bridge();
    let mut simulation = spawn_simulation(level, bridge_client, simulation_config)
        .map_err(AppError::SpawnSimulation)?;

    let mut scene: Option<SceneView> = None;
    let mut failure: Option<LoadError> = None;
    let failure_slot = &mut failure;
    let mut cursor = Vector::default();
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut last_reported_drop = 0usize;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);

    let run_result = event_loop
        .run(move |event, window_target| match event {
            WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window.inner_size();
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = Vector {
                            x: position.x as i32,
                            y: position.y as i32,
                        };
                        simulation.send_input(Event::MouseMove { position: cursor });
                    }
                    WindowEvent::MouseInput { state, .. } => {
                        simulation.send_input(Event::MouseClick {
                            down: state == ElementState::Pressed,
                            position: cursor,
                        });
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        simulation.send_input(Event::MouseWheel {
                            delta: wheel_steps(delta),
                        });
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        let PhysicalKey::Code(code) = event.physical_key else {
                            return;
                        };
                        if code == KeyCode::Escape && event.state == ElementState::Pressed {
                            info!(reason = "escape_key", "shutdown_requested");
                            window_target.exit();
                            return;
                        }
                        if event.repeat {
                            return;
                        }
                        if let Some(scancode) = scancode_for_key(code) {
                            simulation.send_input(Event::Key {
                                code: scancode,
                                down: event.state == ElementState::Pressed,
                            });
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        let Some(view) = scene.as_ref() else {
                            return;
                        };

                        let elapsed_since_last_present =
                            Instant::now().saturating_duration_since(last_present_instant);
                        let cap_sleep =
                            compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        let locked_frame: RenderCommandList;
                        let (list, freshness) = match handoff {
                            HandoffMode::Mailbox => {
                                let frames = simulation.frames_mut();
                                let freshness = frames.refresh();
                                match frames.latest() {
                                    Some(list) => (list, freshness),
                                    None => return,
                                }
                            }
                            HandoffMode::LockedSnapshot => {
                                locked_frame = view.render_commands();
                                (&locked_frame, FrameFreshness::Fresh)
                            }
                        };

                        if list.dropped() != last_reported_drop {
                            if list.dropped() > 0 {
                                warn!(
                                    dropped = list.dropped(),
                                    capacity = list.capacity(),
                                    "render_commands_dropped"
                                );
                            }
                            last_reported_drop = list.dropped();
                        }
                        metrics_accumulator.record_presented_list(freshness, list.dropped());

                        if let Err(error) = renderer.render(list, &images) {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                        }
                        last_present_instant = Instant::now();

                        metrics_accumulator.record_frame(raw_frame_dt);
                        metrics_accumulator.observe_tick_counter(view.shared().tick_count());
                        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                            metrics_handle.publish(snapshot);
                            info!(
                                fps = snapshot.fps,
                                tps = snapshot.tps,
                                frame_time_ms = snapshot.frame_time_ms,
                                stale_frames = snapshot.stale_frames,
                                dropped_commands = snapshot.dropped_commands,
                                "loop_metrics"
                            );
                        }
                    }
                    _ => {}
                }
            }
            WinitEvent::AboutToWait => {
                bridge_host.service_pending(|request| images.handle_request(request));

                if scene.is_none() {
                    match simulation.poll_status() {
                        Some(SimulationStatus::Ready(view)) => {
                            info!(image_count = images.len(), "scene_attached");
                            scene = Some(view);
                        }
                        Some(SimulationStatus::Failed(load_error)) => {
                            *failure_slot = Some(load_error);
                            window_target.exit();
                            return;
                        }
                        None if simulation.is_finished() => {
                            error!("simulation_exited_before_ready");
                            window_target.exit();
                            return;
                        }
                        None => {}
                    }
                }
                renderer.request_redraw();
            }
            WinitEvent::LoopExiting => {
                simulation.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun);

    run_result?;
    match failure {
        Some(load_error) => Err(AppError::Simulation(load_error)),
        None => Ok(()),
    }
}

pub fn scancode_for_key(code: KeyCode) -> Option<Scancode> {
    let scancode = match code {
        KeyCode::KeyA => 4,
        KeyCode::KeyB => 5,
        KeyCode::KeyC => 6,
        KeyCode::KeyD => 7,
        KeyCode::KeyE => 8,
        KeyCode::KeyF => 9,
        KeyCode::KeyG => 10,
        KeyCode::KeyH => 11,
        KeyCode::KeyI => 12,
        KeyCode::KeyJ => 13,
        KeyCode::KeyK => 14,
        KeyCode::KeyL => 15,
        KeyCode::KeyM => 16,
        KeyCode::KeyN => 17,
        KeyCode::KeyO => 18,
        KeyCode::KeyP => 19,
        KeyCode::KeyQ => 20,
        KeyCode::KeyR => 21,
        KeyCode::KeyS => 22,
        KeyCode::KeyT => 23,
        KeyCode::KeyU => 24,
        KeyCode::KeyV => 25,
        KeyCode::KeyW => 26,
        KeyCode::KeyX => 27,
        KeyCode::KeyY => 28,
        KeyCode::KeyZ => 29,
        KeyCode::Digit1 => 30,
        KeyCode::Digit2 => 31,
        KeyCode::Digit3 => 32,
        KeyCode::Digit4 => 33,
        KeyCode::Digit5 => 34,
        KeyCode::Digit6 => 35,
        KeyCode::Digit7 => 36,
        KeyCode::Digit8 => 37,
        KeyCode::Digit9 => 38,
        KeyCode::Digit0 => 39,
        KeyCode::Enter => 40,
        KeyCode::Escape => 41,
        KeyCode::Backspace => 42,
        KeyCode::Tab => 43,
        KeyCode::Space => 44,
        KeyCode::ArrowRight => 79,
        KeyCode::ArrowLeft => 80,
        KeyCode::ArrowDown => 81,
        KeyCode::ArrowUp => 82,
        KeyCode::ControlLeft => 224,
        KeyCode::ShiftLeft => 225,
        KeyCode::AltLeft => 226,
        KeyCode::ControlRight => 228,
        KeyCode::ShiftRight => 229,
        KeyCode::AltRight => 230,
        _ => return None,
    };
    Some(scancode)
}

fn wheel_steps(delta: MouseScrollDelta) -> i32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
        MouseScrollDelta::PixelDelta(position) => {
            if position.y > 0.0 {
                1
            } else if position.y < 0.0 {
                -1
            } else {
                0
            }
        }
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use winit::dpi::PhysicalPosition;

    use super::*;
    use crate::app::input::{
        KeyBindings, SCANCODE_A, SCANCODE_D, SCANCODE_DOWN, SCANCODE_LEFT, SCANCODE_RIGHT,
        SCANCODE_S, SCANCODE_UP, SCANCODE_W,
    };

    #[test]
    fn arrows_and_wasd_map_to_bound_scancodes() {
        assert_eq!(scancode_for_key(KeyCode::ArrowUp), Some(SCANCODE_UP));
        assert_eq!(scancode_for_key(KeyCode::ArrowDown), Some(SCANCODE_DOWN));
        assert_eq!(scancode_for_key(KeyCode::ArrowLeft), Some(SCANCODE_LEFT));
        assert_eq!(scancode_for_key(KeyCode::ArrowRight), Some(SCANCODE_RIGHT));
        assert_eq!(scancode_for_key(KeyCode::KeyW), Some(SCANCODE_W));
        assert_eq!(scancode_for_key(KeyCode::KeyA), Some(SCANCODE_A));
        assert_eq!(scancode_for_key(KeyCode::KeyS), Some(SCANCODE_S));
        assert_eq!(scancode_for_key(KeyCode::KeyD), Some(SCANCODE_D));
    }

    #[test]
    fn every_default_binding_is_reachable_from_a_key() {
        let reachable: Vec<Scancode> = [
            KeyCode::ArrowUp,
            KeyCode::ArrowDown,
            KeyCode::ArrowLeft,
            KeyCode::ArrowRight,
            KeyCode::KeyW,
            KeyCode::KeyA,
            KeyCode::KeyS,
            KeyCode::KeyD,
        ]
        .into_iter()
        .filter_map(scancode_for_key)
        .collect();
        let bindings = KeyBindings::default();
        for code in bindings
            .up
            .iter()
            .chain(&bindings.down)
            .chain(&bindings.left)
            .chain(&bindings.right)
        {
            assert!(reachable.contains(code), "unreachable scancode {code}");
        }
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        assert_eq!(scancode_for_key(KeyCode::F3), None);
    }

    #[test]
    fn pixel_wheel_delta_maps_to_single_step_direction() {
        assert_eq!(
            wheel_steps(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 12.0))),
            1
        );
        assert_eq!(
            wheel_steps(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -3.0))),
            -1
        );
        assert_eq!(wheel_steps(MouseScrollDelta::LineDelta(0.0, 2.0)), 2);
    }

    #[test]
    fn normalize_non_zero_duration_falls_back_on_zero() {
        let fallback = Duration::from_secs(1);
        assert_eq!(normalize_non_zero_duration(Duration::ZERO, fallback), fallback);
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), fallback),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn target_frame_duration_none_when_cap_off() {
        assert_eq!(target_frame_duration(None), None);
    }

    #[test]
    fn target_frame_duration_for_60hz_is_expected() {
        let duration = target_frame_duration(Some(60)).expect("duration");
        assert!((duration.as_secs_f64() - (1.0 / 60.0)).abs() < 0.000_001);
    }

    #[test]
    fn compute_cap_sleep_zero_when_over_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(20), target_frame_duration(Some(60)));
        assert_eq!(sleep, Duration::ZERO);
    }

    #[test]
    fn compute_cap_sleep_positive_when_under_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(5), target_frame_duration(Some(60)));
        assert!(sleep > Duration::ZERO);
    }

    #[test]
    fn normalize_render_fps_cap_disables_zero() {
        assert_eq!(normalize_render_fps_cap(Some(0)), None);
        assert_eq!(normalize_render_fps_cap(Some(60)), Some(60));
    }
}
