use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::{resolve_app_paths, StartupError};

use super::diagnostics::{DiagnosticsAccumulator, DiagnosticsHandle, DiagnosticsSnapshot};
use super::input::{ActionStates, InputAction};
use super::world::{Direction, InputSnapshot, SimCommand, Simulation, WorldState};
use super::Renderer;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub diagnostics_interval: Duration,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Townlet".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            diagnostics_interval: Duration::from_millis(100),
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(
    config: LoopConfig,
    simulation: Box<dyn Simulation>,
    world: WorldState,
) -> Result<(), AppError> {
    let diagnostics_handle = DiagnosticsHandle::default();
    run_app_with_diagnostics(config, simulation, world, diagnostics_handle)
}

pub fn run_app_with_diagnostics(
    config: LoopConfig,
    mut simulation: Box<dyn Simulation>,
    mut world: WorldState,
    diagnostics_handle: DiagnosticsHandle,
) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        "startup"
    );

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
    let window_for_loop = Arc::clone(&window);
    let mut renderer =
        Renderer::new(window, app_paths.assets_dir.clone()).map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let diagnostics_interval =
        normalize_non_zero_duration(config.diagnostics_interval, Duration::from_millis(100));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let mut input_collector = InputCollector::new(config.window_width, config.window_height);

    simulation.load(&mut world);
    info!(
        grid_w = world.grid.width(),
        grid_h = world.grid.height(),
        buildings = world.buildings.len(),
        creatures = world.creatures.len(),
        "world_loaded"
    );
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        diagnostics_interval_ms = diagnostics_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut diagnostics_accumulator = DiagnosticsAccumulator::new(diagnostics_interval);
    let mut overlay_visible = false;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        input_collector.mark_quit_requested();
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        input_collector.set_window_size(new_size.width, new_size.height);
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        input_collector.set_window_size(size.width, size.height);
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        input_collector.handle_keyboard_input(&event);
                        if input_collector.quit_requested {
                            info!(reason = "quit_key", "shutdown_requested");
                            window_target.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if input_collector.take_overlay_toggle_pressed() {
                            overlay_visible = !overlay_visible;
                            info!(overlay_visible, "overlay_toggled");
                        }

                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                        accumulator = accumulator.saturating_add(clamped_frame_dt);

                        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                        let mut skip_render = false;
                        for _ in 0..step_plan.ticks_to_run {
                            let input_snapshot = input_collector.snapshot_for_tick();
                            match simulation.update(fixed_dt_seconds, &input_snapshot, &mut world)
                            {
                                SimCommand::None => {}
                                SimCommand::SkipRender => skip_render = true,
                                SimCommand::Quit => {
                                    info!(reason = "simulation", "shutdown_requested");
                                    window_target.exit();
                                }
                            }
                            diagnostics_accumulator.record_tick();
                        }
                        accumulator = step_plan.remaining_accumulator;

                        if step_plan.dropped_backlog > Duration::ZERO {
                            warn!(
                                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                                max_ticks_per_frame, "sim_clamp_triggered"
                            );
                        }

                        // Single authoritative FPS cap sleep point.
                        let elapsed_since_last_present =
                            Instant::now().saturating_duration_since(last_present_instant);
                        let cap_sleep =
                            compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        if !skip_render {
                            let modal = simulation.modal_panel();
                            let toast = simulation.toast_banner();
                            let overlay_lines = overlay_visible.then(|| {
                                let mut lines = vec![format!(
                                    "tps {}  player {:.0},{:.0}",
                                    target_tps, world.player.position.x, world.player.position.y
                                )];
                                lines.extend(simulation.diagnostics_lines(&world));
                                lines
                            });
                            if let Err(error) = renderer.render_world(
                                &world,
                                modal.as_ref(),
                                toast.as_ref(),
                                overlay_lines.as_deref(),
                            ) {
                                warn!(error = %error, "renderer_draw_failed");
                                window_target.exit();
                            }
                            last_present_instant = Instant::now();
                        }
                        diagnostics_accumulator.record_frame(raw_frame_dt);

                        if let Some(rates) = diagnostics_accumulator.maybe_rates(now) {
                            let snapshot = DiagnosticsSnapshot {
                                fps: rates.fps,
                                tps: rates.tps,
                                frame_time_ms: rates.frame_time_ms,
                                player_position: world.player.position,
                                agents_moving: count_moving_agents(&world),
                            };
                            diagnostics_handle.publish(snapshot);
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window_for_loop.request_redraw();
            }
            Event::LoopExiting => {
                simulation.unload(&mut world);
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn count_moving_agents(world: &WorldState) -> u32 {
    let mut moving = 0u32;
    if world.player.is_moving {
        moving += 1;
    }
    if world.companion.is_moving {
        moving += 1;
    }
    moving
        + world
            .creatures
            .iter()
            .filter(|creature| creature.agent.is_moving)
            .count() as u32
}

/// Collects asynchronous window input into loop-owned cells. Movement keys
/// feed a bounded press-order stack whose last entry is the current intent;
/// everything else is an edge flag consumed by the next tick's snapshot.
#[derive(Debug, Default)]
struct InputCollector {
    quit_requested: bool,
    held_directions: Vec<Direction>,
    action_states: ActionStates,
    interact_pressed_edge: bool,
    confirm_pressed_edge: bool,
    cancel_pressed_edge: bool,
    overlay_toggle_pressed_edge: bool,
    window_width: u32,
    window_height: u32,
}

impl InputCollector {
    fn new(window_width: u32, window_height: u32) -> Self {
        Self {
            window_width,
            window_height,
            ..Self::default()
        }
    }

    fn mark_quit_requested(&mut self) {
        self.quit_requested = true;
    }

    fn handle_keyboard_input(&mut self, key_event: &winit::event::KeyEvent) {
        let is_pressed = key_event.state == ElementState::Pressed;
        match key_event.physical_key {
            PhysicalKey::Code(KeyCode::KeyW) | PhysicalKey::Code(KeyCode::ArrowUp) => {
                self.handle_direction_key(Direction::Up, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyS) | PhysicalKey::Code(KeyCode::ArrowDown) => {
                self.handle_direction_key(Direction::Down, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyA) | PhysicalKey::Code(KeyCode::ArrowLeft) => {
                self.handle_direction_key(Direction::Left, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyD) | PhysicalKey::Code(KeyCode::ArrowRight) => {
                self.handle_direction_key(Direction::Right, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyE) | PhysicalKey::Code(KeyCode::Space) => {
                self.handle_edge_key(InputAction::Interact, is_pressed);
            }
            PhysicalKey::Code(KeyCode::Enter) => {
                self.handle_edge_key(InputAction::Confirm, is_pressed);
            }
            PhysicalKey::Code(KeyCode::Escape) => {
                self.handle_edge_key(InputAction::Cancel, is_pressed);
            }
            PhysicalKey::Code(KeyCode::F3) => {
                self.handle_edge_key(InputAction::ToggleOverlay, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyQ) => {
                self.action_states.set(InputAction::Quit, is_pressed);
                if is_pressed {
                    self.mark_quit_requested();
                }
            }
            _ => {}
        }
    }

    fn handle_direction_key(&mut self, direction: Direction, is_pressed: bool) {
        let action = match direction {
            Direction::Up => InputAction::MoveUp,
            Direction::Down => InputAction::MoveDown,
            Direction::Left => InputAction::MoveLeft,
            Direction::Right => InputAction::MoveRight,
        };
        if is_pressed {
            // Key repeat must not reorder the stack.
            if !self.action_states.is_down(action) {
                self.held_directions.retain(|held| *held != direction);
                self.held_directions.push(direction);
            }
        } else {
            self.held_directions.retain(|held| *held != direction);
        }
        self.action_states.set(action, is_pressed);
    }

    fn handle_edge_key(&mut self, action: InputAction, is_pressed: bool) {
        if is_pressed {
            if !self.action_states.is_down(action) {
                match action {
                    InputAction::Interact => self.interact_pressed_edge = true,
                    InputAction::Confirm => self.confirm_pressed_edge = true,
                    InputAction::Cancel => self.cancel_pressed_edge = true,
                    InputAction::ToggleOverlay => self.overlay_toggle_pressed_edge = true,
                    _ => {}
                }
            }
        }
        self.action_states.set(action, is_pressed);
    }

    fn current_direction(&self) -> Option<Direction> {
        self.held_directions.last().copied()
    }

    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot::new(
            self.quit_requested,
            self.current_direction(),
            self.interact_pressed_edge,
            self.confirm_pressed_edge,
            self.cancel_pressed_edge,
            self.window_width,
            self.window_height,
        );
        self.interact_pressed_edge = false;
        self.confirm_pressed_edge = false;
        self.cancel_pressed_edge = false;
        snapshot
    }

    fn take_overlay_toggle_pressed(&mut self) -> bool {
        let was_pressed = self.overlay_toggle_pressed_edge;
        self.overlay_toggle_pressed_edge = false;
        was_pressed
    }

    fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        let dropped_backlog = accumulator;
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
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
    use super::*;

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn last_pressed_direction_wins() {
        let mut input = InputCollector::default();
        input.handle_direction_key(Direction::Up, true);
        input.handle_direction_key(Direction::Left, true);

        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Left));
    }

    #[test]
    fn releasing_current_direction_falls_back_to_previous_held() {
        let mut input = InputCollector::default();
        input.handle_direction_key(Direction::Up, true);
        input.handle_direction_key(Direction::Left, true);
        input.handle_direction_key(Direction::Left, false);

        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Up));
    }

    #[test]
    fn releasing_all_directions_clears_intent() {
        let mut input = InputCollector::default();
        input.handle_direction_key(Direction::Right, true);
        input.handle_direction_key(Direction::Right, false);

        assert_eq!(input.snapshot_for_tick().direction(), None);
    }

    #[test]
    fn key_repeat_does_not_reorder_held_stack() {
        let mut input = InputCollector::default();
        input.handle_direction_key(Direction::Up, true);
        input.handle_direction_key(Direction::Left, true);
        // OS key repeat re-delivers the first press.
        input.handle_direction_key(Direction::Up, true);

        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Left));
    }

    #[test]
    fn interact_press_is_edge_triggered_for_single_tick() {
        let mut input = InputCollector::default();
        input.handle_edge_key(InputAction::Interact, true);

        let first = input.snapshot_for_tick();
        let second = input.snapshot_for_tick();

        assert!(first.interact_pressed());
        assert!(!second.interact_pressed());
    }

    #[test]
    fn held_interact_does_not_spam_press_edges() {
        let mut input = InputCollector::default();

        input.handle_edge_key(InputAction::Interact, true);
        let first = input.snapshot_for_tick();

        input.handle_edge_key(InputAction::Interact, true);
        let second = input.snapshot_for_tick();

        input.handle_edge_key(InputAction::Interact, false);
        input.handle_edge_key(InputAction::Interact, true);
        let third = input.snapshot_for_tick();

        assert!(first.interact_pressed());
        assert!(!second.interact_pressed());
        assert!(third.interact_pressed());
    }

    #[test]
    fn confirm_and_cancel_edges_are_independent() {
        let mut input = InputCollector::default();
        input.handle_edge_key(InputAction::Confirm, true);
        input.handle_edge_key(InputAction::Cancel, true);

        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.confirm_pressed());
        assert!(snapshot.cancel_pressed());
        let next = input.snapshot_for_tick();
        assert!(!next.confirm_pressed());
        assert!(!next.cancel_pressed());
    }

    #[test]
    fn overlay_toggle_is_edge_triggered() {
        let mut input = InputCollector::default();

        input.handle_edge_key(InputAction::ToggleOverlay, true);
        assert!(input.take_overlay_toggle_pressed());

        input.handle_edge_key(InputAction::ToggleOverlay, true);
        assert!(!input.take_overlay_toggle_pressed());

        input.handle_edge_key(InputAction::ToggleOverlay, false);
        input.handle_edge_key(InputAction::ToggleOverlay, true);
        assert!(input.take_overlay_toggle_pressed());
    }

    #[test]
    fn snapshot_carries_window_size() {
        let mut input = InputCollector::new(1280, 720);
        assert_eq!(input.snapshot_for_tick().window_size(), (1280, 720));
        input.set_window_size(800, 600);
        assert_eq!(input.snapshot_for_tick().window_size(), (800, 600));
    }

    #[test]
    fn target_frame_duration_none_when_cap_off() {
        assert_eq!(target_frame_duration(None), None);
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
