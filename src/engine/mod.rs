//! The rotation engine's event loop
//!
//! One task owns every piece of rotation state and reacts to five inputs in a
//! single `select!`: a 1-second tick, the board-duration deadline, the
//! crossfade deadline, image-load completions, and operator commands. All
//! timers live here as plain deadlines; the state machines below the loop
//! stay pure and synchronous.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::background::{BackgroundCoordinator, BackgroundLayers, ImageEvent, ImageLoader};
use crate::cache::{BoardCache, CacheSnapshot};
use crate::config::Config;
use crate::countdown::{extract_sunrise, CountdownEdge, CountdownMonitor, CountdownState};
use crate::models::BoardInstance;
use crate::rotation::{RotationController, TimerAction};
use crate::schedule::{evaluate_schedule, ScheduleEntry};

// ============================================================================
// Render boundary
// ============================================================================

/// Everything the renderer needs to draw one moment of the display
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    /// The board on screen; `None` renders the empty-playlist holding view
    pub board: Option<BoardInstance>,
    pub background: BackgroundLayers,
    pub countdown: CountdownState,
    pub font_scale: f32,
    /// Board transition speed for the renderer's enter/exit animation
    pub transition: Duration,
    /// True while no data has ever been loaded (cold start, backend down)
    pub loading: bool,
}

/// Output boundary of the engine; the UI process implements this
pub trait RenderSink: Send + Sync {
    fn render(&self, frame: &DisplayFrame);
}

/// Sink that logs frames instead of drawing them; headless runs and smoke tests
pub struct LogRenderer;

impl RenderSink for LogRenderer {
    fn render(&self, frame: &DisplayFrame) {
        let slide = frame.board.as_ref().map(|b| b.slide_key.as_str());
        tracing::debug!(
            slide = slide.unwrap_or("-"),
            countdown = frame.countdown.active,
            loading = frame.loading,
            "frame"
        );
    }
}

// ============================================================================
// Operator control
// ============================================================================

/// Manual overrides accepted while the display rotates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Next,
    Previous,
    JumpTo(String),
    Refresh,
}

/// Handles for steering and stopping a running engine
pub struct EngineHandle {
    pub control: mpsc::Sender<ControlCommand>,
    pub shutdown: oneshot::Sender<()>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    cache: Arc<BoardCache>,
    entries: Vec<ScheduleEntry>,
    state: LoopState,
    image_rx: mpsc::Receiver<ImageEvent>,
    control_rx: mpsc::Receiver<ControlCommand>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl Engine {
    pub fn new(
        config: &Config,
        cache: Arc<BoardCache>,
        entries: Vec<ScheduleEntry>,
        loader: Arc<dyn ImageLoader>,
        sink: Box<dyn RenderSink>,
    ) -> (Self, EngineHandle) {
        let theme = crate::background::ThemePreset::by_name(&config.display.theme_preset);
        let (background, image_rx) =
            BackgroundCoordinator::new(loader, theme, config.crossfade());
        let (control_tx, control_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let engine = Self {
            cache: cache.clone(),
            entries,
            state: LoopState {
                cache,
                controller: RotationController::new(),
                monitor: CountdownMonitor::new(&config.countdown),
                background,
                sink,
                font_scale: config.display.font_scale,
                transition: Duration::from_millis(config.display.transition_ms),
                snapshot: None,
                countdown: CountdownState::inactive(),
                last_key: None,
            },
            image_rx,
            control_rx,
            shutdown_rx,
        };

        let handle = EngineHandle {
            control: control_tx,
            shutdown: shutdown_tx,
        };
        (engine, handle)
    }

    /// Run until the shutdown handle fires
    pub async fn run(self) {
        let Self {
            cache,
            entries,
            mut state,
            mut image_rx,
            mut control_rx,
            mut shutdown_rx,
        } = self;

        let mut updates = cache.subscribe();
        let snapshot = cache.ensure_loaded().await;
        state.adopt_snapshot(snapshot);

        let mut board_deadline: Option<Instant> = None;
        let mut fade_deadline: Option<Instant> = None;

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(entries = entries.len(), "rotation engine started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("rotation engine stopping");
                    break;
                }

                _ = ticker.tick() => {
                    state.on_tick(&entries, &mut board_deadline, &mut fade_deadline);
                }

                _ = sleep_deadline(board_deadline), if board_deadline.is_some() => {
                    let action = state.controller.on_timer_fired();
                    apply_timer(action, &mut board_deadline);
                    state.after_transition(&mut fade_deadline);
                }

                _ = sleep_deadline(fade_deadline), if fade_deadline.is_some() => {
                    state.background.clear_previous();
                    fade_deadline = None;
                    state.render();
                }

                Some(event) = image_rx.recv() => {
                    if let Some(fade) = state.background.on_image_event(event) {
                        fade_deadline = Some(Instant::now() + fade);
                    }
                    state.render();
                }

                Some(command) = control_rx.recv() => {
                    state.on_command(command, &entries, &mut board_deadline, &mut fade_deadline).await;
                }

                Ok(snapshot) = updates.recv() => {
                    state.adopt_snapshot(snapshot);
                    state.reevaluate(&entries, &mut board_deadline, &mut fade_deadline);
                }
            }
        }
    }
}

/// Mutable loop state shared by all select arms
struct LoopState {
    cache: Arc<BoardCache>,
    controller: RotationController,
    monitor: CountdownMonitor,
    background: BackgroundCoordinator,
    sink: Box<dyn RenderSink>,
    font_scale: f32,
    transition: Duration,
    snapshot: Option<Arc<CacheSnapshot>>,
    countdown: CountdownState,
    /// Slide key last handed to the background coordinator
    last_key: Option<String>,
}

impl LoopState {
    fn adopt_snapshot(&mut self, snapshot: Arc<CacheSnapshot>) {
        self.monitor.set_sunrise(extract_sunrise(&snapshot).as_deref());
        self.snapshot = Some(snapshot);
    }

    /// The 1-second heartbeat: recompute countdown, schedule and timers
    fn on_tick(
        &mut self,
        entries: &[ScheduleEntry],
        board_deadline: &mut Option<Instant>,
        fade_deadline: &mut Option<Instant>,
    ) {
        let now = Local::now().naive_local();
        let (countdown, edge) = self.monitor.tick(now);
        self.countdown = countdown;

        if let Some(snapshot) = self.snapshot.clone() {
            let boards = evaluate_schedule(entries, now, &snapshot, countdown.active);
            let action = self.controller.set_boards(boards);
            apply_timer(action, board_deadline);
        }

        match edge {
            Some(CountdownEdge::Entered) => {
                tracing::info!("countdown window entered, suspending rotation");
                let action = self.controller.on_countdown_entered();
                apply_timer(action, board_deadline);
            }
            Some(CountdownEdge::Exited) => {
                tracing::info!("countdown window exited, restarting rotation");
                let action = self.controller.on_countdown_exited();
                apply_timer(action, board_deadline);
            }
            None => {}
        }

        self.after_transition(fade_deadline);
    }

    /// Re-run evaluation outside the tick, after snapshot or command changes
    fn reevaluate(
        &mut self,
        entries: &[ScheduleEntry],
        board_deadline: &mut Option<Instant>,
        fade_deadline: &mut Option<Instant>,
    ) {
        let Some(snapshot) = self.snapshot.clone() else {
            return;
        };
        let now = Local::now().naive_local();
        let boards = evaluate_schedule(entries, now, &snapshot, self.countdown.active);
        let action = self.controller.set_boards(boards);
        apply_timer(action, board_deadline);
        self.after_transition(fade_deadline);
    }

    async fn on_command(
        &mut self,
        command: ControlCommand,
        entries: &[ScheduleEntry],
        board_deadline: &mut Option<Instant>,
        fade_deadline: &mut Option<Instant>,
    ) {
        tracing::info!(?command, "operator command");
        let action = match command {
            ControlCommand::Next => self.controller.next(),
            ControlCommand::Previous => self.controller.previous(),
            ControlCommand::JumpTo(key) => self.controller.jump_to(&key),
            ControlCommand::Refresh => {
                let snapshot = self.cache.force_refresh().await;
                self.adopt_snapshot(snapshot);
                self.reevaluate(entries, board_deadline, fade_deadline);
                return;
            }
        };
        apply_timer(action, board_deadline);
        self.after_transition(fade_deadline);
    }

    /// Notify the background coordinator on board changes, then render
    fn after_transition(&mut self, fade_deadline: &mut Option<Instant>) {
        let current = self.controller.current().cloned();
        let key = current.as_ref().map(|b| b.slide_key.clone());

        if key != self.last_key {
            if let Some(board) = &current {
                if let Some(fade) = self.background.on_board_change(board) {
                    *fade_deadline = Some(Instant::now() + fade);
                }
            }
            let upcoming = self.controller.upcoming(2);
            self.background.preload(&upcoming);
            self.last_key = key;
        }

        self.render();
    }

    fn render(&self) {
        let frame = DisplayFrame {
            board: self.controller.current().cloned(),
            background: self.background.layers(),
            countdown: self.countdown,
            font_scale: self.font_scale,
            transition: self.transition,
            loading: self.snapshot.as_ref().map_or(true, |s| s.is_empty()),
        };
        self.sink.render(&frame);
    }
}

fn apply_timer(action: TimerAction, deadline: &mut Option<Instant>) {
    match action {
        TimerAction::Keep => {}
        TimerAction::Arm(duration) => *deadline = Some(Instant::now() + duration),
        TimerAction::Cancel => *deadline = None,
    }
}

async fn sleep_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
