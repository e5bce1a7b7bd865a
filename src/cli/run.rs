//! Headless run command
//!
//! Spawns the simulation thread and plays the part of the UI: it shows
//! loading progress, answers message boxes, draws every new frame onto a
//! surface and feeds scripted interactions to the pet. Once the requested
//! duration has elapsed the pet is sent into its shutdown animation, and
//! the loop ends when the simulation thread does.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::assets::Activity;
use crate::bus::{CancellationToken, MessageBus};
use crate::clock::FixedClock;
use crate::config::DeskpetConfig;
use crate::logic::{LogicSettings, PetLogic};
use crate::messages::{
    FrameSnapshot, InteractEvent, PrepareMessage, ShowMessageBox, TriggerBasicSequence,
};
use crate::render::{LogSurface, PngDumpSurface, RenderSurface, Renderer};

/// How long the shutdown animation may take before the loop is cancelled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// An interaction sent at a fixed time after loading completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedEvent {
    pub at_ms: u64,
    pub event: InteractEvent,
}

fn parse_event(name: &str) -> Option<InteractEvent> {
    match name {
        "touch-head" => Some(InteractEvent::TouchHead),
        "touch-body" => Some(InteractEvent::TouchBody),
        "sleep" => Some(InteractEvent::Sleep),
        "drag" => Some(InteractEvent::StartDrag { is_moving: false }),
        "drag-move" => Some(InteractEvent::StartDrag { is_moving: true }),
        "drop" => Some(InteractEvent::EndDrag),
        _ => None,
    }
}

/// Parse a comma-separated interaction script such as
/// `touch-head@500,drag@1200,drop@2500`.
///
/// Events are returned ordered by time; events at the same time keep their
/// written order.
pub fn parse_script(script: &str) -> Result<Vec<ScriptedEvent>, String> {
    let mut events = Vec::new();
    for item in script.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, at) = item
            .split_once('@')
            .ok_or_else(|| format!("'{}' is missing '@<ms>'", item))?;
        let event = parse_event(name.trim()).ok_or_else(|| {
            format!(
                "unknown interaction '{}' (expected touch-head, touch-body, sleep, drag, drag-move or drop)",
                name.trim()
            )
        })?;
        let at_ms = at
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid time in '{}': {}", item, e))?;
        events.push(ScriptedEvent { at_ms, event });
    }
    events.sort_by_key(|e| e.at_ms);
    Ok(events)
}

/// Drain the snapshots received since the last call and draw the newest.
/// Returns how many frames were presented.
///
/// Older snapshots may point at sequences the player has already released.
fn render_pending(
    frames: &Receiver<FrameSnapshot>,
    renderer: &mut Renderer,
    surface: &mut dyn RenderSurface,
) -> u64 {
    let Some(snapshot) = frames.try_iter().last() else {
        return 0;
    };
    match renderer.render(surface, &snapshot) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            warn!("Failed to render {}: {}", snapshot.sequence, e);
            0
        }
    }
}

/// Dismiss a message box right away. Returns whether a waiting sender was
/// told it closed.
fn answer_message_box(message: ShowMessageBox) -> bool {
    let Some(closed) = message.closed else {
        return false;
    };
    if closed.send(()).is_err() {
        debug!("Nobody is waiting for '{}' to close", message.title);
        return false;
    }
    true
}

/// Run the pet headless for `duration_ms` after loading.
pub fn run_pet(
    config: &DeskpetConfig,
    duration_ms: u64,
    script: Option<&str>,
    dump_dir: Option<&Path>,
    size: u32,
) -> ExitCode {
    let script = match script.map(parse_script).transpose() {
        Ok(script) => script.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: invalid --script: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    if size == 0 {
        eprintln!("Error: --size must be positive");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let mut surface: Box<dyn RenderSurface> = match dump_dir {
        Some(dir) => Box::new(PngDumpSurface::new(dir, (size, size))),
        None => Box::new(LogSurface::new((size, size))),
    };

    let bus = Arc::new(MessageBus::new());
    let frames = bus.frames.subscribe();
    let prepare = bus.prepare.subscribe();
    let message_boxes = bus.message_boxes.subscribe();
    let cancel = CancellationToken::new();

    let settings = LogicSettings::from_config(config);
    let handle = match PetLogic::spawn(settings, Arc::clone(&bus), cancel.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut clock = FixedClock::new(Duration::from_millis(config.playback.render_interval_ms));
    let mut renderer = Renderer::new();
    let mut pending = script.into_iter().peekable();
    let mut loaded_at: Option<Instant> = None;
    let mut shutdown_at: Option<Instant> = None;
    let mut rendered = 0u64;

    while !handle.is_finished() {
        for message in prepare.try_iter() {
            match message {
                PrepareMessage::Progress(text) => info!("{}", text),
                PrepareMessage::Complete => {
                    info!("Loaded");
                    loaded_at = Some(Instant::now());
                }
            }
        }
        for message in message_boxes.try_iter() {
            eprintln!("[{}] {}", message.title, message.text);
            answer_message_box(message);
        }

        rendered += render_pending(&frames, &mut renderer, surface.as_mut());

        if let Some(start) = loaded_at {
            let elapsed = start.elapsed();
            while let Some(scripted) = pending.next_if(|e| e.at_ms <= elapsed.as_millis() as u64) {
                info!("Sending {:?} at {}ms", scripted.event, scripted.at_ms);
                bus.interactions.publish(scripted.event);
            }

            match shutdown_at {
                None if elapsed >= Duration::from_millis(duration_ms) => {
                    info!("Shutting down");
                    let token = cancel.clone();
                    bus.triggers.publish(
                        TriggerBasicSequence::new(Activity::Shutdown)
                            .with_post_task(move || token.cancel()),
                    );
                    shutdown_at = Some(Instant::now());
                }
                Some(at) if at.elapsed() >= SHUTDOWN_GRACE => {
                    warn!("Shutdown animation did not finish, stopping");
                    handle.cancel();
                }
                _ => {}
            }
        }

        clock.tick();
    }
    rendered += render_pending(&frames, &mut renderer, surface.as_mut());

    match handle.join() {
        Ok(stats) => {
            println!(
                "Ran {} ticks, {} interactions, {} frames published, {} rendered",
                stats.ticks, stats.interactions, stats.frames_published, rendered
            );
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
