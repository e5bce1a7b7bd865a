//! The simulation thread.
//!
//! [`PetLogic::spawn`] starts a thread named `GameLogic` that first loads
//! every asset (publishing progress on the prepare topic) and then runs the
//! fixed-rate loop: drain interactions and triggers, advance the pet and
//! publish the visible frame whenever it changes.
//!
//! A failed load is reported through a message box and ends the thread
//! with the error once the box is closed.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::actions::{BaseActionFlow, PetContext};
use crate::assets::{AssetPack, PetState, ProviderError, Transition};
use crate::bus::{CancellationToken, MessageBus};
use crate::clock::FixedClock;
use crate::config::DeskpetConfig;
use crate::gfx::{GfxError, GfxService};
use crate::messages::{InteractEvent, PrepareMessage, ShowMessageBox, TriggerBasicSequence};
use crate::pet::{standard_actions, PetController, SequenceLibrary};
use crate::playback::SpriteSheetPlayer;
use crate::sheet::LoadStrategy;

/// Name of the simulation thread.
pub const LOGIC_THREAD_NAME: &str = "GameLogic";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogicError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Gfx(#[from] GfxError),
    #[error("No animation sequences found below {}", .0.display())]
    NoSequences(PathBuf),
    #[error("Failed to spawn the simulation thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("The simulation thread panicked")]
    ThreadPanicked,
}

/// Everything the simulation thread needs to know.
#[derive(Debug, Clone)]
pub struct LogicSettings {
    pub app_root: PathBuf,
    pub pack: String,
    pub gfx_path: Vec<String>,
    /// Provider cache folder holding the atlases
    pub cache_dir: PathBuf,
    pub cell_size: u32,
    pub cache_jobs: usize,
    pub load_strategy: LoadStrategy,
    pub tick: Duration,
    pub anomaly_threshold_ms: f64,
    pub initial_state: PetState,
}

impl LogicSettings {
    pub fn from_config(config: &DeskpetConfig) -> Self {
        Self {
            app_root: config.assets.root.clone(),
            pack: config.assets.pack.clone(),
            gfx_path: config.assets.gfx_path.clone(),
            cache_dir: config.cache.provider_dir(),
            cell_size: config.cache.cell_size,
            cache_jobs: config.cache.jobs,
            load_strategy: config.playback.load_strategy,
            tick: Duration::from_millis(config.simulation.tick_ms),
            anomaly_threshold_ms: config.playback.anomaly_threshold_ms,
            initial_state: PetState::Normal,
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicStats {
    pub ticks: u64,
    pub interactions: u64,
    pub frames_published: u64,
}

/// Handle to a running simulation thread.
#[derive(Debug)]
pub struct LogicHandle {
    thread: JoinHandle<Result<LogicStats, LogicError>>,
    cancel: CancellationToken,
}

impl LogicHandle {
    /// Ask the loop to stop after its current iteration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<LogicStats, LogicError> {
        self.thread.join().map_err(|_| LogicError::ThreadPanicked)?
    }
}

/// Loaded graphics plus the controller built on them.
pub struct PreparedPet {
    pub gfx: GfxService,
    pub controller: PetController,
}

pub struct PetLogic;

impl PetLogic {
    /// Start the simulation thread.
    ///
    /// Topics are subscribed before the thread starts so no message sent
    /// after this returns can be missed.
    pub fn spawn(
        settings: LogicSettings,
        bus: Arc<MessageBus>,
        cancel: CancellationToken,
    ) -> Result<LogicHandle, LogicError> {
        let inbox = Inbox {
            interactions: bus.interactions.subscribe(),
            triggers: bus.triggers.subscribe(),
        };
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name(LOGIC_THREAD_NAME.to_string())
            .spawn(move || run(&settings, &bus, &token, &inbox))
            .map_err(LogicError::Spawn)?;
        Ok(LogicHandle { thread, cancel })
    }
}

struct Inbox {
    interactions: Receiver<InteractEvent>,
    triggers: Receiver<TriggerBasicSequence>,
}

fn progress(bus: &MessageBus, text: impl Into<String>) {
    let text = text.into();
    debug!("{}", text);
    bus.prepare.publish(PrepareMessage::Progress(text));
}

/// Load assets and build the pet controller.
pub fn prepare(
    settings: &LogicSettings,
    bus: &MessageBus,
    cancel: &CancellationToken,
) -> Result<PreparedPet, LogicError> {
    progress(bus, "Loading assets...");
    let pack = AssetPack::locate(&settings.app_root, &settings.pack, &settings.gfx_path)?;
    let mut gfx = GfxService::new().with_cache_jobs(settings.cache_jobs);
    gfx.init(&pack.gfx_root)?;
    gfx.create_sprite_sheet_cache_if_not_exists(&settings.cache_dir, settings.cell_size, &|p: f64| {
        progress(bus, format!("Loading assets... {:.2}%", p * 100.0))
    })?;
    if gfx.create_animation_sequences_info(settings.cell_size)? == 0 {
        return Err(LogicError::NoSequences(pack.gfx_root));
    }

    progress(bus, "Loading sprites...");
    gfx.preload_all_sequences(settings.load_strategy)?;

    progress(bus, "Constructing animation sequences...");
    let library = Arc::new(SequenceLibrary::from_gfx(&gfx));
    let base = BaseActionFlow::new(|state, activity| {
        library.all(activity, state, Transition::Single).to_vec()
    });

    progress(bus, "Loading game logic...");
    let mut ctx = PetContext::default();
    ctx.pet_state = settings.initial_state;
    let player = SpriteSheetPlayer::new().with_anomaly_threshold(settings.anomaly_threshold_ms);
    let mut controller = PetController::new(base, ctx, player, cancel.clone());
    for (kind, flow) in standard_actions(&library) {
        controller.register(kind, flow);
    }

    bus.prepare.publish(PrepareMessage::Complete);
    info!(
        "Loaded {} sequences, {} bytes resident",
        gfx.sequence_count(),
        gfx.total_used_bytes()
    );
    Ok(PreparedPet { gfx, controller })
}

/// Show `err` in a message box and wait until the box is closed.
fn report_load_failure(bus: &MessageBus, err: &LogicError) {
    error!("Failed to prepare the pet: {}", err);
    let (closed, wait) = bounded(1);
    let delivered = bus.message_boxes.publish(ShowMessageBox {
        title: "Error".to_string(),
        text: err.to_string(),
        closed: Some(closed),
    });
    if delivered == 0 {
        warn!("Nobody shows message boxes");
        return;
    }
    // Errors once every receiver dropped the box without answering.
    let _ = wait.recv();
}

fn run(
    settings: &LogicSettings,
    bus: &MessageBus,
    cancel: &CancellationToken,
    inbox: &Inbox,
) -> Result<LogicStats, LogicError> {
    let PreparedPet {
        gfx,
        mut controller,
    } = match prepare(settings, bus, cancel) {
        Ok(prepared) => prepared,
        Err(err) => {
            report_load_failure(bus, &err);
            return Err(err);
        }
    };

    let mut stats = LogicStats::default();
    let mut clock = FixedClock::new(settings.tick);
    let mut delta = 0.0;
    loop {
        for event in inbox.interactions.try_iter() {
            stats.interactions += 1;
            if let Err(err) = controller.interact(event) {
                error!("Interaction {:?} failed: {}", event, err);
            }
        }
        for trigger in inbox.triggers.try_iter() {
            debug!("Trigger {:?}", trigger);
            controller.trigger_basic(trigger);
        }

        let changed = controller.update(delta);
        if changed || stats.ticks == 0 {
            if let Some(snapshot) = controller.snapshot() {
                bus.frames.publish(snapshot);
                stats.frames_published += 1;
            }
        }
        stats.ticks += 1;

        if cancel.is_cancelled() {
            break;
        }
        delta = clock.tick();
    }

    info!(
        "Simulation stopped after {} ticks, {} interactions",
        stats.ticks, stats.interactions
    );
    drop(controller);
    drop(gfx);
    Ok(stats)
}
