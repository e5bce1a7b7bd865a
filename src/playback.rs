//! Frame-accurate playback of one sprite sheet sequence.
//!
//! The player is driven by elapsed wall-clock deltas. It accumulates time,
//! advances one frame per elapsed frame delay and reports how many times the
//! sequence reached its end during the tick.

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::sheet::{SpriteSheetFrame, SpriteSheetSequence};

/// Ticks longer than this are treated as a stall and dropped.
pub const DEFAULT_ANOMALY_THRESHOLD_MS: f64 = 1000.0;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum PlaybackError {
    #[error("Speed multiplier must be a finite value >= 0, got {0}")]
    InvalidSpeed(f64),
}

/// What happened during one [`SpriteSheetPlayer::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Frames advanced, including wrap-arounds
    pub advanced: usize,
    /// Times the sequence reached its end
    pub completions: usize,
    /// The delta was discarded as anomalous
    pub rejected: bool,
}

impl TickOutcome {
    pub fn completed(&self) -> bool {
        self.completions > 0
    }

    pub fn frame_changed(&self) -> bool {
        self.advanced > 0
    }
}

/// Plays one sequence at a time.
#[derive(Debug)]
pub struct SpriteSheetPlayer {
    sheet: Option<Arc<SpriteSheetSequence>>,
    index: usize,
    elapsed_ms: f64,
    playing: bool,
    repeat: bool,
    finished: bool,
    speed: f64,
    anomaly_threshold_ms: f64,
}

impl Default for SpriteSheetPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpriteSheetPlayer {
    pub fn new() -> Self {
        Self {
            sheet: None,
            index: 0,
            elapsed_ms: 0.0,
            playing: false,
            repeat: false,
            finished: false,
            speed: 1.0,
            anomaly_threshold_ms: DEFAULT_ANOMALY_THRESHOLD_MS,
        }
    }

    pub fn with_anomaly_threshold(mut self, threshold_ms: f64) -> Self {
        self.anomaly_threshold_ms = threshold_ms;
        self
    }

    /// Start `sheet` from its first frame.
    ///
    /// The sequence being replaced gives its decoded atlas back right away
    /// when its resource supports unloading.
    pub fn play(&mut self, sheet: Arc<SpriteSheetSequence>, repeat: bool) {
        if let Some(previous) = self.sheet.take() {
            if !Arc::ptr_eq(&previous, &sheet) && previous.release_sprite() {
                debug!("Released atlas of {}", previous.name());
            }
        }
        self.sheet = Some(sheet);
        self.index = 0;
        self.elapsed_ms = 0.0;
        self.repeat = repeat;
        self.finished = false;
        self.playing = true;
    }

    /// Stop playback and release the current sheet.
    pub fn stop(&mut self) {
        if let Some(previous) = self.sheet.take() {
            previous.release_sprite();
        }
        self.playing = false;
        self.finished = false;
        self.index = 0;
        self.elapsed_ms = 0.0;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn resume(&mut self) {
        self.playing = self.sheet.is_some();
    }

    pub fn set_speed_multiplier(&mut self, speed: f64) -> Result<(), PlaybackError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed
    }

    /// Advance by `delta_ms` of wall-clock time.
    pub fn tick(&mut self, delta_ms: f64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.playing || self.finished {
            return outcome;
        }
        if delta_ms > self.anomaly_threshold_ms {
            warn!("Dropping anomalous tick of {:.0}ms", delta_ms);
            outcome.rejected = true;
            return outcome;
        }
        let Some(sheet) = self.sheet.clone() else {
            return outcome;
        };
        let count = sheet.cell_counts();
        if count == 0 {
            return outcome;
        }

        self.elapsed_ms += delta_ms.max(0.0) * self.speed;
        while let Some(frame) = sheet.try_get_frame(self.index) {
            let delay = frame.delay_ms as f64;
            if self.elapsed_ms < delay {
                break;
            }
            self.elapsed_ms -= delay;

            if self.index + 1 < count {
                self.index += 1;
                outcome.advanced += 1;
                continue;
            }

            outcome.completions += 1;
            debug!("Sequence {} reached its end", sheet.name());
            if !self.repeat {
                self.finished = true;
                self.elapsed_ms = 0.0;
                break;
            }
            self.index = 0;
            outcome.advanced += 1;
            // A zero-length sequence would wrap forever within one tick.
            if sheet.duration_ms() == 0 {
                break;
            }
        }
        outcome
    }

    pub fn sheet(&self) -> Option<&Arc<SpriteSheetSequence>> {
        self.sheet.as_ref()
    }

    pub fn current_frame(&self) -> Option<&SpriteSheetFrame> {
        self.sheet.as_ref()?.try_get_frame(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.finished
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }
}
