//! Messages exchanged between the UI side and the simulation thread.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::assets::Activity;
use crate::sheet::SpriteSheetSequence;

/// A discrete user interaction with the pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractEvent {
    TouchHead,
    TouchBody,
    /// Toggles sleep on and off
    Sleep,
    StartDrag { is_moving: bool },
    EndDrag,
}

/// Work to run once a triggered base sequence has finished playing.
pub type PostSequenceTask = Arc<dyn Fn() + Send + Sync>;

/// Force the base layer into a specific phase (startup, idle or shutdown).
#[derive(Clone)]
pub struct TriggerBasicSequence {
    pub target: Activity,
    pub post_sequence_task: Option<PostSequenceTask>,
}

impl TriggerBasicSequence {
    pub fn new(target: Activity) -> Self {
        Self {
            target,
            post_sequence_task: None,
        }
    }

    pub fn with_post_task(mut self, task: impl Fn() + Send + Sync + 'static) -> Self {
        self.post_sequence_task = Some(Arc::new(task));
        self
    }
}

impl fmt::Debug for TriggerBasicSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerBasicSequence")
            .field("target", &self.target)
            .field("post_sequence_task", &self.post_sequence_task.is_some())
            .finish()
    }
}

/// Loading progress for the overlay shown while assets are prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareMessage {
    Progress(String),
    Complete,
}

/// Request to show a blocking message box.
///
/// The receiver signals `closed` once the user has dismissed it.
#[derive(Debug, Clone)]
pub struct ShowMessageBox {
    pub title: String,
    pub text: String,
    pub closed: Option<Sender<()>>,
}

/// The frame the render side should draw next.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub sequence: Arc<SpriteSheetSequence>,
    pub index: usize,
}
