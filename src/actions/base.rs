//! Base layer: what plays when no action is on the stack.
//!
//! The base layer cycles through startup, common idle and shutdown
//! sequences for the pet's current state, choosing randomly among the
//! candidates of each.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error};

use super::PetContext;
use crate::assets::{Activity, PetState};
use crate::messages::{PostSequenceTask, TriggerBasicSequence};
use crate::sheet::SpriteSheetSequence;

type Candidates = HashMap<PetState, Vec<Arc<SpriteSheetSequence>>>;

/// Activities the base layer can play.
pub const BASE_ACTIVITIES: [Activity; 3] =
    [Activity::Startup, Activity::CommonIdle, Activity::Shutdown];

/// Queue of the base layer.
#[derive(Clone)]
pub struct BaseQueue {
    pub sequence: Arc<SpriteSheetSequence>,
    pub activity: Activity,
    pub generation: u64,
    post_task: Option<PostSequenceTask>,
}

impl std::fmt::Debug for BaseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseQueue")
            .field("sequence", &self.sequence.name())
            .field("activity", &self.activity)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct BaseActionFlow {
    candidates: HashMap<Activity, Candidates>,
    step: Activity,
    queue: Option<BaseQueue>,
    generation: u64,
}

impl BaseActionFlow {
    /// Collect candidates for every state via `lookup(state, activity)`.
    pub fn new<F>(mut lookup: F) -> Self
    where
        F: FnMut(PetState, Activity) -> Vec<Arc<SpriteSheetSequence>>,
    {
        let mut candidates: HashMap<Activity, Candidates> = HashMap::new();
        for activity in BASE_ACTIVITIES {
            let per_state = candidates.entry(activity).or_default();
            for state in PetState::ALL {
                let found = lookup(state, activity);
                if found.is_empty() {
                    error!("No {} sequence for state {}", activity, state);
                }
                per_state.insert(state, found);
            }
        }
        Self {
            candidates,
            step: Activity::Startup,
            queue: None,
            generation: 0,
        }
    }

    /// Activity the next self-created queue will use.
    pub fn step(&self) -> Activity {
        self.step
    }

    /// Replace the current queue with one for `message.target`.
    ///
    /// Startup and common idle also become the new step; shutdown plays
    /// once and the step stays where it was.
    pub fn trigger(&mut self, message: TriggerBasicSequence, ctx: &mut PetContext) {
        if message.target != Activity::Shutdown {
            self.step = message.target;
        }
        self.queue = self.create_queue(message.target, message.post_sequence_task, ctx);
    }

    /// The queue to play, creating one for the current step if needed.
    pub fn current_queue(&mut self, ctx: &mut PetContext) -> Option<&BaseQueue> {
        if self.queue.is_none() {
            self.queue = self.create_queue(self.step, None, ctx);
            if self.queue.is_some() && self.step == Activity::Startup {
                self.step = Activity::CommonIdle;
            }
        }
        self.queue.as_ref()
    }

    fn create_queue(
        &mut self,
        activity: Activity,
        post_task: Option<PostSequenceTask>,
        ctx: &mut PetContext,
    ) -> Option<BaseQueue> {
        let candidates = self.candidates.get(&activity)?.get(&ctx.pet_state)?;
        if candidates.is_empty() {
            return None;
        }
        let sequence = Arc::clone(&candidates[ctx.rng.usize(..candidates.len())]);
        self.generation += 1;
        debug!("Base layer plays {} ({})", sequence, activity);
        Some(BaseQueue {
            sequence,
            activity,
            generation: self.generation,
            post_task,
        })
    }

    /// Handle completion of the queue with `generation`.
    ///
    /// Runs the queue's post task, if any. Returns `false` for a stale
    /// completion.
    pub fn complete_queue(&mut self, generation: u64) -> bool {
        match &self.queue {
            Some(queue) if queue.generation == generation => {}
            _ => return false,
        }
        if let Some(task) = self.queue.take().and_then(|q| q.post_task) {
            task();
        }
        true
    }

    /// Drop the queue, e.g. after the pet state changed.
    pub fn invalidate(&mut self) {
        self.queue = None;
    }
}
