//! Three-phase action state machine.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use super::PetContext;
use crate::assets::Transition;
use crate::bus::CancellationToken;
use crate::sheet::SpriteSheetSequence;

/// Lifecycle of an action: `Initial -> OnStart -> OnLoop -> OnEnd -> Initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationState {
    #[default]
    Initial,
    OnStart,
    OnLoop,
    OnEnd,
}

impl AnimationState {
    /// Sequence transition played in this state.
    pub fn transition(self) -> Option<Transition> {
        match self {
            AnimationState::Initial => None,
            AnimationState::OnStart => Some(Transition::Start),
            AnimationState::OnLoop => Some(Transition::Loop),
            AnimationState::OnEnd => Some(Transition::End),
        }
    }
}

/// Picks the sequence for one phase.
pub type SequenceSupplier =
    Box<dyn FnMut(&mut PetContext) -> Option<Arc<SpriteSheetSequence>> + Send>;

/// Evaluated once per completed loop; `true` moves the action to its end.
pub type LoopExitPredicate = Box<dyn FnMut(&mut PetContext) -> bool + Send>;

/// Runs once, the next time the loop phase completes.
pub type LoopEndHandler = Box<dyn FnOnce(&mut PetContext) + Send>;

/// Sequence suppliers for the three phases.
pub struct PhaseSuppliers {
    pub start: SequenceSupplier,
    pub looping: SequenceSupplier,
    pub end: SequenceSupplier,
}

impl PhaseSuppliers {
    pub fn new(
        start: impl FnMut(&mut PetContext) -> Option<Arc<SpriteSheetSequence>> + Send + 'static,
        looping: impl FnMut(&mut PetContext) -> Option<Arc<SpriteSheetSequence>> + Send + 'static,
        end: impl FnMut(&mut PetContext) -> Option<Arc<SpriteSheetSequence>> + Send + 'static,
    ) -> Self {
        Self {
            start: Box::new(start),
            looping: Box::new(looping),
            end: Box::new(end),
        }
    }
}

/// Tells the owner what a flow operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// The end phase finished; the action should be popped
    ReachedEnd,
    /// The queued sequence is obsolete and should be replayed
    Invalidated,
}

/// The sequence an action wants played right now.
#[derive(Debug, Clone)]
pub struct FlowQueue {
    pub sequence: Arc<SpriteSheetSequence>,
    pub phase: AnimationState,
    /// Distinguishes this queue from earlier ones of the same flow.
    pub generation: u64,
}

/// No sequence was available for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingSequence(pub AnimationState);

impl fmt::Display for MissingSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no sequence for phase {:?}", self.0)
    }
}

/// One interactive action.
pub struct ActionFlow {
    name: String,
    can_interrupt: bool,
    state: AnimationState,
    suppliers: PhaseSuppliers,
    should_exit_loop: LoopExitPredicate,
    loop_end_handlers: VecDeque<LoopEndHandler>,
    queue: Option<FlowQueue>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl ActionFlow {
    pub fn new(
        name: impl Into<String>,
        can_interrupt: bool,
        suppliers: PhaseSuppliers,
        should_exit_loop: impl FnMut(&mut PetContext) -> bool + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            can_interrupt,
            state: AnimationState::Initial,
            suppliers,
            should_exit_loop: Box::new(should_exit_loop),
            loop_end_handlers: VecDeque::new(),
            queue: None,
            generation: 0,
            cancel: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_interrupt(&self) -> bool {
        self.can_interrupt
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    /// Observe `token` from now on.
    pub fn attach(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    pub fn start(&mut self) {
        self.set_state(AnimationState::OnStart);
    }

    pub fn reset(&mut self) {
        self.set_state(AnimationState::Initial);
    }

    fn set_state(&mut self, state: AnimationState) {
        if self.state != state {
            debug!("Action {}: {:?} -> {:?}", self.name, self.state, state);
        }
        self.state = state;
        self.queue = None;
    }

    /// Ask the action to give way to another one.
    ///
    /// A non-interruptible action ignores the request. An interruptible one
    /// drops its queued sequence but keeps its phase.
    pub fn request_interrupt(&mut self) -> Option<FlowSignal> {
        if !self.can_interrupt {
            return None;
        }
        Some(self.invalidate_current_queue())
    }

    /// Skip the rest of the current phase and go to the end phase.
    pub fn request_transit_to_end(&mut self) -> FlowSignal {
        self.set_state(AnimationState::OnEnd);
        FlowSignal::Invalidated
    }

    /// Drop the queued sequence so the next request builds a fresh one.
    pub fn invalidate_current_queue(&mut self) -> FlowSignal {
        self.queue = None;
        FlowSignal::Invalidated
    }

    pub fn put_one_loop_end_handler(
        &mut self,
        handler: impl FnOnce(&mut PetContext) + Send + 'static,
    ) {
        self.loop_end_handlers.push_back(Box::new(handler));
    }

    /// Move an interruptible start or loop phase to its end once shutdown
    /// has been requested.
    pub fn observe_cancellation(&mut self) -> Option<FlowSignal> {
        let cancelled = self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        let running = matches!(self.state, AnimationState::OnStart | AnimationState::OnLoop);
        if cancelled && running && self.can_interrupt {
            return Some(self.request_transit_to_end());
        }
        None
    }

    /// The queue for the current phase, building it on first request.
    ///
    /// Returns `Ok(None)` in the `Initial` state.
    pub fn current_queue(
        &mut self,
        ctx: &mut PetContext,
    ) -> Result<Option<&FlowQueue>, MissingSequence> {
        if self.state == AnimationState::Initial {
            return Ok(None);
        }
        if self.queue.is_none() {
            let supplier = match self.state {
                AnimationState::OnStart => &mut self.suppliers.start,
                AnimationState::OnLoop => &mut self.suppliers.looping,
                _ => &mut self.suppliers.end,
            };
            let Some(sequence) = supplier(ctx) else {
                warn!("Action {} has {}", self.name, MissingSequence(self.state));
                return Err(MissingSequence(self.state));
            };
            self.generation += 1;
            self.queue = Some(FlowQueue {
                sequence,
                phase: self.state,
                generation: self.generation,
            });
        }
        Ok(self.queue.as_ref())
    }

    /// Handle completion of the queue with `generation`.
    ///
    /// A completion for anything but the current queue is stale and ignored.
    pub fn complete_queue(&mut self, generation: u64, ctx: &mut PetContext) -> Option<FlowSignal> {
        let phase = match &self.queue {
            Some(queue) if queue.generation == generation => queue.phase,
            _ => {
                debug!("Action {}: ignoring stale completion", self.name);
                return None;
            }
        };
        self.queue = None;

        match phase {
            AnimationState::OnStart => {
                self.set_state(AnimationState::OnLoop);
                None
            }
            AnimationState::OnLoop => {
                while let Some(handler) = self.loop_end_handlers.pop_front() {
                    handler(ctx);
                }
                if (self.should_exit_loop)(ctx) {
                    self.set_state(AnimationState::OnEnd);
                }
                None
            }
            AnimationState::OnEnd => Some(FlowSignal::ReachedEnd),
            AnimationState::Initial => None,
        }
    }
}

impl fmt::Debug for ActionFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFlow")
            .field("name", &self.name)
            .field("can_interrupt", &self.can_interrupt)
            .field("state", &self.state)
            .field("queued", &self.queue.as_ref().map(|q| q.generation))
            .finish()
    }
}
