//! Interactive actions: the per-action flow, the action stack and the
//! base layer underneath it.

mod base;
mod flow;
mod stack;

pub use base::{BaseActionFlow, BaseQueue, BASE_ACTIVITIES};
pub use flow::{
    ActionFlow, AnimationState, FlowQueue, FlowSignal, LoopEndHandler, LoopExitPredicate,
    MissingSequence, PhaseSuppliers, SequenceSupplier,
};
pub use stack::{ActionId, ActionStack, StackEvent};

use crate::assets::PetState;

/// Mutable pet state shared by every action on the simulation thread.
#[derive(Debug)]
pub struct PetContext {
    pub pet_state: PetState,
    /// Another head touch arrived while the touch loop was playing
    pub head_touch_pending: bool,
    pub body_touch_pending: bool,
    pub dragging: bool,
    /// The drag loop should use the moving animation
    pub drag_moving: bool,
    pub sleeping: bool,
    pub rng: fastrand::Rng,
}

impl Default for PetContext {
    fn default() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }
}

impl PetContext {
    /// Context with a caller-provided generator, e.g. a seeded one.
    pub fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            pet_state: PetState::Normal,
            head_touch_pending: false,
            body_touch_pending: false,
            dragging: false,
            drag_moving: false,
            sleeping: false,
            rng,
        }
    }
}
