//! Stack of active actions.
//!
//! Flows live in an arena and are addressed by [`ActionId`]; the stack
//! itself is a list of ids. Every push and pop is reported as a
//! [`StackEvent`] which the owning coordinator handles synchronously.

use log::debug;

use super::flow::{ActionFlow, FlowSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    Pushed(ActionId),
    Popped(ActionId),
}

#[derive(Debug)]
struct StackEntry {
    id: ActionId,
    /// Already invalidated by a push above it
    interrupted: bool,
}

#[derive(Debug, Default)]
pub struct ActionStack {
    arena: Vec<ActionFlow>,
    entries: Vec<StackEntry>,
}

impl ActionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `flow`. It is not on the stack yet.
    pub fn register(&mut self, flow: ActionFlow) -> ActionId {
        self.arena.push(flow);
        ActionId(self.arena.len() - 1)
    }

    pub fn flow(&self, id: ActionId) -> &ActionFlow {
        &self.arena[id.0]
    }

    pub fn flow_mut(&mut self, id: ActionId) -> &mut ActionFlow {
        &mut self.arena[id.0]
    }

    pub fn flows_mut(&mut self) -> impl Iterator<Item = (ActionId, &mut ActionFlow)> {
        self.arena
            .iter_mut()
            .enumerate()
            .map(|(i, flow)| (ActionId(i), flow))
    }

    pub fn top(&self) -> Option<ActionId> {
        self.entries.last().map(|e| e.id)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Ids from bottom to top.
    pub fn ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interrupt entries from the top down.
    ///
    /// The walk stops at the first entry that cannot be interrupted or was
    /// already interrupted by an earlier push.
    pub fn interrupt_from_top(&mut self) -> Vec<(ActionId, FlowSignal)> {
        let mut signals = Vec::new();
        for entry in self.entries.iter_mut().rev() {
            if entry.interrupted {
                break;
            }
            let flow = &mut self.arena[entry.id.0];
            let Some(signal) = flow.request_interrupt() else {
                break;
            };
            debug!("Interrupted action {}", flow.name());
            entry.interrupted = true;
            signals.push((entry.id, signal));
        }
        signals
    }

    /// Push `id` on top, interrupting what is below.
    ///
    /// An action already further down the stack is moved to the top rather
    /// than stacked twice.
    pub fn push(&mut self, id: ActionId) -> StackEvent {
        self.interrupt_from_top();
        self.entries.retain(|e| e.id != id);
        self.entries.push(StackEntry {
            id,
            interrupted: false,
        });
        StackEvent::Pushed(id)
    }

    /// Pop `id` if, and only if, it is the top entry.
    pub fn pop_if_top(&mut self, id: ActionId) -> Option<StackEvent> {
        if self.top() != Some(id) {
            debug!("Ignoring pop of action {:?}, not on top", id);
            return None;
        }
        self.entries.pop();
        if let Some(next) = self.entries.last_mut() {
            next.interrupted = false;
        }
        Some(StackEvent::Popped(id))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
