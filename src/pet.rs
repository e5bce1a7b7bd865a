//! The pet: action stack, base layer and playback tied together.
//!
//! [`PetController`] lives on the simulation thread. It decides which
//! sequence plays, feeds the player with elapsed time and routes playback
//! completions back to whichever action or base queue is playing.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::actions::{
    ActionFlow, ActionId, ActionStack, AnimationState, BaseActionFlow, FlowSignal, PetContext,
    PhaseSuppliers, StackEvent,
};
use crate::assets::{Activity, AnimationKey, PetState, Transition};
use crate::bus::CancellationToken;
use crate::gfx::GfxService;
use crate::messages::{FrameSnapshot, InteractEvent, TriggerBasicSequence};
use crate::playback::SpriteSheetPlayer;
use crate::sheet::SpriteSheetSequence;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PetError {
    #[error("No action is bound to {0:?}")]
    UnboundAction(ActionKind),
}

/// The interactive actions a pet supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    TouchHead,
    TouchBody,
    Sleep,
    Drag,
}

/// Sequences grouped by activity, state and transition.
///
/// The library holds no randomness of its own; random picks draw from the
/// caller's generator so a seeded [`PetContext`] makes them reproducible.
#[derive(Default)]
pub struct SequenceLibrary {
    groups: HashMap<(Activity, PetState, Transition), Vec<Arc<SpriteSheetSequence>>>,
}

impl SequenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_gfx(gfx: &GfxService) -> Self {
        let mut library = Self::new();
        for (key, sequence) in gfx.search_sequences_with_keys(|_| true) {
            library.insert(&key, sequence);
        }
        library
    }

    pub fn insert(&mut self, key: &AnimationKey, sequence: Arc<SpriteSheetSequence>) {
        self.groups
            .entry((key.activity, key.state, key.transition))
            .or_default()
            .push(sequence);
    }

    pub fn all(
        &self,
        activity: Activity,
        state: PetState,
        transition: Transition,
    ) -> &[Arc<SpriteSheetSequence>] {
        self.groups
            .get(&(activity, state, transition))
            .map_or(&[], Vec::as_slice)
    }

    pub fn first(
        &self,
        activity: Activity,
        state: PetState,
        transition: Transition,
    ) -> Option<Arc<SpriteSheetSequence>> {
        self.all(activity, state, transition).first().cloned()
    }

    pub fn random(
        &self,
        activity: Activity,
        state: PetState,
        transition: Transition,
        rng: &mut fastrand::Rng,
    ) -> Option<Arc<SpriteSheetSequence>> {
        let candidates = self.all(activity, state, transition);
        if candidates.is_empty() {
            return None;
        }
        Some(Arc::clone(&candidates[rng.usize(..candidates.len())]))
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Supplier that picks from the library for `activity` and `transition`
/// in the pet's current state.
fn pick(
    library: &Arc<SequenceLibrary>,
    activity: Activity,
    transition: Transition,
    random: bool,
) -> impl FnMut(&mut PetContext) -> Option<Arc<SpriteSheetSequence>> + Send + 'static {
    let library = Arc::clone(library);
    move |ctx| {
        if random {
            library.random(activity, ctx.pet_state, transition, &mut ctx.rng)
        } else {
            library.first(activity, ctx.pet_state, transition)
        }
    }
}

/// The standard action set: head and body touch, drag and sleep.
pub fn standard_actions(library: &Arc<SequenceLibrary>) -> Vec<(ActionKind, ActionFlow)> {
    let touch_head = ActionFlow::new(
        "TouchHead",
        true,
        PhaseSuppliers::new(
            pick(library, Activity::TouchHead, Transition::Start, false),
            pick(library, Activity::TouchHead, Transition::Loop, false),
            pick(library, Activity::TouchHead, Transition::End, false),
        ),
        |ctx: &mut PetContext| !std::mem::take(&mut ctx.head_touch_pending),
    );

    let touch_body = ActionFlow::new(
        "TouchBody",
        true,
        PhaseSuppliers::new(
            pick(library, Activity::TouchBody, Transition::Start, true),
            pick(library, Activity::TouchBody, Transition::Loop, true),
            pick(library, Activity::TouchBody, Transition::End, true),
        ),
        |ctx: &mut PetContext| !std::mem::take(&mut ctx.body_touch_pending),
    );

    let moving = Arc::clone(library);
    let drag = ActionFlow::new(
        "Drag",
        true,
        PhaseSuppliers::new(
            pick(library, Activity::RaisedStatic, Transition::Start, false),
            move |ctx: &mut PetContext| {
                if ctx.drag_moving {
                    moving.random(
                        Activity::RaisedDynamic,
                        ctx.pet_state,
                        Transition::Single,
                        &mut ctx.rng,
                    )
                } else {
                    moving.first(Activity::RaisedStatic, ctx.pet_state, Transition::Loop)
                }
            },
            pick(library, Activity::RaisedStatic, Transition::End, false),
        ),
        |ctx: &mut PetContext| !ctx.dragging,
    );

    let sleep = ActionFlow::new(
        "Sleep",
        false,
        PhaseSuppliers::new(
            pick(library, Activity::Sleep, Transition::Start, true),
            pick(library, Activity::Sleep, Transition::Loop, true),
            pick(library, Activity::Sleep, Transition::End, true),
        ),
        |ctx: &mut PetContext| !ctx.sleeping,
    );

    vec![
        (ActionKind::TouchHead, touch_head),
        (ActionKind::TouchBody, touch_body),
        (ActionKind::Drag, drag),
        (ActionKind::Sleep, sleep),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueSource {
    Action(ActionId),
    Base,
}

#[derive(Debug, Clone)]
struct Playing {
    source: QueueSource,
    generation: u64,
}

/// Coordinates the action stack, the base layer and the player.
pub struct PetController {
    stack: ActionStack,
    base: BaseActionFlow,
    player: SpriteSheetPlayer,
    playing: Option<Playing>,
    ctx: PetContext,
    cancel: CancellationToken,
    bindings: HashMap<ActionKind, ActionId>,
}

impl PetController {
    pub fn new(
        base: BaseActionFlow,
        ctx: PetContext,
        player: SpriteSheetPlayer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stack: ActionStack::new(),
            base,
            player,
            playing: None,
            ctx,
            cancel,
            bindings: HashMap::new(),
        }
    }

    /// Register `flow` and bind it to `kind`.
    pub fn register(&mut self, kind: ActionKind, flow: ActionFlow) -> ActionId {
        let id = self.stack.register(flow);
        self.bindings.insert(kind, id);
        id
    }

    pub fn action(&self, kind: ActionKind) -> Result<ActionId, PetError> {
        self.bindings
            .get(&kind)
            .copied()
            .ok_or(PetError::UnboundAction(kind))
    }

    pub fn stack(&self) -> &ActionStack {
        &self.stack
    }

    pub fn context(&self) -> &PetContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut PetContext {
        &mut self.ctx
    }

    pub fn player(&self) -> &SpriteSheetPlayer {
        &self.player
    }

    /// Change the pet's state; the base layer picks new sequences.
    pub fn set_pet_state(&mut self, state: PetState) {
        if self.ctx.pet_state == state {
            return;
        }
        self.ctx.pet_state = state;
        self.base.invalidate();
        if self.stack.is_empty() {
            self.try_play_next();
        }
    }

    /// Put `id` on top of the stack and play it.
    ///
    /// Asking for the action already on top does nothing unless it is
    /// ending, in which case it starts over.
    pub fn try_do_action(&mut self, id: ActionId) {
        if self.stack.top() == Some(id) {
            if self.stack.flow(id).state() != AnimationState::OnEnd {
                return;
            }
            debug!("Restarting ending action {}", self.stack.flow(id).name());
            self.activate(id);
            self.try_play_next();
            return;
        }
        let event = self.stack.push(id);
        self.handle_stack_event(event);
        self.try_play_next();
    }

    pub fn request_transit_to_end(&mut self, id: ActionId) {
        let signal = self.stack.flow_mut(id).request_transit_to_end();
        self.on_flow_signal(id, signal);
    }

    pub fn invalidate_action(&mut self, id: ActionId) {
        let signal = self.stack.flow_mut(id).invalidate_current_queue();
        self.on_flow_signal(id, signal);
    }

    pub fn put_one_loop_end_handler(
        &mut self,
        id: ActionId,
        handler: impl FnOnce(&mut PetContext) + Send + 'static,
    ) {
        self.stack.flow_mut(id).put_one_loop_end_handler(handler);
    }

    /// Force the base layer into a phase.
    pub fn trigger_basic(&mut self, message: TriggerBasicSequence) {
        self.base.trigger(message, &mut self.ctx);
        self.try_play_next();
    }

    /// Apply one user interaction.
    pub fn interact(&mut self, event: InteractEvent) -> Result<(), PetError> {
        debug!("Interaction {:?}", event);
        match event {
            InteractEvent::TouchHead => {
                let id = self.action(ActionKind::TouchHead)?;
                self.try_do_action(id);
                self.ctx.head_touch_pending = true;
            }
            InteractEvent::TouchBody => {
                let id = self.action(ActionKind::TouchBody)?;
                self.try_do_action(id);
                self.ctx.body_touch_pending = true;
            }
            InteractEvent::Sleep => {
                let id = self.action(ActionKind::Sleep)?;
                if self.ctx.sleeping {
                    self.ctx.sleeping = false;
                    self.request_transit_to_end(id);
                } else {
                    self.try_do_action(id);
                    self.ctx.sleeping = true;
                }
            }
            InteractEvent::StartDrag { is_moving } => {
                let id = self.action(ActionKind::Drag)?;
                let running = self.stack.flow(id).state() != AnimationState::Initial;
                if is_moving && running && !self.ctx.drag_moving {
                    self.ctx.drag_moving = true;
                    self.put_one_loop_end_handler(id, |ctx| ctx.drag_moving = false);
                    self.invalidate_action(id);
                }
                self.try_do_action(id);
                self.ctx.dragging = true;
            }
            InteractEvent::EndDrag => {
                let id = self.action(ActionKind::Drag)?;
                self.ctx.dragging = false;
                self.ctx.drag_moving = false;
                self.request_transit_to_end(id);
            }
        }
        Ok(())
    }

    /// Advance by `delta_ms`. Returns whether the visible frame changed.
    pub fn update(&mut self, delta_ms: f64) -> bool {
        let mut signals = Vec::new();
        for (id, flow) in self.stack.flows_mut() {
            if let Some(signal) = flow.observe_cancellation() {
                signals.push((id, signal));
            }
        }
        let mut changed = false;
        for (id, signal) in signals {
            changed |= self.on_flow_signal(id, signal);
        }

        let outcome = self.player.tick(delta_ms);
        changed |= outcome.frame_changed();
        if outcome.completed() {
            changed |= self.on_playback_completed();
        }
        if self.playing.is_none() && self.try_play_next() {
            changed = true;
        }
        changed
    }

    /// The frame the render side should show.
    pub fn snapshot(&self) -> Option<FrameSnapshot> {
        let sequence = self.player.sheet()?;
        Some(FrameSnapshot {
            sequence: Arc::clone(sequence),
            index: self.player.index(),
        })
    }

    pub fn current_sequence(&self) -> Option<&Arc<SpriteSheetSequence>> {
        self.player.sheet()
    }

    fn activate(&mut self, id: ActionId) {
        let cancel = self.cancel.clone();
        let flow = self.stack.flow_mut(id);
        flow.attach(cancel);
        flow.reset();
        flow.start();
    }

    fn handle_stack_event(&mut self, event: StackEvent) {
        debug!("Stack event {:?}", event);
        match event {
            StackEvent::Pushed(id) => self.activate(id),
            StackEvent::Popped(_) => {
                if let Some(top) = self.stack.top() {
                    self.activate(top);
                }
            }
        }
    }

    /// Returns whether a different sequence started playing.
    fn on_flow_signal(&mut self, id: ActionId, signal: FlowSignal) -> bool {
        match signal {
            FlowSignal::Invalidated => {
                if self.stack.top() != Some(id) {
                    return false;
                }
                self.try_play_next()
            }
            FlowSignal::ReachedEnd => match self.stack.pop_if_top(id) {
                Some(event) => {
                    self.handle_stack_event(event);
                    self.try_play_next()
                }
                None => false,
            },
        }
    }

    fn on_playback_completed(&mut self) -> bool {
        let Some(playing) = self.playing.take() else {
            return false;
        };
        match playing.source {
            QueueSource::Action(id) => {
                let signal = self
                    .stack
                    .flow_mut(id)
                    .complete_queue(playing.generation, &mut self.ctx);
                if let Some(FlowSignal::ReachedEnd) = signal {
                    if let Some(event) = self.stack.pop_if_top(id) {
                        self.handle_stack_event(event);
                    }
                }
            }
            QueueSource::Base => {
                self.base.complete_queue(playing.generation);
            }
        }
        self.try_play_next()
    }

    /// Play whatever should be playing now. Returns whether playback
    /// switched to a new queue.
    fn try_play_next(&mut self) -> bool {
        while let Some(top) = self.stack.top() {
            match self.stack.flow_mut(top).current_queue(&mut self.ctx) {
                Ok(Some(queue)) => {
                    let (sequence, generation) = (Arc::clone(&queue.sequence), queue.generation);
                    return self.play(QueueSource::Action(top), generation, sequence);
                }
                Ok(None) => {
                    // Not started: only reachable through a reset without a start.
                    self.activate(top);
                }
                Err(missing) => {
                    warn!(
                        "Dropping action {} ({})",
                        self.stack.flow(top).name(),
                        missing
                    );
                    self.stack.flow_mut(top).reset();
                    if let Some(event) = self.stack.pop_if_top(top) {
                        self.handle_stack_event(event);
                    }
                }
            }
        }

        match self.base.current_queue(&mut self.ctx) {
            Some(queue) => {
                let (sequence, generation) = (Arc::clone(&queue.sequence), queue.generation);
                self.play(QueueSource::Base, generation, sequence)
            }
            None => {
                if self.playing.is_some() || self.player.sheet().is_some() {
                    self.player.stop();
                }
                self.playing = None;
                false
            }
        }
    }

    fn play(&mut self, source: QueueSource, generation: u64, sequence: Arc<SpriteSheetSequence>) -> bool {
        if let Some(current) = &self.playing {
            if current.source == source && current.generation == generation {
                return false;
            }
        }
        debug!("Playing {} for {:?}", sequence, source);
        self.player.play(sequence, false);
        self.playing = Some(Playing { source, generation });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(name: &str, delays: &[u32]) -> Arc<SpriteSheetSequence> {
        Arc::new(SpriteSheetSequence::from_delays(name, 1, delays))
    }

    fn key(activity: Activity, transition: Transition) -> AnimationKey {
        AnimationKey::new(activity.as_str(), activity, PetState::Normal, transition, 0)
    }

    fn library() -> Arc<SequenceLibrary> {
        let mut library = SequenceLibrary::new();
        for (activity, transitions) in [
            (Activity::TouchHead, &[Transition::Start, Transition::Loop, Transition::End][..]),
            (Activity::Sleep, &[Transition::Start, Transition::Loop, Transition::End][..]),
            (Activity::RaisedStatic, &[Transition::Start, Transition::Loop, Transition::End][..]),
            (Activity::RaisedDynamic, &[Transition::Single][..]),
        ] {
            for &transition in transitions {
                let name = format!("{}_{:?}", activity.as_str(), transition).to_lowercase();
                library.insert(&key(activity, transition), seq(&name, &[100]));
            }
        }
        Arc::new(library)
    }

    fn controller() -> PetController {
        controller_with(PetContext::default(), &library())
    }

    fn controller_with(ctx: PetContext, library: &Arc<SequenceLibrary>) -> PetController {
        let base = BaseActionFlow::new(|state, activity| {
            if state == PetState::Normal {
                vec![seq(activity.as_str(), &[100])]
            } else {
                Vec::new()
            }
        });
        let mut controller = PetController::new(
            base,
            ctx,
            SpriteSheetPlayer::new(),
            CancellationToken::new(),
        );
        for (kind, flow) in standard_actions(library) {
            controller.register(kind, flow);
        }
        controller
    }

    fn playing(controller: &PetController) -> String {
        controller
            .current_sequence()
            .map(|s| s.name().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_base_layer_plays_startup_then_idle() {
        let mut pet = controller();
        pet.update(0.0);
        assert_eq!(playing(&pet), "startup");
        pet.update(100.0);
        assert_eq!(playing(&pet), "commonidle");
    }

    #[test]
    fn test_touch_head_runs_three_phases() {
        let mut pet = controller();
        pet.update(0.0);
        pet.interact(InteractEvent::TouchHead).unwrap();
        assert_eq!(playing(&pet), "touchhead_start");

        pet.update(100.0);
        assert_eq!(playing(&pet), "touchhead_loop");
        // The pending touch keeps the loop going once.
        pet.update(100.0);
        assert_eq!(playing(&pet), "touchhead_loop");
        pet.update(100.0);
        assert_eq!(playing(&pet), "touchhead_end");
        pet.update(100.0);
        assert!(pet.stack().is_empty());
        assert_ne!(playing(&pet), "touchhead_end");
    }

    #[test]
    fn test_repeated_touch_on_top_is_ignored() {
        let mut pet = controller();
        pet.interact(InteractEvent::TouchHead).unwrap();
        let before = pet.player().sheet().cloned();
        pet.interact(InteractEvent::TouchHead).unwrap();
        assert_eq!(pet.stack().len(), 1);
        assert!(Arc::ptr_eq(&before.unwrap(), pet.player().sheet().unwrap()));
    }

    #[test]
    fn test_sleep_is_not_interrupted_by_touch() {
        let mut pet = controller();
        pet.interact(InteractEvent::Sleep).unwrap();
        assert!(pet.context().sleeping);
        assert_eq!(playing(&pet), "sleep_start");

        pet.interact(InteractEvent::TouchHead).unwrap();
        assert_eq!(pet.stack().len(), 2);
        assert_eq!(playing(&pet), "touchhead_start");
        let sleep = pet.action(ActionKind::Sleep).unwrap();
        assert_eq!(pet.stack.flow(sleep).state(), AnimationState::OnStart);

        pet.interact(InteractEvent::Sleep).unwrap();
        assert!(!pet.context().sleeping);
        assert_eq!(pet.stack.flow(sleep).state(), AnimationState::OnEnd);
        // Sleep is not on top, so the touch keeps playing.
        assert_eq!(playing(&pet), "touchhead_start");
    }

    #[test]
    fn test_drag_switches_to_moving_loop() {
        let mut pet = controller();
        pet.interact(InteractEvent::StartDrag { is_moving: false }).unwrap();
        assert_eq!(playing(&pet), "raisedstatic_start");
        pet.update(100.0);
        assert_eq!(playing(&pet), "raisedstatic_loop");

        pet.interact(InteractEvent::StartDrag { is_moving: true }).unwrap();
        assert!(pet.context().drag_moving);
        assert_eq!(playing(&pet), "raiseddynamic_single");

        // One loop later the one-shot handler drops back to the static hold.
        pet.update(100.0);
        assert!(!pet.context().drag_moving);
        assert_eq!(playing(&pet), "raisedstatic_loop");

        pet.interact(InteractEvent::EndDrag).unwrap();
        assert_eq!(playing(&pet), "raisedstatic_end");
        pet.update(100.0);
        assert!(pet.stack().is_empty());
    }

    #[test]
    fn test_ending_action_restarts_when_requested_again() {
        let mut pet = controller();
        pet.interact(InteractEvent::StartDrag { is_moving: false }).unwrap();
        pet.interact(InteractEvent::EndDrag).unwrap();
        assert_eq!(playing(&pet), "raisedstatic_end");

        pet.interact(InteractEvent::StartDrag { is_moving: false }).unwrap();
        assert_eq!(playing(&pet), "raisedstatic_start");
        assert_eq!(pet.stack().len(), 1);
    }

    #[test]
    fn test_cancellation_ends_interruptible_actions() {
        let cancel = CancellationToken::new();
        let base = BaseActionFlow::new(|_, activity| vec![seq(activity.as_str(), &[100])]);
        let mut pet = PetController::new(base, PetContext::default(), SpriteSheetPlayer::new(), cancel.clone());
        for (kind, flow) in standard_actions(&library()) {
            pet.register(kind, flow);
        }

        pet.interact(InteractEvent::TouchHead).unwrap();
        cancel.cancel();
        pet.update(0.0);
        assert_eq!(playing(&pet), "touchhead_end");
    }

    #[test]
    fn test_random_picks_follow_context_seed() {
        let mut library = SequenceLibrary::new();
        for transition in [Transition::Start, Transition::End] {
            library.insert(&key(Activity::Sleep, transition), seq("sleep_edge", &[100]));
        }
        for i in 0..4 {
            library.insert(
                &key(Activity::Sleep, Transition::Loop),
                seq(&format!("sleep_loop_{}", i), &[100]),
            );
        }
        let library = Arc::new(library);

        let run = |seed: u64| {
            let ctx = PetContext::with_rng(fastrand::Rng::with_seed(seed));
            let mut pet = controller_with(ctx, &library);
            pet.interact(InteractEvent::Sleep).unwrap();
            let mut names = Vec::new();
            for _ in 0..30 {
                pet.update(100.0);
                names.push(playing(&pet));
            }
            names
        };

        let first = run(7);
        assert_eq!(first, run(7));
        let loops: std::collections::HashSet<_> =
            first.iter().filter(|n| n.starts_with("sleep_loop_")).collect();
        assert!(loops.len() > 1);
    }

    #[test]
    fn test_missing_sequences_fall_back_to_base() {
        let mut pet = controller();
        pet.interact(InteractEvent::TouchBody).unwrap();
        assert!(pet.stack().is_empty());
        assert_eq!(playing(&pet), "startup");
    }

    #[test]
    fn test_unbound_action() {
        let base = BaseActionFlow::new(|_, _| Vec::new());
        let mut pet = PetController::new(
            base,
            PetContext::default(),
            SpriteSheetPlayer::new(),
            CancellationToken::new(),
        );
        assert!(matches!(
            pet.interact(InteractEvent::Sleep),
            Err(PetError::UnboundAction(ActionKind::Sleep))
        ));
    }
}
