//! Typed publish/subscribe channels owned by the composition root.
//!
//! Each message kind gets its own [`Topic`]. Subscribers receive through a
//! `crossbeam_channel` receiver, so any thread can publish and the
//! simulation loop drains its inbox once per tick.
//!
//! # Example
//!
//! ```
//! use deskpet::bus::MessageBus;
//! use deskpet::messages::InteractEvent;
//!
//! let bus = MessageBus::new();
//! let inbox = bus.interactions.subscribe();
//! bus.interactions.publish(InteractEvent::TouchHead);
//! assert_eq!(inbox.try_recv().unwrap(), InteractEvent::TouchHead);
//! ```

use std::any::type_name;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::messages::{
    FrameSnapshot, InteractEvent, PrepareMessage, ShowMessageBox, TriggerBasicSequence,
};

/// A channel fanning one message kind out to every subscriber.
pub struct Topic<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send> Topic<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `message` to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are forgotten. Returns the
    /// number of deliveries.
    pub fn publish(&self, message: T) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("No receivers for {}", type_name::<T>());
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Every topic of the application.
#[derive(Default)]
pub struct MessageBus {
    pub interactions: Topic<InteractEvent>,
    pub triggers: Topic<TriggerBasicSequence>,
    pub prepare: Topic<PrepareMessage>,
    pub message_boxes: Topic<ShowMessageBox>,
    pub frames: Topic<FrameSnapshot>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
