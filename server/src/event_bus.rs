//! Synchronous, type-keyed publish/subscribe.
//!
//! Each shard owns one bus. Handlers run inline on the publishing thread in
//! subscription order, so everything a tick publishes has been handled by the time
//! the tick returns.

use crate::events::GameEvent;
use log::trace;
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Handler<E> = Box<dyn Fn(&E) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every future `E`.
    pub fn subscribe<E, F>(&mut self, handler: F)
    where
        E: GameEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let slot = self
            .handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Handler<E>>::new()));
        if let Some(list) = slot.downcast_mut::<Vec<Handler<E>>>() {
            list.push(Box::new(handler));
        }
    }

    /// Delivers `event` to every handler for `E`. Returns how many ran.
    pub fn publish<E: GameEvent>(&self, event: &E) -> usize {
        let Some(list) = self
            .handlers
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Vec<Handler<E>>>())
        else {
            trace!("No subscribers for {}", E::event_type());
            return 0;
        };
        for handler in list {
            handler(event);
        }
        list.len()
    }

    pub fn subscriber_count<E: GameEvent>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Vec<Handler<E>>>())
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.handlers.len())
            .finish()
    }
}
