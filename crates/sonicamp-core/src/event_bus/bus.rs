//! Event Bus implementation.
//!
//! Synchronous dispatch to subscribers indexed by event kind and by property
//! name, plus a broadcast channel for async consumers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{EventKind, SonicEvent};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Type alias for event handler functions
type EventHandler = Arc<dyn Fn(&SonicEvent) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for broadcast.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

#[derive(Default)]
struct Subscribers {
    all: Vec<(SubscriptionId, EventHandler)>,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>,
    by_property: HashMap<String, Vec<(SubscriptionId, EventHandler)>>,
}

impl Subscribers {
    fn len(&self) -> usize {
        self.all.len()
            + self.by_kind.values().map(Vec::len).sum::<usize>()
            + self.by_property.values().map(Vec::len).sum::<usize>()
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.len();
        self.all.retain(|(sub, _)| *sub != id);
        for handlers in self.by_kind.values_mut() {
            handlers.retain(|(sub, _)| *sub != id);
        }
        for handlers in self.by_property.values_mut() {
            handlers.retain(|(sub, _)| *sub != id);
        }
        self.by_kind.retain(|_, handlers| !handlers.is_empty());
        self.by_property.retain(|_, handlers| !handlers.is_empty());
        self.len() != before
    }
}

/// Event bus shared by one device session
///
/// Handlers run on the emitting task after the subscriber lock is released,
/// so a handler may itself subscribe or unsubscribe.
pub struct EventBus {
    sender: broadcast::Sender<SonicEvent>,
    subscribers: RwLock<Subscribers>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            subscribers: RwLock::new(Subscribers::default()),
            config,
        }
    }

    /// Dispatch an event to all matching subscribers
    ///
    /// Returns the number of synchronous handlers that were called.
    pub fn emit(&self, event: SonicEvent) -> usize {
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.read();
            let mut handlers: Vec<EventHandler> =
                subscribers.all.iter().map(|(_, h)| h.clone()).collect();
            if let Some(by_kind) = subscribers.by_kind.get(&event.kind()) {
                handlers.extend(by_kind.iter().map(|(_, h)| h.clone()));
            }
            if let Some(by_property) = event
                .property()
                .and_then(|name| subscribers.by_property.get(name))
            {
                handlers.extend(by_property.iter().map(|(_, h)| h.clone()));
            }
            handlers
        };

        tracing::trace!(kind = %event.kind(), "{}", event.description());
        for handler in &handlers {
            handler(&event);
        }

        // no async receivers is not an error
        let _ = self.sender.send(event);
        handlers.len()
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SonicEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.subscribers.write().all.push((id, Arc::new(handler)));
        tracing::debug!("Subscription {} added for all events", id);
        id
    }

    /// Subscribe to events of one kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SonicEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.subscribers
            .write()
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::debug!("Subscription {} added for {}", id, kind);
        id
    }

    /// Subscribe to property-change events of one property
    pub fn subscribe_property<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&SonicEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let name = name.into();
        tracing::debug!("Subscription {} added for property {}", id, name);
        self.subscribers
            .write()
            .by_property
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Get a receiver for manual event polling
    ///
    /// This is useful for async contexts where you want to receive events
    /// in a tokio task.
    pub fn receiver(&self) -> broadcast::Receiver<SonicEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe from events
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(id);
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}
