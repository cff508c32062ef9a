//! In-process event bus.
//!
//! Write paths publish an event after their rows commit; subscribers run
//! inline, in subscription order, and the first handler error aborts the
//! chain and surfaces to the publisher. Projection recomputation hangs off
//! this bus, so a publish error means "data saved, aggregates stale".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Something that happened to a user's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SessionCreated { user_id: Uuid },
    SyncPushed { user_id: Uuid },
}

impl Event {
    pub const SESSION_CREATED: &'static str = "session.created";
    pub const SYNC_PUSH_COMPLETED: &'static str = "sync.push.completed";

    /// Every event name, for subscribers that want all of them.
    pub const ALL_NAMES: [&'static str; 2] = [Self::SESSION_CREATED, Self::SYNC_PUSH_COMPLETED];

    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => Self::SESSION_CREATED,
            Event::SyncPushed { .. } => Self::SYNC_PUSH_COMPLETED,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Event::SessionCreated { user_id } | Event::SyncPushed { user_id } => *user_id,
        }
    }
}

/// A subscriber. Handlers run inline on the publisher's task.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Event bus with per-event-name subscriber lists.
#[derive(Default)]
pub struct Bus {
    handlers: RwLock<HashMap<&'static str, Vec<Arc<dyn EventHandler>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, name: &'static str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(name)
            .or_default()
            .push(handler);
    }

    /// Run every handler subscribed to this event's name, in subscription
    /// order. The first handler error stops the chain and is returned.
    pub async fn publish(&self, event: &Event) -> anyhow::Result<()> {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .await
            .get(event.name())
            .cloned()
            .unwrap_or_default();

        debug!(event = event.name(), subscribers = handlers.len(), "publish");
        for handler in handlers {
            handler.handle(event).await?;
        }
        Ok(())
    }
}
