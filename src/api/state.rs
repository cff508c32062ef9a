use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::routes::traffic::{SharedTrafficStats, TrafficStats};
use crate::events::{Bus, Event};
use crate::projections::{ProjectionService, RecomputeOnEvent};
use crate::storage::Store;
use crate::sync::SyncService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sync: Arc<SyncService>,
    pub projections: Arc<ProjectionService>,
    pub bus: Arc<Bus>,
    pub api_token: Arc<str>,
    pub default_user: Uuid,
    pub traffic_stats: SharedTrafficStats,
}

impl AppState {
    /// Wire the services around a store and subscribe projection
    /// recomputation to every event.
    pub async fn new(store: Arc<dyn Store>, api_token: &str, default_user: Uuid) -> Self {
        let bus = Arc::new(Bus::new());
        let projections = Arc::new(ProjectionService::new(store.clone()));
        let recompute = Arc::new(RecomputeOnEvent::new(projections.clone()));
        for name in Event::ALL_NAMES {
            bus.subscribe(name, recompute.clone()).await;
        }
        let sync = Arc::new(SyncService::new(store.clone(), bus.clone()));

        Self {
            store,
            sync,
            projections,
            bus,
            api_token: Arc::from(api_token),
            default_user,
            traffic_stats: Arc::new(RwLock::new(TrafficStats::new())),
        }
    }
}
