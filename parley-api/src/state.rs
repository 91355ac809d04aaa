use std::sync::Arc;

use parley_core::{AppContext, PgStore};
use parley_realtime::{DeliveryCoordinator, Hub, SignalingRelay};

/// Everything a request handler needs, shared via an axum Extension. The hub
/// and coordinator are the same instances the socket sessions use, so HTTP
/// mutations fan out to live connections too.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
    pub store: PgStore,
    pub hub: Arc<Hub>,
    pub coordinator: Arc<DeliveryCoordinator>,
    pub signaling: SignalingRelay,
}

impl ApiState {
    pub fn new(ctx: AppContext) -> Self {
        let store = PgStore::new(ctx.db_pool.clone());
        let hub = Arc::new(Hub::new());
        let coordinator = Arc::new(DeliveryCoordinator::new(
            hub.clone(),
            Arc::new(store.clone()),
        ));
        let signaling = SignalingRelay::new(hub.clone());

        ApiState {
            ctx,
            store,
            hub,
            coordinator,
            signaling,
        }
    }
}
