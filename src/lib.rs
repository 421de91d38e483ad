pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod routes;

use std::sync::Arc;

use config::SystemSettings;
use db::LedgerStore;
use ledger::{StatusEngine, TransactionRequests};
use notify::BroadcastDispatcher;
use routes::auth::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn LedgerStore>,
    pub requests: Arc<TransactionRequests>,
    pub engine: Arc<StatusEngine>,
    pub notifications: BroadcastDispatcher,
    pub settings: Arc<SystemSettings>,
}

impl AppState {
    /// Wires the request handler and status engine over one store, with
    /// notifications going to the broadcast hub the SSE route reads from.
    pub fn new(
        auth: AuthService,
        store: Arc<dyn LedgerStore>,
        settings: SystemSettings,
        notification_capacity: usize,
    ) -> Self {
        let notifications = BroadcastDispatcher::new(notification_capacity);
        let requests = TransactionRequests::new(store.clone());
        let engine = StatusEngine::new(store.clone(), Arc::new(notifications.clone()));

        Self {
            auth: Arc::new(auth),
            store,
            requests: Arc::new(requests),
            engine: Arc::new(engine),
            notifications,
            settings: Arc::new(settings),
        }
    }
}
