pub mod agent;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod rpc;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::{CommitService, ExpirySweeper, LockService};
use store::{CommitPolicy, SeatStore};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SeatStore>,
    pub locks: LockService,
    pub config: config::Config,
}

impl AppState {
    pub fn new(store: Arc<dyn SeatStore>, config: config::Config) -> Arc<Self> {
        Arc::new(Self {
            locks: LockService::new(store.clone()),
            store,
            config,
        })
    }

    pub fn commit_service(&self) -> CommitService {
        CommitService::new(
            self.store.clone(),
            CommitPolicy::from_config(self.config.reservation.commit_requires_lock),
        )
    }

    pub fn expiry_sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.config.reservation.lock_ttl(),
            self.config.reservation.sweep_interval(),
        )
    }
}
