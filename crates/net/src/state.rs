//! Application state shared by every handler.

use std::sync::Arc;
use voxen_database::SafeDatabase;

use crate::config::Config;
use crate::mailer::Mailer;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState<D: SafeDatabase> {
    pub db: D,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub relay: Arc<Relay>,
    pub http: reqwest::Client,
}

impl<D: SafeDatabase> AppState<D> {
    pub fn new(db: D, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            mailer,
            relay: Arc::new(Relay::new()),
            http: reqwest::Client::new(),
        }
    }
}
