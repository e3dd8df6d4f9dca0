//! Shared application state.

use std::sync::Arc;

use domains::ports::IdentityVerifier;
use services::Services;

use crate::metrics::Metrics;

/// Cloned into every handler; everything inside is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub identity: Arc<dyn IdentityVerifier>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(services: Services, identity: Arc<dyn IdentityVerifier>, metrics: Arc<Metrics>) -> Self {
        Self {
            services,
            identity,
            metrics,
        }
    }
}
