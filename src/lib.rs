pub mod api;
pub mod auth;
pub mod authorization;
pub mod billing; // Bills, discounts, revenue
pub mod calendar;
pub mod catalogue; // Treatments and packages
pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod patients;
pub mod scheduling; // Package sales and session lifecycle
pub mod state;
pub mod templates;
pub mod therapists;
pub mod validation;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
