//! # New Relic exporter
//!
//! Republishes the application summary of one New Relic APM application as
//! Prometheus metrics. Every scrape of the metrics endpoint triggers a fresh
//! read of the REST API; nothing is cached between scrapes.
//!
//! - **`collector`**: the scrape contract (descriptors, locking, mapping, failure policy)
//! - **`server`**: the axum router serving the text exposition
//! - **`config`** / **`args`**: layered configuration and the command line
//! - **`app`**: command dispatch (`serve`, `applications`, `record-deployment`)

#[macro_use]
extern crate tracing;

mod app;
pub mod args;
pub mod collector;
pub mod config;
pub mod error;
mod logging;
pub mod server;

pub use app::App;
pub use args::Args;
pub use logging::{
    init_errors,
    init_logging,
};
