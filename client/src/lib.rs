//! # New Relic REST client
//!
//! Thin blocking wrapper around the v2 application endpoints:
//!
//! - `GET applications.json`, following `Link: rel="next"` pagination
//! - `POST applications/{id}/deployments.json`
//!
//! Requests carry the API key in the `X-Api-Key` header. The client never
//! caches and never retries. Callers decide what a failure means.

mod client;
mod error;
mod types;

pub use client::{
    ApiKey,
    ApplicationSource,
    NewRelicClient,
    NewRelicClientBuilder,
    DEFAULT_BASE_URL,
    DEFAULT_MAX_PAGES,
};
pub use error::{
    ClientError,
    RemoteError,
};
pub use types::{
    Application,
    ApplicationList,
    ApplicationSummary,
    Deployment,
    EndUserSummary,
};
