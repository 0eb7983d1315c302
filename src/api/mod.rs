//! Orchestration API access
//!
//! Thin request/response layer over the versioned REST API: every call is
//! authenticated with the account's API key and checked against the single
//! success status of its operation.

pub mod client;
pub mod types;

pub use client::{ApiClient, ApiConfig, Credentials};
pub use types::{ListResponse, RegionRecord, RemoteRecord, RemoteState, TagRef};
