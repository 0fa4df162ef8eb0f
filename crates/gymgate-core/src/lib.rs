//! gymgate-core: Domain types and API access for the gym access kiosk.
//!
//! Face matching and persistence live behind a remote HTTP service; this
//! crate models its records and outcomes and provides the client that
//! talks to it.

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::{ClientDirectory, RecognitionService};
pub use client::{ApiClient, DEFAULT_API_URL};
pub use error::ApiError;
pub use types::{
    Client, ClientId, ClientUpdate, NewClient, NewClientWithFace, RecognitionOutcome,
    RegisterFace, Snapshot,
};
