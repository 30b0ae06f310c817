//! HTTP control plane.
//!
//! A JSON API over TCP in front of the reconciliation engine and stores.
//! When `server.api_token` is set, every `/api` route requires
//! `Authorization: Bearer <token>`; `/health` is always open.

mod error;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{AppState, router, serve};
pub use types::*;
