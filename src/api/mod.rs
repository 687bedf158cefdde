//! API clients for Deezer.
//!
//! This module provides two API clients:
//! - [`DeezerApi`]: Public API for querying metadata (no auth required)
//! - [`GatewayApi`]: Gateway API for authenticated operations

pub mod gateway;
pub mod public;

pub use gateway::{resolve_private_info, GatewayApi, PageTrackSource, Session};
pub use public::DeezerApi;
