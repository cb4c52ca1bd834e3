//! Shared foundation of the Vigil pipeline: configuration, errors, logging,
//! the segment/detection data model, playlist builders, media subprocess
//! wrappers, the snapshot store, and the outbound service clients.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod models;
pub mod playlist;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
