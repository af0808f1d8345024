//! High-level client for Statistics Norway (SSB).
//!
//! Turns the raw PxWebApi responses from [`ssb_api`] into a stable table
//! model: ordered dimensions with their categories, a dense value cube, and
//! flat search and publication listings.

pub use ssb_api as api;

mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod publications;
mod query;
mod search;
pub mod selection;

pub use client::StatbankClient;
pub use config::StatbankConfig;
pub use error::{ErrorKind, Result, StatbankError};
pub use model::{
    Category, Dimension, DimensionRole, Observation, PublicationRecord, SearchHit, TableData,
    TableId, TableMetadata,
};
pub use selection::{CategorySelection, Selection};
