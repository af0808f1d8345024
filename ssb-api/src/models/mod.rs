//! Wire schemas for the upstream SSB endpoints.
//!
//! Every struct mirrors one upstream response shape. Optional fields are
//! `Option` or `#[serde(default)]`; anything else that fails to match is a
//! parse error for the whole response.

pub mod calendar;
pub mod jsonstat;
pub mod search;

pub use calendar::{CalendarResponse, CalendarSection, PublicationEntry};
pub use jsonstat::{
    CategoryIndex, JsonStatCategory, JsonStatDataset, JsonStatDimension, JsonStatRole,
    JsonStatStatus, JsonStatValues,
};
pub use search::{PageInfo, SearchEntry, TableHit, TableSearchResponse};
