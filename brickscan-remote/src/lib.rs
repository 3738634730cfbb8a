//! brickscan-remote: clients for the identification and catalog services
//!
//! Every outbound call goes through a [`RequestGate`], which spaces calls
//! out and retries transient failures. Clients resolve all outcomes to a
//! [`brickscan_core::ServiceReply`] at their boundary, so callers never see
//! transport errors.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod gate;
mod http;
pub mod identify;

pub use cache::EnrichmentCache;
pub use catalog::{CatalogLookup, RebrickableClient};
pub use error::{RemoteError, Result};
pub use gate::RequestGate;
pub use identify::{parse_predictions, BrickognizeClient, Identifier};
