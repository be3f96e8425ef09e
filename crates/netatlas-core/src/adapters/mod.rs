//! Live upstream adapters.
//!
//! Each adapter owns an [`ApiClient`] with its own breaker, retry policy,
//! rate budget and deduplicator, and a [`ResponseTransformer`] that maps the
//! provider payload onto canonical [`crate::Record`]s.

mod client;
mod peeringdb;
mod radar;
mod telegeography;
mod transform;

pub use client::ApiClient;
pub use peeringdb::{ExchangeTransformer, FacilityTransformer, PeeringDbAdapter};
pub use radar::{RadarAdapter, RadarAttackTransformer};
pub use telegeography::{CableCatalogAdapter, CableGeoTransformer};
pub use transform::{ResponseTransformer, TransformContext, TransformerKind};
