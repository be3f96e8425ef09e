mod dataset;
mod query;
mod record;
mod timestamp;

pub use dataset::DatasetKind;
pub use query::QueryParams;
pub use record::{GeoPoint, Record};
pub use timestamp::UtcDateTime;
