//! Domain types for PRESIGN.
//!
//! - [`LogicalKey`]: Stable caller-facing resource identifier
//! - [`ResourcePath`]: Backend-addressable path that needs a signed URL
//! - [`ResourceDescriptor`]: One currently relevant resource
//! - [`CacheStatus`]: Aggregate cache status published to consumers

mod resource;
mod status;

pub use resource::*;
pub use status::*;
