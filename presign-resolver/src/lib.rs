//! HTTP batch resolver for PRESIGN.
//!
//! Talks to a signing endpoint that accepts a set of paths and a TTL and
//! returns a path → signed URL mapping in one round trip.

mod http;

pub use http::{HttpBatchResolver, ResolverConfig};
