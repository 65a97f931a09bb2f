//! Identity provider descriptors.
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! endpoints (authorization, token, verification, revocation) and the client
//! authentication mode used against the token endpoint.

pub mod descriptor;

pub use descriptor::*;
