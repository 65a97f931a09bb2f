//! Bearer token record and its redacted secret wrapper.

pub mod record;
pub mod secret;
