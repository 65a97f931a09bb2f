//! Token models, scope sets, and the identity returned by the verification endpoint.

pub mod identity;
pub mod scope;
pub mod token;

pub use identity::*;
pub use scope::*;
pub use token::{record::*, secret::*};
