//! Federated sign-in through external identity providers

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
