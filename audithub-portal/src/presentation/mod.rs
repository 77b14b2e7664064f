//! Portal presentation layer

pub mod auth;
pub mod controllers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use controllers::PortalState;
pub use routes::{ApiDoc, create_router};
