//! AuditHub server library
//!
//! Chooses the storage backends and wires them into the portal router

mod app;

pub use app::{AppHandle, create_app};
pub use audithub_core::{Config, init_tracing};
pub use audithub_portal::PortalState;

pub use audithub_core;
pub use audithub_portal;
