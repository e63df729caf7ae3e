//! API handlers for Tessera.

pub mod auth;
pub mod health;
