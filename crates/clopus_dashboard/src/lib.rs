//! Clopus dashboard library - exposes modules for testing.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod views;
