//! Solace core library — session, thread, and gesture controllers, the
//! document store and identity seams, and the completion relay used by the
//! CLI application.

pub mod account;
pub mod auth;
pub mod config;
pub mod gesture;
pub mod relay;
pub mod session;
pub mod store;
pub mod threads;
