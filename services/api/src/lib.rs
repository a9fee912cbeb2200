//! Role-Play API Library Crate
//!
//! This library contains the HTTP surface of the role-play trainer: the
//! application state, in-memory session store, API handlers and routing. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod store;
