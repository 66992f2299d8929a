//! HTTP interface for docqa
//!
//! Exposes question answering and index refresh over a small JSON API and
//! serves the browser front page.

mod routes;
mod server;

pub use server::{AppState, build_router, serve};
