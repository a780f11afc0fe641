//! HTTP surface.
//!
//! One authenticated streaming route plus an unauthenticated health check.

mod handlers;
mod server;

pub use server::{
    create_router, run_server, AppState, RelaySettings, RequestId, REQUEST_ID_HEADER,
};
