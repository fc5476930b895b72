//! boxinstall HTTP gateway
//!
//! Serves the installer front end and the JSON API it polls.

pub mod assets;
pub mod error;
pub mod install_api;
pub mod server;
pub mod system_api;

pub use error::ApiError;
pub use server::{build_router, start_server, GatewayState};
