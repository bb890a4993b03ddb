//! facegated: HTTP service in front of the facegate label index.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::{build_router, run};
pub use state::{AppState, ServicePhase};
