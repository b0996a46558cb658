pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod record;
pub mod session;
pub mod stats;
pub mod status;
pub mod store;
pub mod types;

pub use error::{CarecallError, Result};
