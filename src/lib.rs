pub mod config;
pub mod error;
pub mod graph;
pub mod guard;
pub mod mcp;
pub mod memory;
pub mod models;
pub mod render;
pub mod review;
pub mod state;
pub mod store;
pub mod workspace;

pub use error::{Error, Result};
pub use workspace::Workspace;
