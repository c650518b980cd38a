//! Object store access
//!
//! The connection manager owns the single active low-level client and
//! builds listing/delete requests against it; the upload orchestrator
//! layers multipart uploads with progress reporting on top.

pub mod manager;
pub mod models;
pub mod transform;
pub mod upload;

pub use manager::{compute_endpoint, public_url, StoreManager};
pub use models::*;
pub use upload::UploadOrchestrator;
