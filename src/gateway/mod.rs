//! External collaborators: session/auth gateway and remote config
//! endpoint
//!
//! The OAuth handshake itself happens in the browser; this module only
//! consumes the session surface it leaves behind, plus the read-only
//! bootstrap profile endpoint.

pub mod client;

pub use client::{GatewayClient, SessionStatus, UserInfo};
