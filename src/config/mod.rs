//! Configuration management module
//!
//! Global application settings (TOML, file + environment) and the
//! credential store holding named store connection profiles.

pub mod profiles;
pub mod settings;

pub use profiles::*;
pub use settings::*;
