//! CLI command handlers.

pub mod flags;
pub mod load;
pub mod services;
pub mod simulate;
