//! HTTP endpoint modules.

pub mod hook;
pub mod status;
