//! Roblox Studio tool catalog
//!
//! Each MCP tool validates its arguments and forwards them as one bridge call
//! to the Studio plugin.

pub mod tools;
pub mod utils;
