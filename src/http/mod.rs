//! HTTP surface polled by the Roblox Studio plugin
//!
//! Every route is a single-shot operation against the bridge; none of them
//! holds the connection open waiting for work.

pub mod handlers;
