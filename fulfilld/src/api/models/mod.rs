//! Request and response types for the HTTP surface.

pub mod entitlements;
pub mod nodes;
pub mod provisions;
pub mod vpn;
