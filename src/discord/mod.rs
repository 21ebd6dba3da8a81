//! Discord integration: gateway client, REST calls, and wire types.

pub mod gateway;
pub mod rest;
pub mod types;
