//! HTTP and WebSocket handlers, one module per endpoint (§4.F, §4.G, §4.I).

pub mod emit;
pub mod health;
pub mod query;
pub mod subscribe;
