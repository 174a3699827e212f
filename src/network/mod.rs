//! Network subsystem for the lip-sync WebSocket transport

pub mod ws;

pub use ws::LipsyncTransport;
