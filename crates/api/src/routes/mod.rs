//! HTTP and WebSocket handlers, grouped by prefix

pub mod buzzer;
pub mod config;
pub mod detection;
pub mod events;
pub mod realtime;
pub mod system;
