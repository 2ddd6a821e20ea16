//! Flareguard: the real-time alert distribution core of a solar-weather
//! monitoring service.

pub mod broadcast;
pub mod delivery;
pub mod error;
pub mod heartbeat;
pub mod ports;
pub mod proto;
pub mod push;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod threshold;
pub mod webhook;
