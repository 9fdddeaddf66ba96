//! edgekit Library
//!
//! Edge device simulators, protocol connectors and IaC maintenance tools
//!
//! ## Architecture
//!
//! 1. OnvifCamera - ONVIF Profile S/T camera simulator (SOAP + MQTT events)
//! 2. OnvifConnector - ONVIF discovery/polling bridged to MQTT
//! 3. SseServer - Server-Sent Events device simulator
//! 4. SseConnector - SSE stream consumer bridged to MQTT
//! 5. RestDevices - weather station, field sensor, Basic-auth device
//! 6. RestConnector - REST polling bridged to MQTT
//! 7. Iac - version check, PR diff, link check, tf-vars, Bicep docs
//!
//! ## Shared Infrastructure
//!
//! - `soap`: envelope building, XML scanning, WS-Security UsernameToken
//! - `mqtt`: rumqttc bridge behind the `Publisher` trait
//! - `server`: axum bootstrap with graceful shutdown
//! - `config` / `retry` / `error`

pub mod config;
pub mod error;
pub mod iac;
pub mod mqtt;
pub mod onvif_camera;
pub mod onvif_connector;
pub mod rest_connector;
pub mod rest_devices;
pub mod retry;
pub mod server;
pub mod soap;
pub mod sse_connector;
pub mod sse_server;

pub use error::{Error, Result};
