//! OnvifCamera - ONVIF Profile S/T camera simulator
//!
//! ## Responsibilities
//!
//! - SOAP dispatch on the Body operation name
//! - Simulated PTZ position and imaging settings (clamped to device limits)
//! - Randomised motion / tamper events served through PullMessages
//! - Optional WS-Security UsernameToken enforcement

mod device;
mod routes;
mod templates;
mod types;

pub use device::{CameraState, OnvifCamera, EVENT_REFRESH_INTERVAL};
pub use routes::create_router;
pub use templates::{MOTION_TOPIC, TAMPER_TOPIC};
pub use types::*;

use crate::config::bind_addr;
use std::sync::Arc;

/// Run the simulator until shutdown
pub async fn run(config: OnvifCameraConfig) -> crate::Result<()> {
    let addr = bind_addr(&config.host, config.port)?;
    let camera = Arc::new(OnvifCamera::new(config));
    crate::server::serve("onvif-camera", addr, create_router(camera)).await
}
