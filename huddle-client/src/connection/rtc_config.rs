use huddle_core::IceServerConfig;
use huddle_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::Deserialize;

/// WebRTC configuration for every peer connection of a call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(&[
                DEFAULT_STUN_ADDR,
                DEFAULT_STUN_ADDR_2,
            ])],
        }
    }
}
