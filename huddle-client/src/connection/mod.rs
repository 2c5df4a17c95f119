mod connection_event;
mod media_connection;
mod rtc_config;
mod webrtc_connection;

pub use connection_event::*;
pub use media_connection::*;
pub use rtc_config::*;
pub use webrtc_connection::*;
