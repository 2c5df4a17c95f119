mod channel;
mod transport_client;
mod transport_config;
mod ws_connector;

pub use channel::*;
pub use transport_client::*;
pub use transport_config::*;
pub use ws_connector::*;
