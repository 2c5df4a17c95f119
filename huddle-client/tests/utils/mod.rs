pub mod event_log;
pub mod fake_connector;

pub use event_log::*;
pub use fake_connection::*;
pub use fake_connector::*;
pub use fake_media::*;
