pub mod error;
pub mod model;
pub mod signaling;
pub mod utils;

pub use error::ProtocolError;
pub use model::*;
