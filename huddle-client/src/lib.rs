mod call;
mod connection;
mod error;
mod media;
mod observers;
mod transport;

pub use call::*;
pub use connection::*;
pub use error::*;
pub use media::*;
pub use observers::{Observers, Subscription};
pub use transport::*;
