pub mod error;
pub mod flavor;
pub mod message;

pub use error::{BridgeError, BridgeResult};
pub use flavor::{BusIdentity, Flavor};
pub use message::*;
