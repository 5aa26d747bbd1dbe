pub mod client;
pub mod config;
pub mod host;
pub mod logger;
pub mod loopback;

pub use hook_protocol as protocol;
