//! The host side: an IRC client's plugin API exported on a message bus.
//!
//! Native events flow from a `NativeHost` into `HostAdapter::dispatch`, get
//! matched against each connection's registry and leave as bus signals.

pub mod adapter;
pub mod connection;
pub mod dbus;
pub mod dispatcher;
pub mod manager;
pub mod native;
pub mod registry;
pub mod scripted;

pub use adapter::{HostAdapter, SignalSink};
pub use native::{NativeEvent, NativeHost};
