use thiserror::Error;

use crate::message::{HandlerId, HookKind};

/// Everything that can go wrong while bridging hooks over the bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The bus or the bridge service could not be reached.
    #[error("bus transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The service is up but the requested object does not expose the interface yet.
    #[error("interface `{interface}` not ready at `{path}`")]
    InterfaceNotReady { path: String, interface: String },

    /// A client callback returned an error or panicked.
    #[error("handler {id} failed: {reason}")]
    HandlerInvocationFailure { id: HandlerId, reason: String },

    /// Connect was called on an object that already owns a path.
    #[error("object `{0}` is already connected")]
    DuplicateConnect(String),

    #[error("unknown handler id {0}")]
    UnknownHandlerId(HandlerId),

    #[error("no connection at `{0}`")]
    UnknownConnection(String),

    /// The host unloaded; the connection no longer accepts calls.
    #[error("connection `{0}` is closed")]
    ConnectionClosed(String),

    /// The native host refused to install a hook.
    #[error("native host refused {kind} hook `{key}`: {reason}")]
    NativeRegistration { kind: HookKind, key: String, reason: String },

    #[error("invalid eat policy {0}")]
    InvalidEatPolicy(i32),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
