use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use hook_protocol::{EatPolicy, HandlerId, HookKind, PrefValue, Priority};
use tracing::{debug, warn};

use crate::client::transport::{BusTransport, PluginTransport};

/// Cloneable access to a connected host.
///
/// Every call degrades instead of failing: transport errors are logged and
/// turned into a neutral value, so callbacks can use the handle freely.
#[derive(Clone)]
pub struct PluginHandle {
    transport: BusTransport,
    path: Arc<str>,
    connected: Arc<AtomicBool>,
}

impl PluginHandle {
    pub(crate) fn new(transport: BusTransport, path: String) -> Self {
        Self {
            transport,
            path: path.into(),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The private object path the host handed out on connect.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Print through the host, or on stdout when that is not possible.
    pub async fn print(&self, text: &str) {
        if self.is_connected() {
            match self.transport.print(&self.path, text).await {
                Ok(()) => return,
                Err(err) => debug!(path = %self.path, "print failed: {err}"),
            }
        }
        println!("{text}");
    }

    /// Run a client command such as `nick Tak`. Always answers `EatPolicy::All`
    /// so command callbacks can return it directly.
    pub async fn command(&self, text: &str) -> EatPolicy {
        if self.is_connected() {
            if let Err(err) = self.transport.command(&self.path, text).await {
                warn!(path = %self.path, "❌ command `{text}` failed: {err}");
            }
        }
        EatPolicy::All
    }

    pub async fn get_info(&self, key: &str) -> String {
        if !self.is_connected() {
            return String::new();
        }
        self.transport.get_info(&self.path, key).await.unwrap_or_else(|err| {
            warn!(path = %self.path, "❌ bad response for `{key}`: {err}");
            String::new()
        })
    }

    pub async fn get_prefs(&self, key: &str) -> PrefValue {
        if !self.is_connected() {
            return PrefValue::Missing;
        }
        self.transport.get_prefs(&self.path, key).await.unwrap_or_else(|err| {
            warn!(path = %self.path, "❌ prefs `{key}`: {err}");
            PrefValue::Missing
        })
    }

    /// Register a hook on the host. `HandlerId::NONE` on any failure.
    pub async fn hook(&self, kind: HookKind, key: &str, priority: Priority, help: &str, eat: EatPolicy) -> HandlerId {
        if !self.is_connected() {
            return HandlerId::NONE;
        }
        self.transport
            .hook(&self.path, kind, key, priority, help, eat)
            .await
            .unwrap_or_else(|err| {
                warn!(path = %self.path, %kind, "❌ hooking `{key}` failed: {err}");
                HandlerId::NONE
            })
    }

    pub async fn unhook(&self, id: HandlerId) {
        if !self.is_connected() || !id.is_live() {
            return;
        }
        if let Err(err) = self.transport.unhook(&self.path, id).await {
            debug!(path = %self.path, %id, "unhook failed: {err}");
        }
    }

    /// Open a native list; `0` if there is none.
    pub async fn list_get(&self, name: &str) -> u32 {
        if !self.is_connected() {
            return 0;
        }
        self.transport.list_get(&self.path, name).await.unwrap_or_else(|err| {
            warn!(path = %self.path, "❌ list `{name}`: {err}");
            0
        })
    }

    pub async fn list_next(&self, list: u32) -> bool {
        if !self.is_connected() || list == 0 {
            return false;
        }
        self.transport.list_next(&self.path, list).await.unwrap_or(false)
    }

    pub async fn list_str(&self, list: u32, field: &str) -> String {
        if !self.is_connected() || list == 0 {
            return String::new();
        }
        self.transport.list_str(&self.path, list, field).await.unwrap_or_default()
    }

    pub async fn list_int(&self, list: u32, field: &str) -> i32 {
        if !self.is_connected() || list == 0 {
            return 0;
        }
        self.transport.list_int(&self.path, list, field).await.unwrap_or_default()
    }

    pub async fn list_free(&self, list: u32) {
        if !self.is_connected() || list == 0 {
            return;
        }
        if let Err(err) = self.transport.list_free(&self.path, list).await {
            debug!(path = %self.path, "list free failed: {err}");
        }
    }

    /// Disconnect once; later calls and every clone fall back to neutral values.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.transport.disconnect(&self.path).await {
            warn!(path = %self.path, "❌ disconnect failed: {err}");
        }
    }
}
