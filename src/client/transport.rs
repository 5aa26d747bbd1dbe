use async_trait::async_trait;
use futures::stream::BoxStream;
use hook_protocol::{BridgeResult, ClientIdentity, EatPolicy, HandlerId, HookKind, HookSignal, PrefValue, Priority};

use crate::{client::dbus::DbusTransport, loopback::LoopbackTransport};

/// The RPC surface a bridge client needs from a host, independent of the bus.
#[async_trait]
pub trait PluginTransport: Send + Sync + 'static {
    /// One readiness check: `Ok` once the host's connection interface is reachable.
    async fn probe(&self) -> BridgeResult<()>;
    /// Returns the private object path, or `""` if the host refused.
    async fn connect(&self, identity: &ClientIdentity) -> BridgeResult<String>;
    async fn disconnect(&self, path: &str) -> BridgeResult<()>;
    /// Every signal emitted on `path`, in emission order.
    async fn subscribe(&self, path: &str) -> BridgeResult<BoxStream<'static, HookSignal>>;

    async fn command(&self, path: &str, text: &str) -> BridgeResult<()>;
    async fn print(&self, path: &str, text: &str) -> BridgeResult<()>;
    async fn get_info(&self, path: &str, key: &str) -> BridgeResult<String>;
    async fn get_prefs(&self, path: &str, key: &str) -> BridgeResult<PrefValue>;
    async fn hook(
        &self,
        path: &str,
        kind: HookKind,
        key: &str,
        priority: Priority,
        help: &str,
        eat: EatPolicy,
    ) -> BridgeResult<HandlerId>;
    async fn unhook(&self, path: &str, id: HandlerId) -> BridgeResult<()>;

    async fn list_get(&self, path: &str, name: &str) -> BridgeResult<u32>;
    async fn list_next(&self, path: &str, list: u32) -> BridgeResult<bool>;
    async fn list_str(&self, path: &str, list: u32, field: &str) -> BridgeResult<String>;
    async fn list_int(&self, path: &str, list: u32, field: &str) -> BridgeResult<i32>;
    async fn list_free(&self, path: &str, list: u32) -> BridgeResult<()>;
}

#[derive(Clone)]
pub enum BusTransport {
    Dbus(DbusTransport),
    Loopback(LoopbackTransport),
}

impl From<DbusTransport> for BusTransport {
    fn from(t: DbusTransport) -> Self {
        BusTransport::Dbus(t)
    }
}

impl From<LoopbackTransport> for BusTransport {
    fn from(t: LoopbackTransport) -> Self {
        BusTransport::Loopback(t)
    }
}

#[async_trait]
impl PluginTransport for BusTransport {
    async fn probe(&self) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.probe().await,
            BusTransport::Loopback(t) => t.probe().await,
        }
    }

    async fn connect(&self, identity: &ClientIdentity) -> BridgeResult<String> {
        match self {
            BusTransport::Dbus(t) => t.connect(identity).await,
            BusTransport::Loopback(t) => t.connect(identity).await,
        }
    }

    async fn disconnect(&self, path: &str) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.disconnect(path).await,
            BusTransport::Loopback(t) => t.disconnect(path).await,
        }
    }

    async fn subscribe(&self, path: &str) -> BridgeResult<BoxStream<'static, HookSignal>> {
        match self {
            BusTransport::Dbus(t) => t.subscribe(path).await,
            BusTransport::Loopback(t) => t.subscribe(path).await,
        }
    }

    async fn command(&self, path: &str, text: &str) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.command(path, text).await,
            BusTransport::Loopback(t) => t.command(path, text).await,
        }
    }

    async fn print(&self, path: &str, text: &str) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.print(path, text).await,
            BusTransport::Loopback(t) => t.print(path, text).await,
        }
    }

    async fn get_info(&self, path: &str, key: &str) -> BridgeResult<String> {
        match self {
            BusTransport::Dbus(t) => t.get_info(path, key).await,
            BusTransport::Loopback(t) => t.get_info(path, key).await,
        }
    }

    async fn get_prefs(&self, path: &str, key: &str) -> BridgeResult<PrefValue> {
        match self {
            BusTransport::Dbus(t) => t.get_prefs(path, key).await,
            BusTransport::Loopback(t) => t.get_prefs(path, key).await,
        }
    }

    async fn hook(
        &self,
        path: &str,
        kind: HookKind,
        key: &str,
        priority: Priority,
        help: &str,
        eat: EatPolicy,
    ) -> BridgeResult<HandlerId> {
        match self {
            BusTransport::Dbus(t) => t.hook(path, kind, key, priority, help, eat).await,
            BusTransport::Loopback(t) => t.hook(path, kind, key, priority, help, eat).await,
        }
    }

    async fn unhook(&self, path: &str, id: HandlerId) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.unhook(path, id).await,
            BusTransport::Loopback(t) => t.unhook(path, id).await,
        }
    }

    async fn list_get(&self, path: &str, name: &str) -> BridgeResult<u32> {
        match self {
            BusTransport::Dbus(t) => t.list_get(path, name).await,
            BusTransport::Loopback(t) => t.list_get(path, name).await,
        }
    }

    async fn list_next(&self, path: &str, list: u32) -> BridgeResult<bool> {
        match self {
            BusTransport::Dbus(t) => t.list_next(path, list).await,
            BusTransport::Loopback(t) => t.list_next(path, list).await,
        }
    }

    async fn list_str(&self, path: &str, list: u32, field: &str) -> BridgeResult<String> {
        match self {
            BusTransport::Dbus(t) => t.list_str(path, list, field).await,
            BusTransport::Loopback(t) => t.list_str(path, list, field).await,
        }
    }

    async fn list_int(&self, path: &str, list: u32, field: &str) -> BridgeResult<i32> {
        match self {
            BusTransport::Dbus(t) => t.list_int(path, list, field).await,
            BusTransport::Loopback(t) => t.list_int(path, list, field).await,
        }
    }

    async fn list_free(&self, path: &str, list: u32) -> BridgeResult<()> {
        match self {
            BusTransport::Dbus(t) => t.list_free(path, list).await,
            BusTransport::Loopback(t) => t.list_free(path, list).await,
        }
    }
}
