//! In-process bus: a host adapter and bridge clients in the same process,
//! talking through direct calls and channels instead of D-Bus.
//!
//! ```ignore
//! let bus = LoopbackBus::new();
//! let adapter = HostAdapter::new(Box::new(ScriptedHost::new()), BusIdentity::default(), bus.sink());
//! let client = BridgeClient::connect(bus.transport(adapter.clone()), identity, RetryPolicy::default()).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{channel::mpsc, stream::BoxStream, StreamExt};
use hook_protocol::{
    BridgeError, BridgeResult, ClientIdentity, EatPolicy, HandlerId, HookKind, HookSignal, PrefValue, Priority,
};
use tracing::{debug, trace};

use crate::{
    client::transport::PluginTransport,
    host::{
        adapter::{HostAdapter, SignalSink},
        connection::HookCall,
    },
};

/// Signal subscriptions keyed by connection path.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    subscribers: Arc<DashMap<String, Vec<mpsc::UnboundedSender<HookSignal>>>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Arc<dyn SignalSink> {
        Arc::new(self.clone())
    }

    pub fn transport(&self, adapter: HostAdapter) -> LoopbackTransport {
        LoopbackTransport { adapter, bus: self.clone() }
    }

    fn subscribe(&self, path: &str) -> mpsc::UnboundedReceiver<HookSignal> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.entry(path.to_owned()).or_default().push(tx);
        rx
    }
}

#[async_trait]
impl SignalSink for LoopbackBus {
    async fn emit(&self, path: &str, signal: &HookSignal) -> BridgeResult<()> {
        let Some(mut senders) = self.subscribers.get_mut(path) else {
            trace!(%path, signal = signal.name(), "no subscriber");
            return Ok(());
        };
        senders.retain(|tx| tx.unbounded_send(signal.clone()).is_ok());
        Ok(())
    }

    async fn release(&self, path: &str) -> BridgeResult<()> {
        if self.subscribers.remove(path).is_some() {
            debug!(%path, "closed loopback subscriptions");
        }
        Ok(())
    }
}

/// Client side of the loopback bus.
#[derive(Clone)]
pub struct LoopbackTransport {
    adapter: HostAdapter,
    bus: LoopbackBus,
}

#[async_trait]
impl PluginTransport for LoopbackTransport {
    async fn probe(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn connect(&self, identity: &ClientIdentity) -> BridgeResult<String> {
        Ok(self
            .adapter
            .connect(None, identity.clone())
            .await
            .map(|record| record.path)
            .unwrap_or_default())
    }

    async fn disconnect(&self, path: &str) -> BridgeResult<()> {
        self.adapter.disconnect(Some(path)).await;
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> BridgeResult<BoxStream<'static, HookSignal>> {
        if !self.adapter.connection_paths().await.iter().any(|p| p == path) {
            return Err(BridgeError::UnknownConnection(path.to_owned()));
        }
        Ok(self.bus.subscribe(path).boxed())
    }

    async fn command(&self, path: &str, text: &str) -> BridgeResult<()> {
        self.adapter.command(path, text).await
    }

    async fn print(&self, path: &str, text: &str) -> BridgeResult<()> {
        self.adapter.print(path, text).await
    }

    async fn get_info(&self, path: &str, key: &str) -> BridgeResult<String> {
        self.adapter.get_info(path, key).await
    }

    async fn get_prefs(&self, path: &str, key: &str) -> BridgeResult<PrefValue> {
        self.adapter.get_prefs(path, key).await
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
        let call = HookCall {
            kind,
            key: key.to_owned(),
            priority: priority.0,
            help: Some(help.to_owned()).filter(|h| !h.is_empty()),
            eat: eat.as_raw(),
        };
        self.adapter.hook(path, call).await
    }

    async fn unhook(&self, path: &str, id: HandlerId) -> BridgeResult<()> {
        self.adapter.unhook(path, id).await
    }

    async fn list_get(&self, path: &str, name: &str) -> BridgeResult<u32> {
        self.adapter.list_get(path, name).await
    }

    async fn list_next(&self, path: &str, list: u32) -> BridgeResult<bool> {
        self.adapter.list_next(path, list).await
    }

    async fn list_str(&self, path: &str, list: u32, field: &str) -> BridgeResult<String> {
        self.adapter.list_str(path, list, field).await
    }

    async fn list_int(&self, path: &str, list: u32, field: &str) -> BridgeResult<i32> {
        self.adapter.list_int(path, list, field).await
    }

    async fn list_free(&self, path: &str, list: u32) -> BridgeResult<()> {
        self.adapter.list_free(path, list).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{native::NativeEvent, scripted::ScriptedHost};
    use hook_protocol::{BusIdentity, PrintMessage};

    #[tokio::test]
    async fn signals_reach_only_their_path() {
        let bus = LoopbackBus::new();
        let adapter = HostAdapter::new(Box::new(ScriptedHost::new()), BusIdentity::default(), bus.sink());
        let transport = bus.transport(adapter.clone());

        let a = transport.connect(&ClientIdentity::default()).await.unwrap();
        let b = transport.connect(&ClientIdentity::default()).await.unwrap();
        let mut a_signals = transport.subscribe(&a).await.unwrap();
        let mut b_signals = transport.subscribe(&b).await.unwrap();

        let id = transport.hook(&a, HookKind::Print, "Your Message", Priority::NORM, "", EatPolicy::None).await.unwrap();
        adapter.dispatch(&NativeEvent::print("Your Message", vec!["Hello".into()], "#rust")).await;
        adapter.unload().await;
        adapter.shutdown().await;

        assert_eq!(
            a_signals.next().await,
            Some(HookSignal::Print { id, event: PrintMessage { words: vec!["Hello".into()], context: "#rust".into() } })
        );
        assert_eq!(a_signals.next().await, Some(HookSignal::Unload));
        assert_eq!(a_signals.next().await, None);
        assert_eq!(b_signals.next().await, Some(HookSignal::Unload));
        assert_eq!(b_signals.next().await, None);
    }

    #[tokio::test]
    async fn subscribing_to_an_unknown_path_fails() {
        let bus = LoopbackBus::new();
        let adapter = HostAdapter::new(Box::new(ScriptedHost::new()), BusIdentity::default(), bus.sink());
        let transport = bus.transport(adapter);
        assert!(matches!(
            transport.subscribe("/org/xchat/Remote/9").await,
            Err(BridgeError::UnknownConnection(_))
        ));
    }
}
