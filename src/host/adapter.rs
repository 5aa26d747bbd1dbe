use std::sync::Arc;

use async_trait::async_trait;
use hook_protocol::{
    BridgeResult, BusIdentity, ClientIdentity, ConnectionRecord, EatPolicy, HandlerId, HookSignal, PrefValue,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    host::{
        connection::HookCall,
        dispatcher::Dispatch,
        manager::ConnectionManager,
        native::{NativeEvent, NativeHost},
    },
    logger::EVENTS_TARGET,
};

/// Where connection objects send their signals.
///
/// Implemented by the D-Bus object server and by the in-process loopback bus.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn emit(&self, path: &str, signal: &HookSignal) -> BridgeResult<()>;

    /// The connection at `path` is gone; stop serving it.
    async fn release(&self, path: &str) -> BridgeResult<()>;
}

pub struct HostState {
    pub host: Box<dyn NativeHost>,
    pub manager: ConnectionManager,
}

/// The single application context of the host side.
///
/// Owns the native host and the connection manager behind one async mutex.
/// The lock is never held while a signal is emitted.
#[derive(Clone)]
pub struct HostAdapter {
    state: Arc<Mutex<HostState>>,
    sink: Arc<dyn SignalSink>,
    identity: BusIdentity,
}

impl HostAdapter {
    pub fn new(host: Box<dyn NativeHost>, identity: BusIdentity, sink: Arc<dyn SignalSink>) -> Self {
        info!(flavor = %identity.flavor, service = %identity.service, "🚀 host adapter ready");
        Self {
            state: Arc::new(Mutex::new(HostState {
                host,
                manager: ConnectionManager::new(identity.clone()),
            })),
            sink,
            identity,
        }
    }

    pub fn identity(&self) -> &BusIdentity {
        &self.identity
    }

    /// Run `f` against the native host, e.g. from the embedding event loop.
    pub async fn with_host<R>(&self, f: impl FnOnce(&mut dyn NativeHost) -> R + Send) -> R {
        let mut state = self.state.lock().await;
        f(&mut *state.host)
    }

    pub async fn connection_paths(&self) -> Vec<String> {
        self.state.lock().await.manager.paths()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ConnectionRecord> {
        let state = self.state.lock().await;
        state.manager.find_by_name(name).map(|c| c.record().clone())
    }

    // ── connection interface ────────────────────────────────────────────

    /// `None` when `owner` is already a connection. Exporting the returned
    /// path is up to the transport.
    pub async fn connect(&self, owner: Option<&str>, identity: ClientIdentity) -> Option<ConnectionRecord> {
        self.state.lock().await.manager.connect(owner, identity)
    }

    pub async fn disconnect(&self, owner: Option<&str>) -> bool {
        let released = {
            let mut state = self.state.lock().await;
            let HostState { host, manager } = &mut *state;
            manager.disconnect(owner, &mut **host)
        };
        match released {
            Some(record) => {
                if let Err(err) = self.sink.release(&record.path).await {
                    warn!(path = %record.path, "❌ failed to unexport: {err}");
                }
                true
            }
            None => false,
        }
    }

    // ── plugin interface ────────────────────────────────────────────────

    pub async fn command(&self, path: &str, text: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        state.manager.get(path)?.ensure_open()?;
        debug!(%path, "command `{text}`");
        state.host.command(text);
        Ok(())
    }

    pub async fn print(&self, path: &str, text: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        state.manager.get(path)?.ensure_open()?;
        state.host.print(text);
        Ok(())
    }

    /// Unknown keys answer with an empty string.
    pub async fn get_info(&self, path: &str, key: &str) -> BridgeResult<String> {
        let state = self.state.lock().await;
        state.manager.get(path)?.ensure_open()?;
        Ok(state.host.get_info(key).unwrap_or_default())
    }

    pub async fn get_prefs(&self, path: &str, key: &str) -> BridgeResult<PrefValue> {
        let state = self.state.lock().await;
        state.manager.get(path)?.ensure_open()?;
        Ok(state.host.get_prefs(key))
    }

    pub async fn hook(&self, path: &str, call: HookCall) -> BridgeResult<HandlerId> {
        let mut state = self.state.lock().await;
        let HostState { host, manager } = &mut *state;
        manager.get_mut(path)?.hook(&mut **host, call)
    }

    pub async fn unhook(&self, path: &str, id: HandlerId) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        let HostState { host, manager } = &mut *state;
        manager.get_mut(path)?.unhook(&mut **host, id)
    }

    pub async fn list_get(&self, path: &str, name: &str) -> BridgeResult<u32> {
        let mut state = self.state.lock().await;
        let HostState { host, manager } = &mut *state;
        manager.get_mut(path)?.list_get(&**host, name)
    }

    pub async fn list_next(&self, path: &str, list: u32) -> BridgeResult<bool> {
        self.state.lock().await.manager.get_mut(path)?.list_next(list)
    }

    pub async fn list_str(&self, path: &str, list: u32, field: &str) -> BridgeResult<String> {
        self.state.lock().await.manager.get(path)?.list_str(list, field)
    }

    pub async fn list_int(&self, path: &str, list: u32, field: &str) -> BridgeResult<i32> {
        self.state.lock().await.manager.get(path)?.list_int(list, field)
    }

    pub async fn list_free(&self, path: &str, list: u32) -> BridgeResult<()> {
        self.state.lock().await.manager.get_mut(path)?.list_free(list)
    }

    // ── native side ─────────────────────────────────────────────────────

    /// Fan a native event out to every matching handler of every connection
    /// and return the strongest eat policy for the native host to apply.
    pub async fn dispatch(&self, event: &NativeEvent) -> EatPolicy {
        let batches: Vec<(String, Dispatch)> = {
            let state = self.state.lock().await;
            state
                .manager
                .connections()
                .map(|c| (c.path().to_owned(), c.dispatch(event)))
                .filter(|(_, d)| !d.is_empty())
                .collect()
        };

        let mut eat = EatPolicy::None;
        let mut delivered = 0;
        for (path, batch) in batches {
            delivered += batch.signals.len();
            eat = eat.max(batch.eat);
            for signal in &batch.signals {
                if let Err(err) = self.sink.emit(&path, signal).await {
                    error!(%path, signal = signal.name(), "❌ failed to emit: {err}");
                }
            }
        }
        if delivered > 0 {
            info!(
                target: EVENTS_TARGET,
                kind = %event.kind,
                key = %event.key,
                context = %event.context,
                signals = delivered,
                %eat,
                "dispatched"
            );
        }
        eat
    }

    /// Tell every client to go away.
    ///
    /// Each connection gets exactly one unload signal and is closed right
    /// after, so later calls on it fail. From here on `Connect` is refused and
    /// calling `unload` again sends nothing. Native hooks are released here;
    /// the objects themselves stay until `shutdown`.
    pub async fn unload(&self) {
        let paths = {
            let mut state = self.state.lock().await;
            let HostState { host, manager } = &mut *state;
            let paths = manager.close_all();
            manager.release_all(&mut **host);
            paths
        };
        info!(clients = paths.len(), "🛑 unloading");
        for path in &paths {
            if let Err(err) = self.sink.emit(path, &HookSignal::Unload).await {
                warn!(%path, "❌ failed to send unload: {err}");
            }
        }
    }

    /// Forget and unexport every remaining connection.
    pub async fn shutdown(&self) {
        let records = {
            let mut state = self.state.lock().await;
            let HostState { host, manager } = &mut *state;
            manager.drain_all(&mut **host)
        };
        for record in records {
            if let Err(err) = self.sink.release(&record.path).await {
                warn!(path = %record.path, "❌ failed to unexport: {err}");
            }
        }
        info!("host adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::scripted::{ScriptedHost, Transcript};
    use hook_protocol::{BridgeError, HookKind, PrintMessage};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        emitted: StdMutex<Vec<(String, HookSignal)>>,
        released: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SignalSink for RecordingSink {
        async fn emit(&self, path: &str, signal: &HookSignal) -> BridgeResult<()> {
            self.emitted.lock().unwrap().push((path.to_owned(), signal.clone()));
            Ok(())
        }

        async fn release(&self, path: &str) -> BridgeResult<()> {
            self.released.lock().unwrap().push(path.to_owned());
            Ok(())
        }
    }

    fn adapter() -> (HostAdapter, Arc<RecordingSink>, Transcript) {
        let host = ScriptedHost::new();
        let transcript = host.transcript();
        let sink = Arc::new(RecordingSink::default());
        let adapter = HostAdapter::new(Box::new(host), BusIdentity::default(), sink.clone());
        (adapter, sink, transcript)
    }

    fn call(kind: HookKind, key: &str, eat: EatPolicy) -> HookCall {
        HookCall { kind, key: key.into(), priority: 0, help: None, eat: eat.as_raw() }
    }

    #[tokio::test]
    async fn case_variants_both_fire() {
        let (adapter, sink, _) = adapter();
        let rec = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        let a = adapter.hook(&rec.path, call(HookKind::Command, "BLAH", EatPolicy::All)).await.unwrap();
        let b = adapter.hook(&rec.path, call(HookKind::Command, "blah", EatPolicy::None)).await.unwrap();
        assert_ne!(a, b);

        let eat = adapter.dispatch(&NativeEvent::command("Blah hi", "#rust")).await;
        assert_eq!(eat, EatPolicy::All);
        let ids: Vec<_> = sink.emitted.lock().unwrap().iter().filter_map(|(_, s)| s.handler_id()).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn print_hook_is_delivered_once_per_connection() {
        let (adapter, sink, _) = adapter();
        let one = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        let two = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        adapter.hook(&one.path, call(HookKind::Print, "Your Message", EatPolicy::None)).await.unwrap();

        let ev = NativeEvent::print("Your Message", vec!["Hello".into()], "#rust");
        assert_eq!(adapter.dispatch(&ev).await, EatPolicy::None);
        let emitted = sink.emitted.lock().unwrap().clone();
        assert_eq!(
            emitted,
            vec![(
                one.path.clone(),
                HookSignal::Print {
                    id: HandlerId::new(1),
                    event: PrintMessage { words: vec!["Hello".into()], context: "#rust".into() },
                }
            )]
        );
        assert!(emitted.iter().all(|(p, _)| *p != two.path));
    }

    #[tokio::test]
    async fn rpcs_reach_the_native_host() {
        let (adapter, _, transcript) = adapter();
        let rec = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        adapter.command(&rec.path, "join #rust").await.unwrap();
        adapter.print(&rec.path, "hi").await.unwrap();
        assert_eq!(adapter.get_info(&rec.path, "nick").await.unwrap(), "hookbus");
        assert_eq!(adapter.get_info(&rec.path, "nope").await.unwrap(), "");
        assert_eq!(adapter.get_prefs(&rec.path, "nope").await.unwrap(), PrefValue::Missing);
        assert_eq!(transcript.commands(), vec!["join #rust"]);
        assert_eq!(transcript.prints(), vec!["hi"]);
        assert!(matches!(
            adapter.command("/org/xchat/Remote/99", "x").await,
            Err(BridgeError::UnknownConnection(_))
        ));
    }

    #[tokio::test]
    async fn unload_signals_once_then_fails_fast() {
        let (adapter, sink, _) = adapter();
        let a = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        let b = adapter.connect(None, ClientIdentity::default()).await.unwrap();
        adapter.hook(&a.path, call(HookKind::Command, "BLAH", EatPolicy::None)).await.unwrap();

        adapter.unload().await;
        let unloads: Vec<_> = sink
            .emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == HookSignal::Unload)
            .map(|(p, _)| p.clone())
            .collect();
        assert_eq!(unloads, vec![a.path.clone(), b.path.clone()]);

        assert!(matches!(adapter.print(&a.path, "x").await, Err(BridgeError::ConnectionClosed(_))));
        assert!(matches!(
            adapter.hook(&b.path, call(HookKind::Print, "X", EatPolicy::None)).await,
            Err(BridgeError::ConnectionClosed(_))
        ));
        assert_eq!(adapter.dispatch(&NativeEvent::command("BLAH", "#c")).await, EatPolicy::None);
        assert_eq!(adapter.with_host(|h| h.get_info("nick")).await.as_deref(), Some("hookbus"));

        adapter.shutdown().await;
        assert_eq!(sink.released.lock().unwrap().len(), 2);
        assert!(adapter.connection_paths().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_unexports_and_is_idempotent() {
        let (adapter, sink, _) = adapter();
        let rec = adapter.connect(None, ClientIdentity { name: "tap".into(), ..Default::default() }).await.unwrap();
        assert!(adapter.connect(Some(&rec.path), ClientIdentity::default()).await.is_none());
        assert!(adapter.connect(Some(&rec.path), ClientIdentity::default()).await.is_none());
        assert_eq!(adapter.connection_paths().await, vec![rec.path.clone()]);
        assert_eq!(adapter.find_by_name("tap").await.map(|r| r.path), Some(rec.path.clone()));
        assert!(adapter.disconnect(Some(&rec.path)).await);
        assert!(!adapter.disconnect(Some(&rec.path)).await);
        assert!(!adapter.disconnect(None).await);
        assert_eq!(*sink.released.lock().unwrap(), vec![rec.path]);
    }

    #[tokio::test]
    async fn unload_is_one_shot_and_turns_late_clients_away() {
        let (adapter, sink, transcript) = adapter();
        let early = adapter.connect(None, ClientIdentity::default()).await.unwrap();

        adapter.unload().await;
        adapter.unload().await;
        assert!(adapter.connect(None, ClientIdentity { name: "late".into(), ..Default::default() }).await.is_none());
        adapter.shutdown().await;

        let emitted = sink.emitted.lock().unwrap().clone();
        assert_eq!(emitted, vec![(early.path.clone(), HookSignal::Unload)]);
        assert_eq!(*sink.released.lock().unwrap(), vec![early.path]);
        assert!(transcript.entries().is_empty());
    }
}
