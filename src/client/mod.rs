//! The bridge client: registers interest with a host over some transport and
//! turns the host's signals back into local callbacks.

pub mod dbus;
pub mod handle;
pub mod transport;

use std::{any::Any, collections::HashMap, future::Future, panic, panic::AssertUnwindSafe, sync::Arc};

use futures::{future::BoxFuture, stream::BoxStream, FutureExt, StreamExt};
use hook_protocol::{
    BridgeError, BridgeResult, ClientIdentity, EatPolicy, EventMessage, HandlerId, HookKind, HookSignal,
    PrintMessage, Priority,
};
use strum_macros::Display;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace, warn};

pub use handle::PluginHandle;
pub use transport::{BusTransport, PluginTransport};

use crate::config::RetryPolicy;

/// Built-in administrative command; `HOOKBUS quit` stops the client.
pub const ADMIN_COMMAND: &str = "HOOKBUS";
const ADMIN_HELP: &str = "hookbus administrative stuff: QUIT";

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
type EventCallback = Arc<dyn Fn(EventMessage) -> HandlerFuture + Send + Sync>;
type PrintCallback = Arc<dyn Fn(PrintMessage) -> HandlerFuture + Send + Sync>;

enum Handler {
    Command(EventCallback),
    Server(EventCallback),
    Print(PrintCallback),
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExitReason {
    /// The host sent its unload signal.
    Unloaded,
    /// Someone typed `HOOKBUS quit`.
    Quit,
    /// The caller's stop future completed.
    Interrupted,
    /// The signal stream ended.
    TransportClosed,
}

/// Call `probe` every `retry.interval` until it succeeds or the next attempt
/// would start after `retry.max_wait`; the last error is returned then.
pub async fn wait_ready<F, Fut>(retry: RetryPolicy, mut probe: F) -> BridgeResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<()>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match probe().await {
            Ok(()) => {
                debug!(attempt, "host is ready");
                return Ok(());
            }
            Err(err) if started.elapsed() + retry.interval > retry.max_wait => {
                warn!(attempt, "❌ giving up on the host after {:?}: {err}", started.elapsed());
                return Err(err);
            }
            Err(err) => {
                if attempt == 1 {
                    info!("💤 waiting for the host: {err}");
                } else {
                    trace!(attempt, "still waiting: {err}");
                }
                sleep(retry.interval).await;
            }
        }
    }
}

fn is_quit(words: &[String]) -> bool {
    words.get(1).is_some_and(|w| w.trim().eq_ignore_ascii_case("quit"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Run one callback; errors and panics are logged and swallowed.
async fn invoke(id: HandlerId, start: impl FnOnce() -> HandlerFuture) {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
        Err(payload) => Err(payload),
    };
    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    error!("❌ {}", BridgeError::HandlerInvocationFailure { id, reason });
}

pub struct BridgeClient {
    name: String,
    handle: PluginHandle,
    signals: BoxStream<'static, HookSignal>,
    handlers: HashMap<HandlerId, Handler>,
    admin: HandlerId,
}

impl BridgeClient {
    /// Wait for the host, connect, subscribe to the private path and install
    /// the admin command.
    pub async fn connect(
        transport: impl Into<BusTransport>,
        identity: ClientIdentity,
        retry: RetryPolicy,
    ) -> BridgeResult<Self> {
        let transport = transport.into();
        wait_ready(retry, || transport.probe()).await?;

        let path = transport.connect(&identity).await?;
        if path.is_empty() {
            return Err(BridgeError::DuplicateConnect(identity.name));
        }
        let signals = match transport.subscribe(&path).await {
            Ok(signals) => signals,
            Err(err) => {
                if let Err(e) = transport.disconnect(&path).await {
                    debug!(%path, "disconnect after failed subscribe: {e}");
                }
                return Err(err);
            }
        };

        let handle = PluginHandle::new(transport, path);
        let admin = handle
            .hook(HookKind::Command, ADMIN_COMMAND, Priority::NORM, ADMIN_HELP, EatPolicy::All)
            .await;
        if !admin.is_live() {
            warn!("❌ could not register {ADMIN_COMMAND}; quit from the host is unavailable");
        }

        info!(path = %handle.path(), "✅ {} connected", identity.name);
        handle.print(&format!("{} loaded.", identity.name)).await;
        Ok(Self {
            name: identity.name,
            handle,
            signals,
            handlers: HashMap::new(),
            admin,
        })
    }

    /// A cloneable handle for RPCs, e.g. to move into callbacks.
    pub fn handle(&self) -> PluginHandle {
        self.handle.clone()
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    // ── registration ────────────────────────────────────────────────────

    /// Hook a client command; the host eats it (`EatPolicy::All`).
    pub async fn hook_command<F, Fut>(&mut self, command: &str, priority: Priority, help: &str, callback: F) -> HandlerId
    where
        F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook_command_with(command, priority, help, EatPolicy::All, callback).await
    }

    pub async fn hook_command_with<F, Fut>(
        &mut self,
        command: &str,
        priority: Priority,
        help: &str,
        eat: EatPolicy,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.handle.hook(HookKind::Command, command, priority, help, eat).await;
        self.store(id, Handler::Command(Arc::new(move |ev| callback(ev).boxed())))
    }

    /// Hook a raw server message such as `PRIVMSG`; it keeps propagating.
    pub async fn hook_server<F, Fut>(&mut self, event: &str, priority: Priority, callback: F) -> HandlerId
    where
        F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook_server_with(event, priority, EatPolicy::None, callback).await
    }

    pub async fn hook_server_with<F, Fut>(&mut self, event: &str, priority: Priority, eat: EatPolicy, callback: F) -> HandlerId
    where
        F: Fn(EventMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.handle.hook(HookKind::Server, event, priority, "", eat).await;
        self.store(id, Handler::Server(Arc::new(move |ev| callback(ev).boxed())))
    }

    /// Hook a print event such as `Your Message`; it keeps propagating.
    pub async fn hook_print<F, Fut>(&mut self, event: &str, priority: Priority, callback: F) -> HandlerId
    where
        F: Fn(PrintMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hook_print_with(event, priority, EatPolicy::None, callback).await
    }

    pub async fn hook_print_with<F, Fut>(&mut self, event: &str, priority: Priority, eat: EatPolicy, callback: F) -> HandlerId
    where
        F: Fn(PrintMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.handle.hook(HookKind::Print, event, priority, "", eat).await;
        self.store(id, Handler::Print(Arc::new(move |ev| callback(ev).boxed())))
    }

    fn store(&mut self, id: HandlerId, handler: Handler) -> HandlerId {
        if id.is_live() {
            self.handlers.insert(id, handler);
        }
        id
    }

    /// Drop a local handler and its host registration. Unknown ids are ignored.
    pub async fn unhook(&mut self, id: HandlerId) {
        if self.handlers.remove(&id).is_some() {
            self.handle.unhook(id).await;
        }
    }

    // ── event loop ──────────────────────────────────────────────────────

    pub async fn run(self) -> ExitReason {
        self.run_until(futures::future::pending::<()>()).await
    }

    /// Deliver signals until the host unloads us, `HOOKBUS quit` arrives, the
    /// stream ends or `stop` completes. Every exit path cleans up.
    pub async fn run_until(mut self, stop: impl Future<Output = ()>) -> ExitReason {
        tokio::pin!(stop);
        let reason = loop {
            tokio::select! {
                _ = &mut stop => break ExitReason::Interrupted,
                next = self.signals.next() => match next {
                    None => break ExitReason::TransportClosed,
                    Some(HookSignal::Unload) => break ExitReason::Unloaded,
                    Some(signal) => {
                        if let Some(reason) = self.deliver(signal).await {
                            break reason;
                        }
                    }
                },
            }
        };

        info!(path = %self.handle.path(), %reason, "🛑 {} stopping", self.name);
        if reason == ExitReason::Unloaded {
            self.handle.print(&format!("{}: unloading.", self.name)).await;
        }
        self.cleanup().await;
        reason
    }

    async fn deliver(&mut self, signal: HookSignal) -> Option<ExitReason> {
        let id = signal.handler_id()?;

        if id == self.admin {
            if let HookSignal::Command { event, .. } = &signal {
                if is_quit(&event.words) {
                    self.handle.print(&format!("{}: quitting.", self.name)).await;
                    return Some(ExitReason::Quit);
                }
            }
            return None;
        }

        let Some(handler) = self.handlers.get(&id) else {
            trace!(%id, signal = signal.name(), "no handler, dropping");
            return None;
        };
        match (handler, signal) {
            (Handler::Command(cb), HookSignal::Command { event, .. })
            | (Handler::Server(cb), HookSignal::Server { event, .. }) => {
                let cb = cb.clone();
                invoke(id, move || cb(event)).await;
            }
            (Handler::Print(cb), HookSignal::Print { event, .. }) => {
                let cb = cb.clone();
                invoke(id, move || cb(event)).await;
            }
            (_, other) => debug!(%id, signal = other.name(), "signal does not match the handler kind"),
        }
        None
    }

    /// Unhook everything we registered, then disconnect.
    async fn cleanup(&mut self) {
        let ids: Vec<HandlerId> = self.handlers.drain().map(|(id, _)| id).chain([self.admin]).collect();
        for id in ids {
            self.handle.unhook(id).await;
        }
        self.handle.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, time::Duration};

    fn retry(interval: u64, max_wait: u64) -> RetryPolicy {
        RetryPolicy { interval: Duration::from_millis(interval), max_wait: Duration::from_millis(max_wait) }
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_succeeds_once_the_interface_shows_up() {
        let calls = Cell::new(0);
        let result = wait_ready(retry(10, 1_000), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(BridgeError::InterfaceNotReady { path: "/org/xchat/Remote".into(), interface: "org.xchat.connection".into() })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_is_bounded() {
        let calls = Cell::new(0);
        let started = Instant::now();
        let result = wait_ready(retry(10, 50), || {
            calls.set(calls.get() + 1);
            async { Err(BridgeError::TransportUnavailable("no bus".into())) }
        })
        .await;
        assert_eq!(result, Err(BridgeError::TransportUnavailable("no bus".into())));
        assert_eq!(calls.get(), 6);
        assert!(started.elapsed() <= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_wait_probes_once() {
        let calls = Cell::new(0);
        let result = wait_ready(retry(100, 0), || {
            calls.set(calls.get() + 1);
            async { Err(BridgeError::TransportUnavailable("no bus".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn quit_is_case_insensitive() {
        let words = |s: &str| s.split_whitespace().map(str::to_owned).collect::<Vec<_>>();
        assert!(is_quit(&words("HOOKBUS quit")));
        assert!(is_quit(&words("hookbus QuIt")));
        assert!(!is_quit(&words("HOOKBUS")));
        assert!(!is_quit(&words("HOOKBUS status quit")));
    }

    async fn fails() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn panics() -> anyhow::Result<()> {
        panic!("inside the future")
    }

    #[tokio::test]
    async fn failing_handlers_are_contained() {
        invoke(HandlerId::new(1), || fails().boxed()).await;
        invoke(HandlerId::new(2), || panics().boxed()).await;
        invoke(HandlerId::new(3), || panic!("before the future")).await;
        assert_eq!(panic_message(&"x"), "panicked: x");
    }
}
