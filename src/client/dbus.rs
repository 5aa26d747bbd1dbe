use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use hook_protocol::{
    BridgeError, BridgeResult, BusIdentity, ClientIdentity, EatPolicy, EventMessage, HandlerId, HookKind, HookSignal,
    PrefValue, PrintMessage, Priority, COMMAND_SIGNAL, PRINT_SIGNAL, SERVER_SIGNAL, UNLOAD_SIGNAL,
};
use serde::Serialize;
use tracing::{debug, trace};
use zbus::{fdo::IntrospectableProxy, message::Message, zvariant::{DynamicDeserialize, DynamicType}, Connection, Proxy};

use crate::{client::transport::PluginTransport, config::BusKind};

fn unavailable(err: zbus::Error) -> BridgeError {
    BridgeError::TransportUnavailable(err.to_string())
}

/// Talks to a host over a real message bus.
#[derive(Clone)]
pub struct DbusTransport {
    conn: Connection,
    identity: BusIdentity,
}

impl DbusTransport {
    pub async fn open(bus: BusKind, identity: BusIdentity) -> BridgeResult<Self> {
        let conn = bus.connect().await.map_err(unavailable)?;
        Ok(Self::new(conn, identity))
    }

    pub fn new(conn: Connection, identity: BusIdentity) -> Self {
        Self { conn, identity }
    }

    pub fn identity(&self) -> &BusIdentity {
        &self.identity
    }

    async fn proxy<'a>(&'a self, path: &'a str, interface: &'a str) -> BridgeResult<Proxy<'a>> {
        Proxy::new(&self.conn, self.identity.service.as_str(), path, interface)
            .await
            .map_err(unavailable)
    }

    async fn call_plugin<B, R>(&self, path: &str, method: &str, body: &B) -> BridgeResult<R>
    where
        B: Serialize + DynamicType + Sync,
        R: for<'d> DynamicDeserialize<'d>,
    {
        let proxy = self.proxy(path, &self.identity.plugin_interface).await?;
        trace!(%path, method, "calling");
        proxy.call(method, body).await.map_err(unavailable)
    }
}

/// Turn a raw plugin-interface signal into a `HookSignal`.
fn decode_signal(msg: &Message) -> Option<HookSignal> {
    let header = msg.header();
    let member = header.member()?;
    let body = msg.body();
    let decoded = match member.as_str() {
        COMMAND_SIGNAL | SERVER_SIGNAL => {
            let (words, words_eol, id, context): (Vec<String>, Vec<String>, u32, String) = body.deserialize().ok()?;
            let event = EventMessage { words, words_eol, context };
            let id = HandlerId::new(id);
            if member.as_str() == COMMAND_SIGNAL {
                HookSignal::Command { id, event }
            } else {
                HookSignal::Server { id, event }
            }
        }
        PRINT_SIGNAL => {
            let (words, id, context): (Vec<String>, u32, String) = body.deserialize().ok()?;
            HookSignal::Print { id: HandlerId::new(id), event: PrintMessage { words, context } }
        }
        UNLOAD_SIGNAL => HookSignal::Unload,
        other => {
            debug!("ignoring signal {other}");
            return None;
        }
    };
    Some(decoded)
}

#[async_trait]
impl PluginTransport for DbusTransport {
    async fn probe(&self) -> BridgeResult<()> {
        let proxy = IntrospectableProxy::builder(&self.conn)
            .destination(self.identity.service.as_str())
            .and_then(|b| b.path(self.identity.object.as_str()))
            .map_err(unavailable)?
            .build()
            .await
            .map_err(unavailable)?;
        let xml = proxy
            .introspect()
            .await
            .map_err(|e| BridgeError::TransportUnavailable(e.to_string()))?;
        if xml.contains(&format!("\"{}\"", self.identity.connection_interface)) {
            Ok(())
        } else {
            Err(BridgeError::InterfaceNotReady {
                path: self.identity.object.clone(),
                interface: self.identity.connection_interface.clone(),
            })
        }
    }

    async fn connect(&self, identity: &ClientIdentity) -> BridgeResult<String> {
        let proxy = self.proxy(&self.identity.object, &self.identity.connection_interface).await?;
        let body = (&identity.filename, &identity.name, &identity.description, &identity.version);
        proxy.call("Connect", &body).await.map_err(unavailable)
    }

    async fn disconnect(&self, path: &str) -> BridgeResult<()> {
        let proxy = self.proxy(path, &self.identity.connection_interface).await?;
        proxy.call("Disconnect", &()).await.map_err(unavailable)
    }

    async fn subscribe(&self, path: &str) -> BridgeResult<BoxStream<'static, HookSignal>> {
        let proxy = Proxy::new(
            &self.conn,
            self.identity.service.clone(),
            path.to_owned(),
            self.identity.plugin_interface.clone(),
        )
        .await
        .map_err(unavailable)?;
        let signals = proxy.receive_all_signals().await.map_err(unavailable)?;
        Ok(signals.filter_map(|msg| async move { decode_signal(&msg) }).boxed())
    }

    async fn command(&self, path: &str, text: &str) -> BridgeResult<()> {
        self.call_plugin(path, "Command", &(text,)).await
    }

    async fn print(&self, path: &str, text: &str) -> BridgeResult<()> {
        self.call_plugin(path, "Print", &(text,)).await
    }

    async fn get_info(&self, path: &str, key: &str) -> BridgeResult<String> {
        self.call_plugin(path, "GetInfo", &(key,)).await
    }

    async fn get_prefs(&self, path: &str, key: &str) -> BridgeResult<PrefValue> {
        let (status, string, int): (i32, String, i32) = self.call_plugin(path, "GetPrefs", &(key,)).await?;
        Ok(PrefValue::from_wire(status, string, int))
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
        let id: u32 = match kind {
            HookKind::Command => {
                self.call_plugin(path, "HookCommand", &(key, priority.0, help, eat.as_raw()))
                    .await?
            }
            HookKind::Server => self.call_plugin(path, "HookServer", &(key, priority.0, eat.as_raw())).await?,
            HookKind::Print => self.call_plugin(path, "HookPrint", &(key, priority.0, eat.as_raw())).await?,
        };
        Ok(HandlerId::new(id))
    }

    async fn unhook(&self, path: &str, id: HandlerId) -> BridgeResult<()> {
        self.call_plugin(path, "Unhook", &(id.get(),)).await
    }

    async fn list_get(&self, path: &str, name: &str) -> BridgeResult<u32> {
        self.call_plugin(path, "ListGet", &(name,)).await
    }

    async fn list_next(&self, path: &str, list: u32) -> BridgeResult<bool> {
        self.call_plugin(path, "ListNext", &(list,)).await
    }

    async fn list_str(&self, path: &str, list: u32, field: &str) -> BridgeResult<String> {
        self.call_plugin(path, "ListStr", &(list, field)).await
    }

    async fn list_int(&self, path: &str, list: u32, field: &str) -> BridgeResult<i32> {
        self.call_plugin(path, "ListInt", &(list, field)).await
    }

    async fn list_free(&self, path: &str, list: u32) -> BridgeResult<()> {
        self.call_plugin(path, "ListFree", &(list,)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/org/xchat/Remote/1";
    const IFACE: &str = "org.xchat.plugin";

    fn signal<B: Serialize + DynamicType>(member: &str, body: &B) -> Message {
        Message::signal(PATH, IFACE, member).unwrap().build(body).unwrap()
    }

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn command_and_server_signals_carry_words_eol_id_context() {
        let event = EventMessage::from_text("PRIVMSG #chan :hello world", "irc.example.org");
        let body = (&event.words, &event.words_eol, 3u32, "irc.example.org");

        let decoded = decode_signal(&signal(COMMAND_SIGNAL, &body));
        assert_eq!(decoded, Some(HookSignal::Command { id: HandlerId::new(3), event: event.clone() }));

        let decoded = decode_signal(&signal(SERVER_SIGNAL, &body));
        assert_eq!(decoded, Some(HookSignal::Server { id: HandlerId::new(3), event }));
    }

    #[test]
    fn print_signal_has_no_words_eol() {
        let decoded = decode_signal(&signal(PRINT_SIGNAL, &(words("tak hello"), 7u32, "#rust")));
        assert_eq!(
            decoded,
            Some(HookSignal::Print {
                id: HandlerId::new(7),
                event: PrintMessage { words: words("tak hello"), context: "#rust".into() },
            })
        );
    }

    #[test]
    fn unload_signal_has_no_body() {
        assert_eq!(decode_signal(&signal(UNLOAD_SIGNAL, &())), Some(HookSignal::Unload));
    }

    #[test]
    fn malformed_and_unknown_signals_are_dropped() {
        // print-shaped body on a command signal
        assert_eq!(decode_signal(&signal(COMMAND_SIGNAL, &(words("a b"), 1u32, "#c"))), None);
        assert_eq!(decode_signal(&signal(PRINT_SIGNAL, &("not a list",))), None);
        assert_eq!(decode_signal(&signal("NameAcquired", &("org.xchat.service",))), None);
    }

    #[test]
    fn prefs_travel_as_status_string_int() {
        for value in [
            PrefValue::Missing,
            PrefValue::Str("tak".into()),
            PrefValue::Int(42),
            PrefValue::Bool(true),
        ] {
            let msg = signal("GetPrefs", &value.to_wire());
            let (status, string, int): (i32, String, i32) = msg.body().deserialize().unwrap();
            assert_eq!(PrefValue::from_wire(status, string, int), value);
        }
        assert_eq!(PrefValue::Bool(false).to_wire(), (3, String::new(), 0));
    }
}
