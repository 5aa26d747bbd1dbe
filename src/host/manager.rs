use std::collections::BTreeMap;

use hook_protocol::{BridgeError, BridgeResult, BusIdentity, ClientIdentity, ConnectionRecord};
use tracing::{info, warn};

use crate::host::{connection::ConnectionObject, native::NativeHost};

/// Allocates connection paths and owns every live `ConnectionObject`.
///
/// The sequence counter only ever grows; paths of disconnected clients are
/// never handed out again for the lifetime of the manager. Once `close_all`
/// has run the manager is unloading and refuses new clients.
#[derive(Debug)]
pub struct ConnectionManager {
    identity: BusIdentity,
    next_seq: u64,
    connections: BTreeMap<String, ConnectionObject>,
    unloading: bool,
}

impl ConnectionManager {
    pub fn new(identity: BusIdentity) -> Self {
        Self {
            identity,
            next_seq: 1,
            connections: BTreeMap::new(),
            unloading: false,
        }
    }

    pub fn identity(&self) -> &BusIdentity {
        &self.identity
    }

    /// Connect a client.
    ///
    /// `owner` is the path of the object `Connect` was invoked on. A call made
    /// on an object that is itself a connection returns `None` and allocates
    /// nothing. So does every call once the manager is unloading.
    pub fn connect(&mut self, owner: Option<&str>, identity: ClientIdentity) -> Option<ConnectionRecord> {
        if self.unloading {
            warn!(name = %identity.name, "refusing connect while unloading");
            return None;
        }
        if let Some(path) = owner.filter(|p| self.connections.contains_key(*p)) {
            warn!("{}", BridgeError::DuplicateConnect(path.to_owned()));
            return None;
        }

        let path = self.identity.connection_path(self.next_seq);
        self.next_seq += 1;
        let record = ConnectionRecord { identity, path: path.clone() };
        info!(%path, name = %record.identity.name, version = %record.identity.version, "🔌 client connected");
        self.connections.insert(path, ConnectionObject::new(record.clone()));
        Some(record)
    }

    /// Disconnect the connection at `owner`, releasing its native hooks.
    /// Unknown or absent owners are logged and otherwise ignored.
    pub fn disconnect(&mut self, owner: Option<&str>, host: &mut dyn NativeHost) -> Option<ConnectionRecord> {
        let Some(mut conn) = owner.and_then(|p| self.connections.remove(p)) else {
            info!("disconnect on an object that was never connected");
            return None;
        };
        conn.release(host);
        info!(path = %conn.path(), "👋 client disconnected");
        Some(conn.record().clone())
    }

    pub fn get(&self, path: &str) -> BridgeResult<&ConnectionObject> {
        self.connections
            .get(path)
            .ok_or_else(|| BridgeError::UnknownConnection(path.to_owned()))
    }

    pub fn get_mut(&mut self, path: &str) -> BridgeResult<&mut ConnectionObject> {
        self.connections
            .get_mut(path)
            .ok_or_else(|| BridgeError::UnknownConnection(path.to_owned()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ConnectionObject> {
        self.connections
            .values()
            .find(|c| c.record().identity.name == name)
    }

    pub fn paths(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionObject> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading
    }

    /// Start unloading: refuse new clients and close every open connection.
    /// Returns the paths that were open until now, so a second call returns
    /// nothing.
    pub fn close_all(&mut self) -> Vec<String> {
        self.unloading = true;
        self.connections
            .values_mut()
            .filter(|c| !c.is_closed())
            .map(|c| {
                c.close();
                c.path().to_owned()
            })
            .collect()
    }

    /// Drop the native hooks of every connection but keep the objects around.
    pub fn release_all(&mut self, host: &mut dyn NativeHost) {
        for conn in self.connections.values_mut() {
            conn.release(host);
        }
    }

    /// Release and forget every connection.
    pub fn drain_all(&mut self, host: &mut dyn NativeHost) -> Vec<ConnectionRecord> {
        std::mem::take(&mut self.connections)
            .into_values()
            .map(|mut conn| {
                conn.release(host);
                conn.record().clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{connection::HookCall, scripted::ScriptedHost};
    use hook_protocol::{Flavor, HookKind};

    fn ident(name: &str) -> ClientIdentity {
        ClientIdentity { name: name.into(), ..Default::default() }
    }

    #[test]
    fn paths_follow_the_flavor_base() {
        let mut m = ConnectionManager::new(Flavor::Weechat.identity());
        let a = m.connect(None, ident("a")).unwrap();
        let b = m.connect(Some("/tak/weebus/WeeBus"), ident("b")).unwrap();
        assert_eq!(a.path, "/tak/weebus/WeeBus/1");
        assert_eq!(b.path, "/tak/weebus/WeeBus/2");
        assert_eq!(m.find_by_name("b").map(|c| c.path()), Some("/tak/weebus/WeeBus/2"));
    }

    #[test]
    fn connect_on_a_connection_allocates_nothing() {
        let mut m = ConnectionManager::new(BusIdentity::default());
        let a = m.connect(None, ident("a")).unwrap();
        assert!(m.connect(Some(&a.path), ident("again")).is_none());
        assert!(m.connect(Some(&a.path), ident("again")).is_none());
        assert_eq!(m.len(), 1);
        let b = m.connect(None, ident("b")).unwrap();
        assert_eq!(b.path, "/org/xchat/Remote/2");
    }

    #[test]
    fn sequence_is_never_reused() {
        let mut host = ScriptedHost::new();
        let mut m = ConnectionManager::new(BusIdentity::default());
        let a = m.connect(None, ident("a")).unwrap();
        m.get_mut(&a.path)
            .unwrap()
            .hook(&mut host, HookCall { kind: HookKind::Command, key: "X".into(), priority: 0, help: None, eat: 0 })
            .unwrap();
        assert_eq!(host.installed_hooks(), 1);
        assert!(m.disconnect(Some(&a.path), &mut host).is_some());
        assert_eq!(host.installed_hooks(), 0);
        let b = m.connect(None, ident("a")).unwrap();
        assert_eq!(b.path, "/org/xchat/Remote/2");
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut host = ScriptedHost::new();
        let mut m = ConnectionManager::new(BusIdentity::default());
        assert!(m.disconnect(None, &mut host).is_none());
        let a = m.connect(None, ident("a")).unwrap();
        assert!(m.disconnect(Some(&a.path), &mut host).is_some());
        assert!(m.disconnect(Some(&a.path), &mut host).is_none());
        assert!(matches!(m.get(&a.path), Err(BridgeError::UnknownConnection(_))));
    }

    #[test]
    fn close_all_then_drain() {
        let mut host = ScriptedHost::new();
        let mut m = ConnectionManager::new(BusIdentity::default());
        m.connect(None, ident("a"));
        m.connect(None, ident("b"));
        let closed = m.close_all();
        assert_eq!(closed.len(), 2);
        assert!(m.connections().all(ConnectionObject::is_closed));
        assert_eq!(m.drain_all(&mut host).len(), 2);
        assert!(m.is_empty());
    }

    #[test]
    fn closing_is_one_shot_and_refuses_late_clients() {
        let mut m = ConnectionManager::new(BusIdentity::default());
        m.connect(None, ident("a"));
        assert_eq!(m.close_all(), vec!["/org/xchat/Remote/1".to_string()]);
        assert!(m.is_unloading());
        assert!(m.close_all().is_empty());
        assert!(m.connect(None, ident("late")).is_none());
        assert_eq!(m.len(), 1);
    }
}
