use hook_protocol::{
    BridgeError, BridgeResult, ConnectionRecord, EatPolicy, HandlerId, HookKind, Priority,
};
use tracing::{debug, info, warn};

use crate::host::{
    dispatcher::{dispatch, Dispatch},
    native::{normalize_key, HookRequest, ListRow, NativeEvent, NativeHost},
    registry::{HandlerRegistry, HookEntry},
};

/// Parameters of a `Hook*` call as they arrive over the bus.
#[derive(Debug, Clone)]
pub struct HookCall {
    pub kind: HookKind,
    pub key: String,
    pub priority: i32,
    pub help: Option<String>,
    /// Raw wire value, validated on registration.
    pub eat: i32,
}

#[derive(Debug, Clone)]
struct ListCursor {
    rows: Vec<ListRow>,
    /// `None` until the first `next`.
    position: Option<usize>,
}

impl ListCursor {
    fn current(&self) -> Option<&ListRow> {
        self.rows.get(self.position?)
    }
}

/// State behind one client's bus object: its record, its hooks and its open lists.
#[derive(Debug)]
pub struct ConnectionObject {
    record: ConnectionRecord,
    registry: HandlerRegistry,
    lists: Vec<Option<ListCursor>>,
    closed: bool,
}

impl ConnectionObject {
    pub fn new(record: ConnectionRecord) -> Self {
        Self {
            record,
            registry: HandlerRegistry::new(),
            lists: Vec::new(),
            closed: false,
        }
    }

    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Refuse every further call; used once the unload signal went out.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn ensure_open(&self) -> BridgeResult<()> {
        if self.closed {
            Err(BridgeError::ConnectionClosed(self.record.path.clone()))
        } else {
            Ok(())
        }
    }

    /// Install a native hook and, only if that worked, hand out the next id.
    /// Any refusal yields `HandlerId::NONE`, a closed connection an error.
    pub fn hook(&mut self, host: &mut dyn NativeHost, call: HookCall) -> BridgeResult<HandlerId> {
        self.ensure_open()?;

        let eat = match EatPolicy::try_from(call.eat) {
            Ok(eat) => eat,
            Err(err) => {
                warn!(path = %self.record.path, key = %call.key, "❌ {err}");
                return Ok(HandlerId::NONE);
            }
        };
        let key = normalize_key(&call.key);
        let request = HookRequest {
            kind: call.kind,
            key: &key,
            priority: Priority(call.priority),
            help: call.help.as_deref(),
            eat,
        };

        let native = match host.register_hook(&request) {
            Ok(handle) => handle,
            Err(reason) => {
                let err = BridgeError::NativeRegistration { kind: call.kind, key, reason };
                warn!(path = %self.record.path, "❌ {err}");
                return Ok(HandlerId::NONE);
            }
        };

        let entry = HookEntry {
            key,
            kind: call.kind,
            priority: Priority(call.priority),
            eat,
            help: call.help,
            native,
        };
        match self.registry.insert(entry) {
            Some(id) => {
                debug!(path = %self.record.path, %id, kind = %call.kind, "hook registered");
                Ok(id)
            }
            None => {
                warn!(path = %self.record.path, "handler id space exhausted");
                host.unregister_hook(native);
                Ok(HandlerId::NONE)
            }
        }
    }

    /// Remove a hook. Unknown, stale or reserved ids are ignored.
    pub fn unhook(&mut self, host: &mut dyn NativeHost, id: HandlerId) -> BridgeResult<()> {
        self.ensure_open()?;
        match self.registry.remove(id) {
            Some(entry) => {
                if !host.unregister_hook(entry.native) {
                    warn!(path = %self.record.path, %id, "native host did not know hook `{}`", entry.key);
                }
                debug!(path = %self.record.path, %id, "hook removed");
            }
            None => debug!(path = %self.record.path, "{}", BridgeError::UnknownHandlerId(id)),
        }
        Ok(())
    }

    pub fn dispatch(&self, event: &NativeEvent) -> Dispatch {
        if self.closed {
            return Dispatch::default();
        }
        dispatch(&self.registry, event)
    }

    /// Open a cursor over a native list. `0` when the host has no such list.
    pub fn list_get(&mut self, host: &dyn NativeHost, name: &str) -> BridgeResult<u32> {
        self.ensure_open()?;
        let Some(rows) = host.list_get(name) else {
            debug!(path = %self.record.path, "no native list `{name}`");
            return Ok(0);
        };
        let Some(id) = HandlerId::from_slot(self.lists.len()) else {
            return Ok(0);
        };
        self.lists.push(Some(ListCursor { rows, position: None }));
        Ok(id.get())
    }

    /// Advance the cursor; `false` once it runs past the last row or the id is unknown.
    pub fn list_next(&mut self, list: u32) -> BridgeResult<bool> {
        self.ensure_open()?;
        let Some(cursor) = self.cursor_mut(list) else {
            return Ok(false);
        };
        let next = cursor.position.map_or(0, |p| p + 1);
        cursor.position = Some(next.min(cursor.rows.len()));
        Ok(next < cursor.rows.len())
    }

    pub fn list_str(&self, list: u32, field: &str) -> BridgeResult<String> {
        self.ensure_open()?;
        Ok(self
            .cursor(list)
            .and_then(ListCursor::current)
            .and_then(|row| row.get(field))
            .map(|f| f.as_text())
            .unwrap_or_default())
    }

    pub fn list_int(&self, list: u32, field: &str) -> BridgeResult<i32> {
        self.ensure_open()?;
        Ok(self
            .cursor(list)
            .and_then(ListCursor::current)
            .and_then(|row| row.get(field))
            .map(|f| f.as_int())
            .unwrap_or_default())
    }

    pub fn list_free(&mut self, list: u32) -> BridgeResult<()> {
        self.ensure_open()?;
        if let Some(slot) = HandlerId::new(list).slot().and_then(|i| self.lists.get_mut(i)) {
            *slot = None;
        }
        Ok(())
    }

    /// Drop every hook and list this connection holds on the native side.
    pub fn release(&mut self, host: &mut dyn NativeHost) {
        let hooks = self.registry.drain_live();
        let count = hooks.len();
        for (id, entry) in hooks {
            if !host.unregister_hook(entry.native) {
                warn!(path = %self.record.path, %id, "native host did not know hook `{}`", entry.key);
            }
        }
        self.lists.clear();
        info!(path = %self.record.path, hooks = count, "🧹 released connection");
    }

    fn cursor(&self, list: u32) -> Option<&ListCursor> {
        let index = HandlerId::new(list).slot()?;
        self.lists.get(index)?.as_ref()
    }

    fn cursor_mut(&mut self, list: u32) -> Option<&mut ListCursor> {
        let index = HandlerId::new(list).slot()?;
        self.lists.get_mut(index)?.as_mut()
    }
}
