use hook_protocol::{EatPolicy, HandlerId, HookKind, Priority};

use crate::host::native::NativeHookHandle;

/// A live hook registration of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEntry {
    /// Normalized (upper-cased) key.
    pub key: String,
    pub kind: HookKind,
    pub priority: Priority,
    pub eat: EatPolicy,
    pub help: Option<String>,
    pub native: NativeHookHandle,
}

#[derive(Debug, Clone)]
enum Slot {
    Live(HookEntry),
    Tombstone,
}

/// Per-connection table of handler id → hook entry.
///
/// Slots are append-only: removing an entry leaves a tombstone so ids keep
/// growing and a stale id can never point at a newer registration.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    slots: Vec<Slot>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under the next id. `None` once the id space is exhausted.
    pub fn insert(&mut self, entry: HookEntry) -> Option<HandlerId> {
        let id = HandlerId::from_slot(self.slots.len())?;
        self.slots.push(Slot::Live(entry));
        Some(id)
    }

    /// Tombstone `id`. Unknown, reserved and already removed ids yield `None`.
    pub fn remove(&mut self, id: HandlerId) -> Option<HookEntry> {
        let slot = self.slots.get_mut(id.slot()?)?;
        match std::mem::replace(slot, Slot::Tombstone) {
            Slot::Live(entry) => Some(entry),
            Slot::Tombstone => None,
        }
    }

    pub fn get(&self, id: HandlerId) -> Option<&HookEntry> {
        match self.slots.get(id.slot()?)? {
            Slot::Live(entry) => Some(entry),
            Slot::Tombstone => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HandlerId, &HookEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Live(entry) => HandlerId::from_slot(index).map(|id| (id, entry)),
            Slot::Tombstone => None,
        })
    }

    /// Live entries of `kind` whose key equals the already normalized `key`.
    pub fn matching<'a>(
        &'a self,
        kind: HookKind,
        key: &'a str,
    ) -> impl Iterator<Item = (HandlerId, &'a HookEntry)> + 'a {
        self.iter()
            .filter(move |(_, entry)| entry.kind == kind && entry.key == key)
    }

    /// Tombstone every live entry and hand them back, e.g. for native cleanup.
    pub fn drain_live(&mut self) -> Vec<(HandlerId, HookEntry)> {
        let mut drained = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Live(entry) = std::mem::replace(slot, Slot::Tombstone) {
                if let Some(id) = HandlerId::from_slot(index) {
                    drained.push((id, entry));
                }
            }
        }
        drained
    }

    pub fn live_count(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: HookKind, key: &str, native: u64) -> HookEntry {
        HookEntry {
            key: key.to_owned(),
            kind,
            priority: Priority::NORM,
            eat: EatPolicy::None,
            help: None,
            native: NativeHookHandle(native),
        }
    }

    #[test]
    fn ids_are_dense_and_never_reused() {
        let mut reg = HandlerRegistry::new();
        let a = reg.insert(entry(HookKind::Command, "BLAH", 1)).unwrap();
        let b = reg.insert(entry(HookKind::Server, "PRIVMSG", 2)).unwrap();
        assert_eq!((a.get(), b.get()), (1, 2));

        assert!(reg.remove(a).is_some());
        let c = reg.insert(entry(HookKind::Print, "YOUR MESSAGE", 3)).unwrap();
        assert_eq!(c.get(), 3);
        assert!(reg.get(a).is_none());
        assert_eq!(reg.live_count(), 2);
    }

    #[test]
    fn removing_any_id_is_harmless() {
        let mut reg = HandlerRegistry::new();
        let a = reg.insert(entry(HookKind::Command, "BLAH", 1)).unwrap();
        assert!(reg.remove(HandlerId::NONE).is_none());
        assert!(reg.remove(HandlerId::new(42)).is_none());
        assert!(reg.remove(HandlerId::new(u32::MAX)).is_none());
        assert!(reg.remove(a).is_some());
        assert!(reg.remove(a).is_none());
        assert_eq!(reg.live_count(), 0);
    }

    #[test]
    fn matching_respects_kind_and_tombstones() {
        let mut reg = HandlerRegistry::new();
        let a = reg.insert(entry(HookKind::Command, "PRIVMSG", 1)).unwrap();
        let b = reg.insert(entry(HookKind::Server, "PRIVMSG", 2)).unwrap();
        let c = reg.insert(entry(HookKind::Server, "PRIVMSG", 3)).unwrap();
        reg.remove(c);

        let ids: Vec<_> = reg.matching(HookKind::Server, "PRIVMSG").map(|(id, _)| id).collect();
        assert_eq!(ids, vec![b]);
        let ids: Vec<_> = reg.matching(HookKind::Command, "PRIVMSG").map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a]);
    }

    #[test]
    fn drain_live_leaves_only_tombstones() {
        let mut reg = HandlerRegistry::new();
        reg.insert(entry(HookKind::Command, "A", 1));
        let b = reg.insert(entry(HookKind::Command, "B", 2)).unwrap();
        reg.remove(b);
        let drained = reg.drain_live();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.native, NativeHookHandle(1));
        assert_eq!(reg.live_count(), 0);
        assert_eq!(reg.insert(entry(HookKind::Command, "C", 3)).unwrap().get(), 3);
    }
}
