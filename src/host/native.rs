//! The seam between the bridge and the IRC client it is embedded in.
//!
//! A `NativeHost` is whatever plugin API the embedding client offers: it runs
//! commands, prints text, answers info/pref queries and installs hooks. When
//! one of those hooks fires the embedding code builds a `NativeEvent` and hands
//! it to `HostAdapter::dispatch`.

use std::collections::BTreeMap;

use hook_protocol::{tokenize, EatPolicy, HookKind, ListField, PrefValue, Priority};

/// Opaque token the native host hands back for an installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHookHandle(pub u64);

/// One row of a native list, keyed by field name.
pub type ListRow = BTreeMap<String, ListField>;

/// Everything the native host needs to install a hook.
#[derive(Debug, Clone, Copy)]
pub struct HookRequest<'a> {
    pub kind: HookKind,
    pub key: &'a str,
    pub priority: Priority,
    pub help: Option<&'a str>,
    pub eat: EatPolicy,
}

pub trait NativeHost: Send {
    /// Execute a client command, e.g. `nick Tak` or `join #rust`.
    fn command(&mut self, text: &str);

    /// Print text in the current window.
    fn print(&mut self, text: &str);

    fn get_info(&self, key: &str) -> Option<String>;

    fn get_prefs(&self, key: &str) -> PrefValue;

    /// Snapshot of a named list (`channels`, `users`, …), `None` if unknown.
    fn list_get(&self, name: &str) -> Option<Vec<ListRow>>;

    /// Install a native hook. `Err` carries the host's reason for refusing.
    fn register_hook(&mut self, request: &HookRequest<'_>) -> Result<NativeHookHandle, String>;

    /// Remove a native hook; returns whether the host knew the handle.
    fn unregister_hook(&mut self, handle: NativeHookHandle) -> bool;

    /// Switch the window/channel later calls act on. `false` if unknown.
    fn set_context(&mut self, _context: &str) -> bool {
        false
    }
}

/// A native event as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub kind: HookKind,
    /// Raw key as the host saw it (command name, IRC verb, print event name).
    pub key: String,
    pub words: Vec<String>,
    /// Server/channel the event happened in.
    pub context: String,
}

impl NativeEvent {
    pub fn new(kind: HookKind, key: impl Into<String>, text: &str, context: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            words: tokenize(text),
            context: context.into(),
        }
    }

    /// A typed command line; the key is its first word.
    pub fn command(text: &str, context: impl Into<String>) -> Self {
        let key = text.split_whitespace().next().unwrap_or_default().to_owned();
        Self::new(HookKind::Command, key, text, context)
    }

    /// A raw server line. A leading `:prefix` is skipped when picking the key.
    pub fn server(text: &str, context: impl Into<String>) -> Self {
        let mut words = text.split_whitespace();
        let key = match words.next() {
            Some(first) if first.starts_with(':') => words.next().unwrap_or_default(),
            Some(first) => first,
            None => "",
        }
        .to_owned();
        Self::new(HookKind::Server, key, text, context)
    }

    /// A print event with its argument list taken verbatim.
    pub fn print(event: impl Into<String>, args: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            kind: HookKind::Print,
            key: event.into(),
            words: args,
            context: context.into(),
        }
    }

    pub fn normalized_key(&self) -> String {
        normalize_key(&self.key)
    }
}

/// Keys of every kind are matched case-insensitively.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_skip_the_prefix() {
        let ev = NativeEvent::server(":nick!u@h PRIVMSG #chan :hi there", "irc");
        assert_eq!(ev.key, "PRIVMSG");
        assert_eq!(ev.words.len(), 5);

        let bare = NativeEvent::server("PING :12345", "irc");
        assert_eq!(bare.key, "PING");
    }

    #[test]
    fn command_key_is_first_word() {
        let ev = NativeEvent::command("blah one two", "#rust");
        assert_eq!(ev.kind, HookKind::Command);
        assert_eq!(ev.normalized_key(), "BLAH");
        assert_eq!(ev.words, vec!["blah", "one", "two"]);
    }

    #[test]
    fn print_args_are_kept_verbatim() {
        let ev = NativeEvent::print("Your Message", vec!["tak".into(), "hello world".into()], "#rust");
        assert_eq!(ev.words[1], "hello world");
        assert_eq!(ev.normalized_key(), "YOUR MESSAGE");
    }
}
