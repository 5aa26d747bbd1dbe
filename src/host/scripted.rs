//! An in-memory stand-in for a real IRC client.
//!
//! `ScriptedHost` answers info/pref/list queries from tables, records every
//! command and print in a shared `Transcript`, and keeps track of installed
//! hooks. The `hookbus host` command drives it from stdin with `parse_line`.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{bail, Result};
use hook_protocol::{HookKind, PrefValue};
use tracing::{debug, info};

use crate::host::native::{normalize_key, HookRequest, ListRow, NativeEvent, NativeHookHandle, NativeHost};

/// What the scripted host was asked to do on behalf of clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutput {
    Command(String),
    Print(String),
}

/// Shared, cloneable log of host output.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<HostOutput>>>);

impl Transcript {
    fn push(&self, out: HostOutput) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(out);
    }

    pub fn entries(&self) -> Vec<HostOutput> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn prints(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|o| match o {
                HostOutput::Print(text) => Some(text),
                HostOutput::Command(_) => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|o| match o {
                HostOutput::Command(text) => Some(text),
                HostOutput::Print(_) => None,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct ScriptedHost {
    info: HashMap<String, String>,
    prefs: HashMap<String, PrefValue>,
    lists: HashMap<String, Vec<ListRow>>,
    refused: HashSet<String>,
    hooks: HashMap<NativeHookHandle, (HookKind, String)>,
    next_handle: u64,
    context: String,
    transcript: Transcript,
    echo: bool,
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHost {
    pub fn new() -> Self {
        let info = HashMap::from([
            ("nick".to_string(), "hookbus".to_string()),
            ("server".to_string(), "irc.example.org".to_string()),
            ("network".to_string(), "example".to_string()),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ]);
        Self {
            info,
            prefs: HashMap::new(),
            lists: HashMap::new(),
            refused: HashSet::new(),
            hooks: HashMap::new(),
            next_handle: 1,
            context: "irc.example.org".to_string(),
            transcript: Transcript::default(),
            echo: false,
        }
    }

    /// Also write prints to stdout, as the console host does.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    pub fn set_info(&mut self, key: &str, value: &str) {
        self.info.insert(key.to_owned(), value.to_owned());
    }

    pub fn set_pref(&mut self, key: &str, value: PrefValue) {
        self.prefs.insert(key.to_owned(), value);
    }

    pub fn set_list(&mut self, name: &str, rows: Vec<ListRow>) {
        self.lists.insert(name.to_owned(), rows);
    }

    /// Make every future registration of `key` fail.
    pub fn refuse(&mut self, key: &str) {
        self.refused.insert(normalize_key(key));
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn installed_hooks(&self) -> usize {
        self.hooks.len()
    }

    pub fn has_hook(&self, kind: HookKind, key: &str) -> bool {
        let key = normalize_key(key);
        self.hooks.values().any(|(k, name)| *k == kind && *name == key)
    }
}

impl NativeHost for ScriptedHost {
    fn command(&mut self, text: &str) {
        info!("▶️  command: {text}");
        self.transcript.push(HostOutput::Command(text.to_owned()));
    }

    fn print(&mut self, text: &str) {
        if self.echo {
            println!("{text}");
        }
        self.transcript.push(HostOutput::Print(text.to_owned()));
    }

    fn get_info(&self, key: &str) -> Option<String> {
        match key {
            "channel" => Some(self.context.clone()),
            _ => self.info.get(key).cloned(),
        }
    }

    fn get_prefs(&self, key: &str) -> PrefValue {
        self.prefs.get(key).cloned().unwrap_or_default()
    }

    fn list_get(&self, name: &str) -> Option<Vec<ListRow>> {
        self.lists.get(name).cloned()
    }

    fn register_hook(&mut self, request: &HookRequest<'_>) -> Result<NativeHookHandle, String> {
        if request.key.is_empty() {
            return Err("empty key".into());
        }
        if request.kind == HookKind::Command && request.key.contains(char::is_whitespace) {
            return Err("command names cannot contain whitespace".into());
        }
        if self.refused.contains(request.key) {
            return Err("refused by host".into());
        }
        let handle = NativeHookHandle(self.next_handle);
        self.next_handle += 1;
        self.hooks.insert(handle, (request.kind, request.key.to_owned()));
        debug!(kind = %request.kind, key = request.key, priority = request.priority.0, "native hook installed");
        Ok(handle)
    }

    fn unregister_hook(&mut self, handle: NativeHookHandle) -> bool {
        self.hooks.remove(&handle).is_some()
    }

    fn set_context(&mut self, context: &str) -> bool {
        if context.trim().is_empty() {
            return false;
        }
        self.context = context.trim().to_owned();
        true
    }
}

/// One line of console input for the scripted host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Event(NativeEvent),
    SetContext(String),
    Unload,
    Blank,
}

/// Parse a console line.
///
/// ```text
/// command BLAH one two
/// server :nick!u@h PRIVMSG #rust :hello world
/// print Your Message|tak|hello world
/// context #rust
/// unload
/// ```
pub fn parse_line(line: &str, context: &str) -> Result<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(ConsoleInput::Blank);
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match verb.to_ascii_lowercase().as_str() {
        "command" | "cmd" if !rest.is_empty() => Ok(ConsoleInput::Event(NativeEvent::command(rest, context))),
        "server" | "raw" if !rest.is_empty() => Ok(ConsoleInput::Event(NativeEvent::server(rest, context))),
        "print" if !rest.is_empty() => {
            let mut parts = rest.split('|');
            let event = parts.next().unwrap_or_default().trim();
            let args = parts.map(str::to_owned).collect();
            Ok(ConsoleInput::Event(NativeEvent::print(event, args, context)))
        }
        "context" if !rest.is_empty() => Ok(ConsoleInput::SetContext(rest.to_owned())),
        "unload" | "quit" => Ok(ConsoleInput::Unload),
        _ => bail!("cannot parse `{line}`"),
    }
}
