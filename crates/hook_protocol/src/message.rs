use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::BridgeError;

pub const COMMAND_SIGNAL: &str = "CommandSignal";
pub const SERVER_SIGNAL: &str = "ServerSignal";
pub const PRINT_SIGNAL: &str = "PrintSignal";
pub const UNLOAD_SIGNAL: &str = "UnloadSignal";

/// Identifies one registered hook within one connection.
///
/// Ids are handed out densely (1, 2, 3, …) in registration order and are never
/// reused for the lifetime of the connection. `0` means "nothing was registered".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(u32);

impl HandlerId {
    pub const NONE: HandlerId = HandlerId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_live(self) -> bool {
        self.0 != 0
    }

    /// Slot index backing this id, `None` for the reserved `0`.
    pub fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    /// Id for the slot at `index`, `None` once the id space is exhausted.
    pub fn from_slot(index: usize) -> Option<Self> {
        index
            .checked_add(1)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(HandlerId)
    }
}

impl From<u32> for HandlerId {
    fn from(raw: u32) -> Self {
        HandlerId(raw)
    }
}

impl From<HandlerId> for u32 {
    fn from(id: HandlerId) -> Self {
        id.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which native hook family an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    Command,
    Server,
    Print,
}

/// Whether a native event keeps propagating after being handled.
/// Enforcement is up to the native host; the bridge only carries the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum EatPolicy {
    #[default]
    None = 0,
    Host = 1,
    Plugin = 2,
    All = 3,
}

impl EatPolicy {
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for EatPolicy {
    type Error = BridgeError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(EatPolicy::None),
            1 => Ok(EatPolicy::Host),
            2 => Ok(EatPolicy::Plugin),
            3 => Ok(EatPolicy::All),
            other => Err(BridgeError::InvalidEatPolicy(other)),
        }
    }
}

/// Hook priority as understood by the native host. Higher runs earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(127);
    pub const HIGH: Priority = Priority(64);
    pub const NORM: Priority = Priority(0);
    pub const LOW: Priority = Priority(-64);
    pub const LOWEST: Priority = Priority(-128);
}

impl From<i32> for Priority {
    fn from(raw: i32) -> Self {
        Priority(raw)
    }
}

/// Splits native text into words on any run of whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

/// `result[i]` is the text from word `i` to the end, joined with single spaces.
pub fn words_from_index(words: &[String]) -> Vec<String> {
    let mut eol: Vec<String> = Vec::with_capacity(words.len());
    for word in words.iter().rev() {
        let suffix = match eol.last() {
            Some(rest) => format!("{word} {rest}"),
            None => word.clone(),
        };
        eol.push(suffix);
    }
    eol.reverse();
    eol
}

/// Payload of a command or server signal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventMessage {
    pub words: Vec<String>,
    pub words_eol: Vec<String>,
    pub context: String,
}

impl EventMessage {
    pub fn from_text(text: &str, context: impl Into<String>) -> Self {
        Self::from_words(tokenize(text), context)
    }

    pub fn from_words(words: Vec<String>, context: impl Into<String>) -> Self {
        let words_eol = words_from_index(&words);
        Self { words, words_eol, context: context.into() }
    }
}

/// Payload of a print signal. Print events carry no suffix table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrintMessage {
    pub words: Vec<String>,
    pub context: String,
}

/// Everything a connection object can emit towards its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "lowercase")]
pub enum HookSignal {
    Command { id: HandlerId, event: EventMessage },
    Server { id: HandlerId, event: EventMessage },
    Print { id: HandlerId, event: PrintMessage },
    Unload,
}

impl HookSignal {
    pub fn name(&self) -> &'static str {
        match self {
            HookSignal::Command { .. } => COMMAND_SIGNAL,
            HookSignal::Server { .. } => SERVER_SIGNAL,
            HookSignal::Print { .. } => PRINT_SIGNAL,
            HookSignal::Unload => UNLOAD_SIGNAL,
        }
    }

    pub fn handler_id(&self) -> Option<HandlerId> {
        match self {
            HookSignal::Command { id, .. }
            | HookSignal::Server { id, .. }
            | HookSignal::Print { id, .. } => Some(*id),
            HookSignal::Unload => None,
        }
    }
}

/// Value of a host preference.
///
/// On the wire this travels as `(status, string, int)` where status `0` means
/// no value, `1` string, `2` integer and `3` boolean.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrefValue {
    #[default]
    Missing,
    Str(String),
    Int(i32),
    Bool(bool),
}

impl PrefValue {
    pub fn to_wire(&self) -> (i32, String, i32) {
        match self {
            PrefValue::Missing => (0, String::new(), 0),
            PrefValue::Str(s) => (1, s.clone(), 0),
            PrefValue::Int(i) => (2, String::new(), *i),
            PrefValue::Bool(b) => (3, String::new(), i32::from(*b)),
        }
    }

    pub fn from_wire(status: i32, string: String, int: i32) -> Self {
        match status {
            1 => PrefValue::Str(string),
            2 => PrefValue::Int(int),
            3 => PrefValue::Bool(int != 0),
            _ => PrefValue::Missing,
        }
    }
}

/// One field of a native list row (channel list, user list, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListField {
    Str(String),
    Int(i32),
}

impl ListField {
    pub fn as_text(&self) -> String {
        match self {
            ListField::Str(s) => s.clone(),
            ListField::Int(i) => i.to_string(),
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            ListField::Str(s) => s.trim().parse().unwrap_or(0),
            ListField::Int(i) => *i,
        }
    }
}

/// What a client tells the host about itself when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Where the client came from (usually its executable or script path).
    pub filename: String,
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Bookkeeping for one connected client. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub identity: ClientIdentity,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privmsg_line_is_split_into_words_and_suffixes() {
        let ev = EventMessage::from_text("PRIVMSG #chan :hello world", "irc.example.org");
        assert_eq!(ev.words, vec!["PRIVMSG", "#chan", ":hello", "world"]);
        assert_eq!(ev.words_eol.len(), 4);
        assert_eq!(ev.words_eol[0], "PRIVMSG #chan :hello world");
        assert_eq!(ev.words_eol[2], ":hello world");
        assert_eq!(ev.words_eol[3], "world");
        assert_eq!(ev.context, "irc.example.org");
    }

    #[test]
    fn tokenize_collapses_whitespace_runs() {
        assert_eq!(tokenize("  BLAH\t one   two \n"), vec!["BLAH", "one", "two"]);
        assert!(tokenize("   ").is_empty());
        assert!(words_from_index(&[]).is_empty());
    }

    #[test]
    fn eat_policy_round_trips_through_raw_values() {
        for raw in 0..=3 {
            let policy = EatPolicy::try_from(raw).unwrap();
            assert_eq!(policy.as_raw(), raw);
        }
        assert!(matches!(EatPolicy::try_from(7), Err(BridgeError::InvalidEatPolicy(7))));
        assert!(matches!(EatPolicy::try_from(-1), Err(BridgeError::InvalidEatPolicy(-1))));
        assert_eq!("ALL".parse::<EatPolicy>().unwrap(), EatPolicy::All);
    }

    #[test]
    fn handler_id_slots() {
        assert_eq!(HandlerId::NONE.slot(), None);
        assert_eq!(HandlerId::new(1).slot(), Some(0));
        assert_eq!(HandlerId::from_slot(0), Some(HandlerId::new(1)));
        assert!(!HandlerId::NONE.is_live());
    }

    #[test]
    fn prefs_wire_format() {
        assert_eq!(PrefValue::Missing.to_wire(), (0, String::new(), 0));
        assert_eq!(PrefValue::from_wire(1, "tak".into(), 0), PrefValue::Str("tak".into()));
        assert_eq!(PrefValue::from_wire(3, String::new(), 1), PrefValue::Bool(true));
        assert_eq!(PrefValue::from_wire(9, "x".into(), 4), PrefValue::Missing);
    }

    #[test]
    fn signals_serialize_with_a_tag() {
        let sig = HookSignal::Print {
            id: HandlerId::new(4),
            event: PrintMessage { words: vec!["Hello".into()], context: "#rust".into() },
        };
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["signal"], "print");
        assert_eq!(json["id"], 4);
        assert_eq!(sig.name(), PRINT_SIGNAL);
    }
}
