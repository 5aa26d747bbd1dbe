//! Native event → bus signal matching.
//!
//! Every live entry whose kind and (upper-cased) key match the event produces
//! its own signal; there is no first-match-wins.

use hook_protocol::{EatPolicy, EventMessage, HandlerId, HookKind, HookSignal, PrintMessage};

use crate::host::{native::NativeEvent, registry::HandlerRegistry};

/// Signals produced for one connection plus the strongest eat policy among the matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub signals: Vec<HookSignal>,
    pub eat: EatPolicy,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

fn signal_for(id: HandlerId, event: &NativeEvent) -> HookSignal {
    match event.kind {
        HookKind::Command => HookSignal::Command {
            id,
            event: EventMessage::from_words(event.words.clone(), event.context.clone()),
        },
        HookKind::Server => HookSignal::Server {
            id,
            event: EventMessage::from_words(event.words.clone(), event.context.clone()),
        },
        HookKind::Print => HookSignal::Print {
            id,
            event: PrintMessage { words: event.words.clone(), context: event.context.clone() },
        },
    }
}

pub fn dispatch(registry: &HandlerRegistry, event: &NativeEvent) -> Dispatch {
    let key = event.normalized_key();
    let mut out = Dispatch::default();
    for (id, entry) in registry.matching(event.kind, &key) {
        out.eat = out.eat.max(entry.eat);
        out.signals.push(signal_for(id, event));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{native::NativeHookHandle, registry::HookEntry};
    use hook_protocol::Priority;

    fn reg_with(entries: &[(HookKind, &str, EatPolicy)]) -> HandlerRegistry {
        let mut reg = HandlerRegistry::new();
        for (n, (kind, key, eat)) in entries.iter().enumerate() {
            reg.insert(HookEntry {
                key: key.to_string(),
                kind: *kind,
                priority: Priority::NORM,
                eat: *eat,
                help: None,
                native: NativeHookHandle(n as u64),
            });
        }
        reg
    }

    #[test]
    fn every_match_gets_its_own_signal() {
        let reg = reg_with(&[
            (HookKind::Command, "BLAH", EatPolicy::None),
            (HookKind::Command, "OTHER", EatPolicy::None),
            (HookKind::Command, "BLAH", EatPolicy::All),
        ]);
        let d = dispatch(&reg, &NativeEvent::command("blah x y", "#rust"));
        let ids: Vec<_> = d.signals.iter().filter_map(HookSignal::handler_id).collect();
        assert_eq!(ids, vec![HandlerId::new(1), HandlerId::new(3)]);
        assert_eq!(d.eat, EatPolicy::All);
        match &d.signals[0] {
            HookSignal::Command { event, .. } => {
                assert_eq!(event.words, vec!["blah", "x", "y"]);
                assert_eq!(event.words_eol[1], "x y");
                assert_eq!(event.context, "#rust");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_event_payload() {
        let reg = reg_with(&[(HookKind::Server, "PRIVMSG", EatPolicy::None)]);
        let d = dispatch(&reg, &NativeEvent::server("PRIVMSG #chan :hello world", "irc"));
        assert_eq!(d.signals.len(), 1);
        let HookSignal::Server { id, event } = &d.signals[0] else {
            panic!("expected a server signal");
        };
        assert_eq!(*id, HandlerId::new(1));
        assert_eq!(event.words, vec!["PRIVMSG", "#chan", ":hello", "world"]);
        assert_eq!(event.words_eol[2], ":hello world");
    }

    #[test]
    fn print_keys_match_case_insensitively() {
        let reg = reg_with(&[(HookKind::Print, "YOUR MESSAGE", EatPolicy::None)]);
        let ev = NativeEvent::print("Your Message", vec!["Hello".into()], "#rust");
        let d = dispatch(&reg, &ev);
        assert_eq!(
            d.signals,
            vec![HookSignal::Print {
                id: HandlerId::new(1),
                event: PrintMessage { words: vec!["Hello".into()], context: "#rust".into() },
            }]
        );
    }

    #[test]
    fn kinds_do_not_cross_match() {
        let reg = reg_with(&[(HookKind::Print, "PRIVMSG", EatPolicy::All)]);
        let d = dispatch(&reg, &NativeEvent::server("PRIVMSG #c :x", "irc"));
        assert!(d.is_empty());
        assert_eq!(d.eat, EatPolicy::None);
    }
}
