//! Slash-command table and dispatch.
//!
//! Commands are looked up by case-folded name in an explicit [`CommandTable`]
//! passed into every dispatch call; there is no ambient command state.
//! Handlers are enumerated variants bound to the descriptor rather than free
//! functions, so the table stays a plain data structure.

use crate::chat::broadcast::{broadcast_to, send_to};
use crate::chat::framer::MAX_NAME_SIZE;
use crate::chat::registry::{ConnectionRegistry, Link, PeerId};
use std::collections::HashMap;
use tracing::debug;

/// Behavior bound to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// `/pseudo <name>`: rename the requester.
    SetName,
    /// `/help [name]` and `/?`: list commands or show one usage line.
    Help,
}

/// Usage text bound to a command, shown on arity errors and `/help <name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpAction {
    SetName,
    Help,
}

impl HelpAction {
    fn usage(self) -> &'static str {
        match self {
            HelpAction::SetName => "Usage: /pseudo mon_pseudo",
            HelpAction::Help => "Usage: /help [commande]",
        }
    }
}

/// One entry of the command table.
///
/// `action` may be absent: the command is recognized but unimplemented and
/// answers with a dedicated notice instead of an unknown-command error.
pub struct CommandDescriptor {
    pub action: Option<CommandAction>,
    pub min_params: usize,
    pub max_params: usize,
    pub help: Option<HelpAction>,
}

/// Table of registered commands, keyed by lowercase slash-prefixed name.
pub struct CommandTable {
    entries: HashMap<&'static str, CommandDescriptor>,
}

impl CommandTable {
    /// Table with the built-in chat protocol commands.
    pub fn with_builtins() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "/pseudo",
            CommandDescriptor {
                action: Some(CommandAction::SetName),
                min_params: 1,
                max_params: 1,
                help: Some(HelpAction::SetName),
            },
        );
        entries.insert(
            "/help",
            CommandDescriptor {
                action: Some(CommandAction::Help),
                min_params: 0,
                max_params: 1,
                help: Some(HelpAction::Help),
            },
        );
        entries.insert(
            "/?",
            CommandDescriptor {
                action: Some(CommandAction::Help),
                min_params: 0,
                max_params: 1,
                help: Some(HelpAction::Help),
            },
        );
        // Reserved but not implemented.
        entries.insert(
            "/toto",
            CommandDescriptor {
                action: None,
                min_params: 0,
                max_params: 5,
                help: None,
            },
        );
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.entries.get(name)
    }

    /// All registered command names, sorted.
    pub fn names_sorted(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// User-facing dispatch failures. Reported to the requester only; they never
/// propagate further and never touch other peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    UnknownCommand,
    ArityError,
    NotImplemented,
}

impl CommandError {
    fn notice(self) -> &'static str {
        match self {
            CommandError::UnknownCommand => "Hmm, cette commande m'est inconnue.",
            CommandError::ArityError => "Erreur: nombre de paramètre invalide",
            CommandError::NotImplemented => "Arrgh! Cette commande n'est pas implémentée.",
        }
    }
}

/// Parse and execute one slash-prefixed line on behalf of `requester`.
pub fn dispatch<S: Link>(
    table: &CommandTable,
    raw_line: &str,
    requester: PeerId,
    registry: &mut ConnectionRegistry<S>,
) {
    let mut tokens = raw_line.split_whitespace();
    let Some(first) = tokens.next() else {
        return;
    };
    let name = first.to_lowercase();
    let params: Vec<&str> = tokens.collect();

    let Some(descriptor) = table.get(&name) else {
        debug!(command = %name, "Unknown command");
        send_to(registry, CommandError::UnknownCommand.notice(), requester, None);
        return;
    };

    if params.len() < descriptor.min_params || params.len() > descriptor.max_params {
        debug!(command = %name, params = params.len(), "Arity violation");
        send_to(registry, CommandError::ArityError.notice(), requester, None);
        if let Some(help) = descriptor.help {
            send_to(registry, help.usage(), requester, None);
        }
        return;
    }

    match descriptor.action {
        Some(CommandAction::SetName) => set_name(registry, requester, params[0]),
        Some(CommandAction::Help) => show_help(table, registry, requester, params.first().copied()),
        None => send_to(registry, CommandError::NotImplemented.notice(), requester, None),
    }
}

/// `/pseudo`: rename after length and uniqueness checks.
///
/// The length cap keeps the broadcast header within the frame budget, so a
/// renamed peer can always get at least one message byte per chunk through.
fn set_name<S: Link>(registry: &mut ConnectionRegistry<S>, requester: PeerId, name: &str) {
    if name.len() > MAX_NAME_SIZE {
        send_to(
            registry,
            &format!("Impossible de fixer le pseudo à {name} car il est trop long."),
            requester,
            None,
        );
        return;
    }
    if registry.name_in_use(name, requester) {
        send_to(
            registry,
            &format!("Impossible de fixer le pseudo à {name} car il est déjà utilisé."),
            requester,
            None,
        );
        return;
    }
    if let Some(conn) = registry.get_mut(requester) {
        conn.set_name(name);
    }
    let everyone = registry.peer_ids();
    broadcast_to(
        registry,
        &format!("{name} est dans la place !"),
        &everyone,
        None,
    );
}

/// `/help`: list every command, or show one command's usage line.
fn show_help<S: Link>(
    table: &CommandTable,
    registry: &mut ConnectionRegistry<S>,
    requester: PeerId,
    topic: Option<&str>,
) {
    if let Some(topic) = topic {
        let lowered = topic.to_lowercase();
        let name = if lowered.starts_with('/') {
            lowered
        } else {
            format!("/{lowered}")
        };
        match table.get(&name).and_then(|descriptor| descriptor.help) {
            Some(help) => send_to(registry, help.usage(), requester, None),
            None => send_to(
                registry,
                &format!("La commande {name} est inconnue."),
                requester,
                None,
            ),
        }
        return;
    }

    let listing: String = table
        .names_sorted()
        .iter()
        .map(|name| format!("\t{name}\n"))
        .collect();
    send_to(registry, "La liste des commandes disponibles:", requester, None);
    send_to(registry, &listing, requester, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::registry::Connection;

    fn setup(n: usize) -> (CommandTable, ConnectionRegistry<()>, Vec<PeerId>) {
        let table = CommandTable::with_builtins();
        let mut registry = ConnectionRegistry::new(16);
        let ids = (0..n)
            .map(|i| {
                registry
                    .insert(Connection::new(format!("10.0.0.{i}:300{i}"), ()))
                    .unwrap()
            })
            .collect();
        (table, registry, ids)
    }

    fn drain(registry: &mut ConnectionRegistry<()>, id: PeerId) -> Vec<String> {
        let conn = registry.get_mut(id).unwrap();
        let mut lines = Vec::new();
        while let Some(chunk) = conn.next_chunk() {
            lines.push(String::from_utf8(chunk.to_vec()).unwrap());
        }
        lines
    }

    #[test]
    fn test_unknown_command_notices_requester_only() {
        let (table, mut registry, ids) = setup(2);
        dispatch(&table, "/frobnicate", ids[0], &mut registry);

        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["Hmm, cette commande m'est inconnue.\n"]
        );
        assert!(drain(&mut registry, ids[1]).is_empty());
    }

    #[test]
    fn test_command_name_is_case_insensitive() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/PsEuDo Alice", ids[0], &mut registry);
        assert_eq!(registry.get(ids[0]).unwrap().name(), "Alice");
    }

    #[test]
    fn test_arity_violation_skips_handler_and_shows_help() {
        let (table, mut registry, ids) = setup(2);
        dispatch(&table, "/pseudo", ids[0], &mut registry);

        // Main handler never ran: no rename, no broadcast.
        assert_eq!(registry.get(ids[0]).unwrap().name(), "");
        assert!(drain(&mut registry, ids[1]).is_empty());
        assert_eq!(
            drain(&mut registry, ids[0]),
            vec![
                "Erreur: nombre de paramètre invalide\n",
                "Usage: /pseudo mon_pseudo\n"
            ]
        );
    }

    #[test]
    fn test_arity_violation_without_help_handler() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/toto a b c d e f", ids[0], &mut registry);

        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["Erreur: nombre de paramètre invalide\n"]
        );
    }

    #[test]
    fn test_recognized_but_unimplemented() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/toto quelques params", ids[0], &mut registry);

        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["Arrgh! Cette commande n'est pas implémentée.\n"]
        );
    }

    #[test]
    fn test_set_name_broadcasts_to_everyone() {
        let (table, mut registry, ids) = setup(3);
        dispatch(&table, "/pseudo Alice", ids[0], &mut registry);

        assert_eq!(registry.get(ids[0]).unwrap().name(), "Alice");
        for &id in &ids {
            assert_eq!(
                drain(&mut registry, id),
                vec!["Alice est dans la place !\n"],
            );
        }
    }

    #[test]
    fn test_set_name_conflict_leaves_name_unchanged() {
        let (table, mut registry, ids) = setup(2);
        dispatch(&table, "/pseudo Alice", ids[0], &mut registry);
        drain(&mut registry, ids[0]);
        drain(&mut registry, ids[1]);

        dispatch(&table, "/pseudo Alice", ids[1], &mut registry);
        assert_eq!(registry.get(ids[1]).unwrap().name(), "");
        assert_eq!(
            drain(&mut registry, ids[1]),
            vec!["Impossible de fixer le pseudo à Alice car il est déjà utilisé.\n"]
        );
        // No announcement reaches the other peer.
        assert!(drain(&mut registry, ids[0]).is_empty());
    }

    #[test]
    fn test_set_name_rejects_oversized_name() {
        let (table, mut registry, ids) = setup(2);
        for too_long in [MAX_NAME_SIZE + 1, MAX_NAME_SIZE + 2] {
            let name = "n".repeat(too_long);
            dispatch(&table, &format!("/pseudo {name}"), ids[0], &mut registry);

            assert_eq!(registry.get(ids[0]).unwrap().name(), "");
            // The notice itself is split on the wire; rejoin it to check.
            let notice: String = drain(&mut registry, ids[0])
                .concat()
                .split('\n')
                .collect();
            assert!(notice.contains("car il est trop long."));
            // No announcement reaches the other peer.
            assert!(drain(&mut registry, ids[1]).is_empty());
        }
    }

    #[test]
    fn test_set_name_accepts_longest_allowed_name() {
        let (table, mut registry, ids) = setup(1);
        let name = "n".repeat(MAX_NAME_SIZE);
        dispatch(&table, &format!("/pseudo {name}"), ids[0], &mut registry);
        assert_eq!(registry.get(ids[0]).unwrap().name(), name);
    }

    #[test]
    fn test_rename_to_own_name_succeeds() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/pseudo Alice", ids[0], &mut registry);
        dispatch(&table, "/pseudo Alice", ids[0], &mut registry);
        assert_eq!(registry.get(ids[0]).unwrap().name(), "Alice");
    }

    #[test]
    fn test_help_lists_all_commands_sorted() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/help", ids[0], &mut registry);

        let lines = drain(&mut registry, ids[0]);
        assert_eq!(lines[0], "La liste des commandes disponibles:\n");
        assert_eq!(
            &lines[1..],
            &["\t/?\n", "\t/help\n", "\t/pseudo\n", "\t/toto\n"]
        );
    }

    #[test]
    fn test_help_alias() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/?", ids[0], &mut registry);
        let lines = drain(&mut registry, ids[0]);
        assert_eq!(lines[0], "La liste des commandes disponibles:\n");
    }

    #[test]
    fn test_help_with_topic() {
        let (table, mut registry, ids) = setup(1);
        dispatch(&table, "/help pseudo", ids[0], &mut registry);
        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["Usage: /pseudo mon_pseudo\n"]
        );

        dispatch(&table, "/help /pseudo", ids[0], &mut registry);
        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["Usage: /pseudo mon_pseudo\n"]
        );
    }

    #[test]
    fn test_help_with_unknown_or_helpless_topic() {
        let (table, mut registry, ids) = setup(1);

        dispatch(&table, "/help nope", ids[0], &mut registry);
        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["La commande /nope est inconnue.\n"]
        );

        // /toto exists but registers no help handler.
        dispatch(&table, "/help toto", ids[0], &mut registry);
        assert_eq!(
            drain(&mut registry, ids[0]),
            vec!["La commande /toto est inconnue.\n"]
        );
    }
}
