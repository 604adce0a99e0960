//! Command line interface: message intake plus list administration.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::address;
use crate::bot::{Bot, Handled};
use crate::config::Config;
use crate::delivery::{Mailer, SmtpRelay};
use crate::error::AddressError;
use crate::list::{List, ListDirectory};
use crate::message::Message;
use crate::store::{Database, ListStore};

#[derive(Parser, Debug)]
#[command(name = "nanolist", version, about = "A small mailing list server")]
pub struct Cli {
    /// Print outgoing mail instead of sending it
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Check the configuration and database
    Check,
    /// Process a message read from stdin
    Message,
    /// Show lists and their subscribers
    List {
        /// Include hidden lists
        #[arg(short, long)]
        all: bool,
    },
    /// Create a list
    Create(ListOptions),
    /// Change an existing list; unspecified fields are kept
    #[command(alias = "update")]
    Modify(ListOptions),
    /// Delete a list and its subscriptions
    Delete {
        list: String,
    },
    /// Subscribe an address to a list
    Subscribe(SubscriptionOptions),
    /// Unsubscribe an address from a list
    Unsubscribe(SubscriptionOptions),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListOptions {
    /// List id, normally the list's address
    pub list: String,
    /// Redistribution address (defaults to the id)
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// May be repeated; `none` clears all flags
    #[arg(short = 'f', long = "flag", value_enum)]
    pub flags: Vec<ListFlag>,
    /// Allowed poster; may be repeated, an empty value clears the whitelist
    #[arg(long = "poster")]
    pub posters: Vec<String>,
    /// Address always copied; may be repeated, an empty value clears it
    #[arg(long)]
    pub bcc: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFlag {
    None,
    Locked,
    Hidden,
    SubscribersOnly,
}

#[derive(Args, Debug, Clone)]
pub struct SubscriptionOptions {
    pub list: String,
    pub address: String,
}

impl ListOptions {
    /// Normalize every address in place.
    pub fn normalize(&mut self) -> Result<(), AddressError> {
        self.list = address::normalize("list", &self.list)?;
        if let Some(addr) = &self.address {
            self.address = Some(address::normalize("address", addr)?);
        }
        self.posters = address::normalize_all("poster", &self.posters)?;
        self.bcc = address::normalize_all("bcc", &self.bcc)?;
        Ok(())
    }

    /// Apply the given options on top of `list`. The id is only set on a
    /// fresh list.
    ///
    /// Flags, posters and bcc replace the current values only when given;
    /// empty entries are dropped.
    pub fn apply(&self, mut list: List) -> List {
        if list.id.is_empty() {
            list.id = self.list.clone();
        }
        if let Some(address) = &self.address {
            list.address = address.clone();
        }
        if let Some(name) = &self.name {
            list.name = name.clone();
        }
        if let Some(description) = &self.description {
            list.description = description.clone();
        }
        if !self.flags.is_empty() {
            list.locked = self.flags.contains(&ListFlag::Locked);
            list.hidden = self.flags.contains(&ListFlag::Hidden);
            list.subscribers_only = self.flags.contains(&ListFlag::SubscribersOnly);
        }
        if !self.posters.is_empty() {
            list.posters = non_empty(&self.posters);
        }
        if !self.bcc.is_empty() {
            list.bcc = non_empty(&self.bcc);
        }
        list
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values.iter().filter(|v| !v.is_empty()).cloned().collect()
}

fn flags_of(list: &List) -> String {
    let mut flags = Vec::new();
    if list.hidden {
        flags.push("hidden");
    }
    if list.locked {
        flags.push("locked");
    }
    if list.subscribers_only {
        flags.push("subscribers-only");
    }
    flags.join(", ")
}

/// Run a parsed command line against `config`.
pub fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let store = ListStore::new(Arc::new(db));
    let mut out = std::io::stdout().lock();

    match cli.command {
        CliCommand::Check => {
            SmtpRelay::new(&config.smtp)?;
            let lists = store.all_lists()?;
            writeln!(out, "Configuration OK")?;
            writeln!(out, "  command address: {}", config.command_address)?;
            writeln!(out, "  database: {}", config.db_path.display())?;
            writeln!(
                out,
                "  smtp: {}:{} ({:?})",
                config.smtp.host, config.smtp.port, config.smtp.security
            )?;
            writeln!(out, "  lists: {}", lists.len())?;
        }
        CliCommand::Message => {
            let relay = SmtpRelay::new(&config.smtp)?;
            let mailer = Mailer::new(Arc::new(relay)).with_debug(cli.debug || config.debug);
            let bot = Bot::new(store, mailer, config.command_address.clone())
                .with_delivery_mode(config.delivery_mode);
            let msg = Message::read_from(std::io::stdin().lock())?;
            match bot.handle_message(&msg)? {
                Handled::Command(command) => info!(command = ?command, "Command handled"),
                Handled::Posted(dispatches) => {
                    info!(lists = dispatches.len(), "Message handled");
                }
            }
        }
        CliCommand::List { all } => {
            for list in store.all_lists()? {
                if list.hidden && !all {
                    continue;
                }
                let flags = flags_of(&list);
                if flags.is_empty() {
                    writeln!(out, "{} <{}>", list.name, list.address)?;
                } else {
                    writeln!(out, "{} <{}> [{flags}]", list.name, list.address)?;
                }
                if !list.description.is_empty() {
                    writeln!(out, "  {}", list.description)?;
                }
                for subscriber in list.subscribers(&store)? {
                    writeln!(out, "  - {subscriber}")?;
                }
            }
        }
        CliCommand::Create(mut options) => {
            options.normalize()?;
            let list = store.create_list(&options.apply(List::default()))?;
            info!(list = %list.id, "List created");
            writeln!(out, "Created {}", list.id)?;
        }
        CliCommand::Modify(mut options) => {
            options.normalize()?;
            let current = store.lookup_list(&options.list)?;
            let list = store.modify_list(&options.apply(current))?;
            info!(list = %list.id, "List modified");
            writeln!(out, "Modified {}", list.id)?;
        }
        CliCommand::Delete { list } => {
            let id = address::normalize("list", &list)?;
            store.delete_list(&id)?;
            info!(list = %id, "List deleted");
            writeln!(out, "Deleted {id}")?;
        }
        CliCommand::Subscribe(options) => {
            let (list, addr) = resolve(&store, &options)?;
            list.subscribe(&store, &addr)?;
            info!(list = %list.id, address = %addr, "Subscribed");
            writeln!(out, "Subscribed {addr} to {}", list.id)?;
        }
        CliCommand::Unsubscribe(options) => {
            let (list, addr) = resolve(&store, &options)?;
            list.unsubscribe(&store, &addr)?;
            info!(list = %list.id, address = %addr, "Unsubscribed");
            writeln!(out, "Unsubscribed {addr} from {}", list.id)?;
        }
    }
    Ok(())
}

fn resolve(store: &ListStore, options: &SubscriptionOptions) -> anyhow::Result<(List, String)> {
    let id = address::normalize("list", &options.list)?;
    let addr = address::normalize("address", &options.address)?;
    anyhow::ensure!(!addr.is_empty(), "no address given");
    let list = store.lookup_list(&id)?;
    Ok((list, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nanolist").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_create_with_repeated_options() {
        let cli = parse(&[
            "create",
            "dev@lists.example.com",
            "--name",
            "Dev",
            "-f",
            "locked",
            "--flag",
            "subscribers-only",
            "--poster",
            "a@example.com",
            "--poster",
            "b@example.com",
        ]);
        let CliCommand::Create(options) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(options.list, "dev@lists.example.com");
        assert_eq!(options.flags, vec![ListFlag::Locked, ListFlag::SubscribersOnly]);
        assert_eq!(options.posters.len(), 2);
    }

    #[test]
    fn update_is_an_alias_for_modify() {
        let cli = parse(&["--debug", "update", "dev@lists.example.com"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, CliCommand::Modify(_)));
    }

    #[test]
    fn debug_flag_is_global() {
        let cli = parse(&["message", "--debug"]);
        assert!(cli.debug);
    }

    #[test]
    fn normalize_writes_back_addresses() {
        let mut options = ListOptions {
            list: "Dev <dev@lists.example.com>".into(),
            address: Some(" Dev <dev@lists.example.com> ".into()),
            posters: vec!["Boss <boss@example.com>".into(), String::new()],
            ..ListOptions::default()
        };
        options.normalize().unwrap();
        assert_eq!(options.list, "dev@lists.example.com");
        assert_eq!(options.address.as_deref(), Some("dev@lists.example.com"));
        assert_eq!(options.posters, vec!["boss@example.com".to_string(), String::new()]);
    }

    #[test]
    fn normalize_rejects_bad_poster() {
        let mut options = ListOptions {
            list: "dev@lists.example.com".into(),
            posters: vec!["nope".into()],
            ..ListOptions::default()
        };
        assert!(options.normalize().is_err());
    }

    #[test]
    fn apply_keeps_unspecified_fields() {
        let current = List {
            id: "dev@lists.example.com".into(),
            address: "dev@lists.example.com".into(),
            name: "Dev".into(),
            description: "Development".into(),
            locked: true,
            posters: vec!["boss@example.com".into()],
            ..List::default()
        };
        let options = ListOptions {
            list: "dev@lists.example.com".into(),
            description: Some("Dev talk".into()),
            ..ListOptions::default()
        };
        let updated = options.apply(current.clone());
        assert_eq!(updated.description, "Dev talk");
        assert_eq!(updated.name, "Dev");
        assert!(updated.locked);
        assert_eq!(updated.posters, current.posters);
    }

    #[test]
    fn apply_replaces_flags_and_clears_lists() {
        let current = List {
            id: "dev@lists.example.com".into(),
            locked: true,
            hidden: true,
            posters: vec!["boss@example.com".into()],
            ..List::default()
        };
        let options = ListOptions {
            list: "dev@lists.example.com".into(),
            flags: vec![ListFlag::None],
            posters: vec![String::new()],
            ..ListOptions::default()
        };
        let updated = options.apply(current);
        assert!(!updated.locked);
        assert!(!updated.hidden);
        assert!(!updated.subscribers_only);
        assert!(updated.posters.is_empty());
    }

    #[test]
    fn flags_are_listed() {
        let list = List {
            hidden: true,
            subscribers_only: true,
            ..List::default()
        };
        assert_eq!(flags_of(&list), "hidden, subscribers-only");
        assert_eq!(flags_of(&List::default()), "");
    }
}
