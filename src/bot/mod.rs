//! The list bot — routes one incoming message.
//!
//! A message addressed to the command address is a command and gets a reply.
//! Anything else is posted to every known list among its recipients.

pub mod commands;

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::address;
use crate::delivery::{DeliveryReport, Mailer};
use crate::error::{Error, ListError, ParseError};
use crate::list::{DeliveryMode, List, ListDirectory};
use crate::message::Message;
use crate::store::ListStore;

pub use commands::Command;

const NOT_APPROVED: &str = "You are not an approved poster on this mailing list.\r\n";

/// What happened to one list a message was posted to.
#[derive(Debug)]
pub struct ListDispatch {
    pub list_id: String,
    pub result: Result<DeliveryReport, ListError>,
}

/// Outcome of [`Bot::handle_message`].
#[derive(Debug)]
pub enum Handled {
    /// A command was answered.
    Command(Command),
    /// The message was posted; one entry per addressed list.
    Posted(Vec<ListDispatch>),
}

pub struct Bot {
    store: ListStore,
    mailer: Mailer,
    command_address: String,
    delivery_mode: DeliveryMode,
}

impl Bot {
    /// `command_address` must already be normalized.
    pub fn new(store: ListStore, mailer: Mailer, command_address: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            command_address: command_address.into(),
            delivery_mode: DeliveryMode::default(),
        }
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    /// Route one incoming message.
    ///
    /// Errors are limited to a missing or malformed sender, a failing list
    /// lookup, and a command reply that could not be sent. Per-list outcomes
    /// are in [`Handled::Posted`].
    pub fn handle_message(&self, msg: &Message) -> Result<Handled, Error> {
        let sender = address::normalize("from", &msg.from)?;
        if sender.is_empty() {
            return Err(ParseError::MissingSender.into());
        }

        let recipients = recipients(msg);
        debug!(sender = %sender, recipients = ?recipients, "Handling message");

        if recipients.contains(&self.command_address) {
            let command = Command::parse(&msg.subject);
            info!(sender = %sender, command = ?command, "Command received");
            let body = self.run_command(&command, &sender);
            self.reply(msg, &sender, body)?;
            return Ok(Handled::Command(command));
        }

        let mut seen = HashSet::new();
        let mut dispatches = Vec::new();
        for recipient in &recipients {
            let list = match self.store.lookup_list(recipient) {
                Ok(list) => list,
                Err(ListError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            if seen.insert(list.id.clone()) {
                dispatches.push(self.post(msg, &sender, list));
            }
        }

        if dispatches.is_empty() {
            warn!(sender = %sender, "Message not addressed to any known list");
        }
        Ok(Handled::Posted(dispatches))
    }

    fn post(&self, msg: &Message, sender: &str, list: List) -> ListDispatch {
        if !list.can_post(&self.store, sender) {
            warn!(list = %list.id, sender = %sender, "Sender not allowed to post");
            if let Err(e) = self.reply(msg, sender, NOT_APPROVED) {
                error!(list = %list.id, sender = %sender, error = %e, "Failed to send rejection");
            }
            return ListDispatch {
                result: Err(ListError::AuthorizationDenied {
                    list: list.id.clone(),
                    sender: sender.to_string(),
                }),
                list_id: list.id,
            };
        }

        let copy = msg.resend_as(&list, &self.command_address);
        let result = list.send(&self.store, &self.mailer, &copy, self.delivery_mode);
        match &result {
            Ok(report) => {
                for e in report.errors() {
                    warn!(list = %list.id, error = %e, "Delivery failed");
                }
                info!(
                    list = %list.id,
                    sender = %sender,
                    delivered = report.delivered().count(),
                    failed = report.errors().len(),
                    "Message posted"
                );
            }
            Err(e) => error!(list = %list.id, error = %e, "Posting failed"),
        }
        ListDispatch {
            list_id: list.id,
            result,
        }
    }

    /// Execute `command` for `sender` and return the reply body.
    fn run_command(&self, command: &Command, sender: &str) -> String {
        let text = match command {
            Command::Help => return commands::help_text(&self.command_address),
            Command::Unknown(subject) => {
                return commands::crlf(&format!(
                    "Unknown command: {subject}\n\n{}",
                    commands::help_text(&self.command_address)
                ));
            }
            Command::Lists => match self.store.all_lists() {
                Ok(lists) => return commands::lists_text(&lists, &self.command_address),
                Err(e) => format!("Could not fetch the mailing lists: {e}"),
            },
            Command::Subscribe(list) => match self.subscribe(sender, list) {
                Ok(list) => format!("You are now subscribed to {}", list.address),
                Err(e) => subscription_failure(&e),
            },
            Command::Unsubscribe(Some(list)) => match self.unsubscribe(sender, list) {
                Ok(list) => format!("You are now unsubscribed from {}", list.address),
                Err(e) => subscription_failure(&e),
            },
            Command::Unsubscribe(None) => match self.unsubscribe_all(sender) {
                Ok(lists) if lists.is_empty() => {
                    "You are not subscribed to any mailing list.".to_string()
                }
                Ok(lists) => {
                    let mut text = String::from("You are now unsubscribed from:\n");
                    for list in lists {
                        text.push_str(&format!("  {}\n", list.address));
                    }
                    text
                }
                Err(e) => subscription_failure(&e),
            },
        };
        commands::crlf(&text)
    }

    /// Self-service subscription; refused for locked lists.
    fn subscribe(&self, sender: &str, list: &str) -> Result<List, ListError> {
        let list = self.unlocked_list(list)?;
        list.subscribe(&self.store, sender)?;
        info!(list = %list.id, address = %sender, "Subscribed by request");
        Ok(list)
    }

    /// Self-service unsubscription; refused for locked lists.
    fn unsubscribe(&self, sender: &str, list: &str) -> Result<List, ListError> {
        let list = self.unlocked_list(list)?;
        list.unsubscribe(&self.store, sender)?;
        info!(list = %list.id, address = %sender, "Unsubscribed by request");
        Ok(list)
    }

    /// Leave every unlocked list `sender` is on.
    fn unsubscribe_all(&self, sender: &str) -> Result<Vec<List>, ListError> {
        let mut left = Vec::new();
        for list in self.store.subscribed_lists(sender)? {
            if list.locked {
                continue;
            }
            list.unsubscribe(&self.store, sender)?;
            info!(list = %list.id, address = %sender, "Unsubscribed by request");
            left.push(list);
        }
        Ok(left)
    }

    fn unlocked_list(&self, requested: &str) -> Result<List, ListError> {
        let not_found = || ListError::NotFound {
            address: requested.to_string(),
        };
        let address = address::normalize("list", requested).map_err(|_| not_found())?;
        let list = self.store.lookup_list(&address)?;
        if list.locked {
            return Err(ListError::Locked { list: list.id });
        }
        Ok(list)
    }

    /// Reply to `sender` from the command address.
    fn reply(&self, msg: &Message, sender: &str, body: impl Into<Vec<u8>>) -> Result<(), Error> {
        let mut reply = msg.reply().with_body(body);
        reply.from = self.command_address.clone();
        self.mailer
            .send(&self.command_address, &[sender.to_string()], &reply)?;
        Ok(())
    }
}

/// To, Cc and Bcc addresses in header order, without duplicates.
/// Malformed entries are logged and skipped.
fn recipients(msg: &Message) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (field, value) in [("to", &msg.to), ("cc", &msg.cc), ("bcc", &msg.bcc)] {
        let list = address::parse_address_list(field, value);
        for e in &list.rejected {
            warn!(error = %e, "Skipping malformed recipient");
        }
        for addr in list.addresses {
            if seen.insert(addr.clone()) {
                out.push(addr);
            }
        }
    }
    out
}

fn subscription_failure(e: &ListError) -> String {
    match e {
        ListError::NotFound { address } => format!("No such mailing list: {address}"),
        ListError::Locked { list } => {
            format!("{list} is locked; ask the list owner to change your subscription.")
        }
        ListError::AlreadySubscribed { list, .. } => {
            format!("You are already subscribed to {list}")
        }
        ListError::NotSubscribed { list, .. } => format!("You are not subscribed to {list}"),
        other => format!("Request failed: {other}"),
    }
}
