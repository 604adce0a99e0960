//! Commands sent by mail to the command address, one per subject line.

use crate::list::List;

/// A command parsed from a subject line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Lists,
    Subscribe(String),
    /// `None` means every list the sender is on.
    Unsubscribe(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse a subject line. Reply prefixes (`Re:`, `Fwd:`) are ignored and
    /// the verb is case-insensitive.
    pub fn parse(subject: &str) -> Self {
        let subject = normalize_subject(subject);
        let mut words = subject.split_whitespace();
        let Some(verb) = words.next() else {
            return Command::Help;
        };
        let arg = words.next().map(str::to_string);
        let extra = words.next().is_some();

        match (verb.to_ascii_lowercase().as_str(), arg, extra) {
            ("help", None, false) => Command::Help,
            ("lists" | "list", None, false) => Command::Lists,
            ("subscribe", Some(list), false) => Command::Subscribe(list),
            ("unsubscribe", list, false) => Command::Unsubscribe(list),
            _ => Command::Unknown(subject),
        }
    }
}

/// Strip `Re:`/`Fwd:`/`Fw:` prefixes, repeatedly.
pub fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_ascii_lowercase();
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|prefix| lower.starts_with(*prefix))
            .map(|prefix| s[prefix.len()..].trim_start());
        match stripped {
            Some(rest) => s = rest,
            None => return s.trim_end().to_string(),
        }
    }
}

/// Usage text mailed back for `help` and unknown commands.
pub fn help_text(command_address: &str) -> String {
    crlf(&format!(
        "Send one of the following commands as the subject of a message to {command_address}:\n\
         \n\
         \x20 help                  show this message\n\
         \x20 lists                 show the available mailing lists\n\
         \x20 subscribe <list>      subscribe to a mailing list\n\
         \x20 unsubscribe <list>    unsubscribe from a mailing list\n\
         \x20 unsubscribe           unsubscribe from every mailing list\n"
    ))
}

/// Public listing of `lists`; hidden lists are skipped.
pub fn lists_text(lists: &[List], command_address: &str) -> String {
    let mut out = String::from("Available mailing lists:\n\n");
    for list in lists.iter().filter(|l| !l.hidden) {
        out.push_str(&format!(
            "{} <{}>: {}\n",
            list.name, list.address, list.description
        ));
    }
    out.push_str(&format!(
        "\nTo subscribe to a mailing list, email {command_address} with 'subscribe <list-address>' as the subject.\n"
    ));
    crlf(&out)
}

/// Rewrite line endings to CRLF.
pub fn crlf(text: &str) -> String {
    text.lines().map(|line| format!("{line}\r\n")).collect()
}
