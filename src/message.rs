//! Message — one email in transit.
//!
//! Parses inbound RFC 5322 bytes, derives replies and list redistribution
//! copies, and serializes back to wire format. Header values are carried
//! raw: no RFC 2047 or MIME decoding happens here.

use std::fmt;
use std::io::Read;

use mail_parser::{HeaderName, MessageParser};

use crate::address;
use crate::error::ParseError;
use crate::list::List;

/// An email message. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub date: String,
    /// Message-ID header.
    pub id: String,
    pub in_reply_to: String,
    pub content_type: String,
    /// List identity banner, emitted as X-Mailing-List, List-ID and Sender.
    pub x_list: String,
    pub list_unsubscribe: String,
    /// Raw payload after the header block, passed through untouched.
    pub body: Vec<u8>,
}

impl Message {
    /// Parse a message from raw bytes.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }
        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or(ParseError::MissingHeaders)?;
        if parsed.headers().is_empty() {
            return Err(ParseError::MissingHeaders);
        }

        let body_offset = parsed.root_part().offset_body as usize;
        let body = raw.get(body_offset..).map(<[u8]>::to_vec).unwrap_or_default();

        Ok(Self {
            subject: unfold(parsed.header_raw(HeaderName::Subject)),
            from: unfold(parsed.header_raw(HeaderName::From)),
            to: unfold(parsed.header_raw(HeaderName::To)),
            cc: unfold(parsed.header_raw(HeaderName::Cc)),
            bcc: unfold(parsed.header_raw(HeaderName::Bcc)),
            date: unfold(parsed.header_raw(HeaderName::Date)),
            id: unfold(parsed.header_raw(HeaderName::MessageId)),
            in_reply_to: unfold(parsed.header_raw(HeaderName::InReplyTo)),
            body,
            ..Self::default()
        })
    }

    /// Read a whole message from a stream (stdin in practice) and parse it.
    pub fn read_from(mut reader: impl Read) -> Result<Self, ParseError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::parse(&raw)
    }

    /// Build a reply skeleton addressed back to the sender.
    ///
    /// The subject is prefixed with `Re: ` even when it already has one.
    pub fn reply(&self) -> Self {
        Self {
            subject: format!("Re: {}", self.subject),
            to: self.from.clone(),
            in_reply_to: self.id.clone(),
            date: chrono::Local::now().to_rfc2822(),
            ..Self::default()
        }
    }

    /// Prepare the copy of this message that `list` redistributes.
    pub fn resend_as(&self, list: &List, command_address: &str) -> Self {
        let banner = format!("{} <{}>", list.name, list.id);

        let list_unsubscribe = if list.locked {
            String::new()
        } else {
            format!("<mailto:{command_address}?subject=unsubscribe>")
        };

        // Keep the list in Bcc only if the sender put it there. Any other
        // Bcc entry of the incoming message stays hidden.
        let in_bcc = address::parse_address_list("bcc", &self.bcc)
            .addresses
            .iter()
            .any(|a| *a == list.id || *a == list.address);
        let bcc = if in_bcc { banner.clone() } else { String::new() };

        Self {
            subject: self.subject.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            cc: self.cc.clone(),
            bcc,
            date: self.date.clone(),
            id: self.id.clone(),
            in_reply_to: self.in_reply_to.clone(),
            x_list: banner,
            list_unsubscribe,
            body: self.body.clone(),
            ..Self::default()
        }
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Wire format: CRLF header block, then the body bytes as they are.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = HeaderBlock(self).to_string().into_bytes();
        out.extend_from_slice(&self.body);
        out
    }

    /// Describe what would be sent and to whom, without sending.
    pub fn send_debug(&self, envelope_sender: &str, recipients: &[String]) -> String {
        let mut out = format!(
            "{}\nSENDING MESSAGE FROM {envelope_sender} TO:\n",
            "-".repeat(60)
        );
        for recipient in recipients {
            out.push_str(&format!(" - {recipient}\n"));
        }
        out.push_str(&format!("MESSAGE:\n{self}\n"));
        out
    }
}

/// Text rendering; a body that is not UTF-8 is shown lossily. Use
/// [`Message::serialize`] for the wire.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", HeaderBlock(self), String::from_utf8_lossy(&self.body))
    }
}

/// Headers plus the separating blank line. Header order is fixed;
/// downstream filters match on the raw output.
struct HeaderBlock<'a>(&'a Message);

impl fmt::Display for HeaderBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = self.0;
        write!(f, "From: {}\r\n", msg.from)?;
        write!(f, "To: {}\r\n", msg.to)?;
        write!(f, "Cc: {}\r\n", msg.cc)?;
        write!(f, "Bcc: {}\r\n", msg.bcc)?;
        if !msg.date.is_empty() {
            write!(f, "Date: {}\r\n", msg.date)?;
        }
        if !msg.id.is_empty() {
            write!(f, "Message-ID: {}\r\n", msg.id)?;
        }
        write!(f, "In-Reply-To: {}\r\n", msg.in_reply_to)?;
        if !msg.x_list.is_empty() {
            write!(f, "X-Mailing-List: {}\r\n", msg.x_list)?;
            write!(f, "List-ID: {}\r\n", msg.x_list)?;
            write!(f, "Sender: {}\r\n", msg.x_list)?;
        }
        if !msg.list_unsubscribe.is_empty() {
            write!(f, "List-Unsubscribe: {}\r\n", msg.list_unsubscribe)?;
        }
        if !msg.content_type.is_empty() {
            write!(f, "Content-Type: {}\r\n", msg.content_type)?;
        }
        write!(f, "Subject: {}\r\n\r\n", msg.subject)
    }
}

/// Unfold a raw header value into a single trimmed line.
fn unfold(raw: Option<&str>) -> String {
    raw.map(|value| {
        value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    })
    .unwrap_or_default()
}
