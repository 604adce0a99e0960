//! Delivery engine — hands serialized messages to a [`MailTransport`].
//!
//! `Mailer::send` is one transaction; `Mailer::send_verp` is one transaction
//! per recipient with the recipient encoded in the envelope sender, so a
//! bounce can be traced back to the address that failed. Failures are
//! collected, never retried.

pub mod smtp;

use std::sync::Arc;

use crate::error::DeliveryError;
use crate::message::Message;

pub use smtp::SmtpRelay;

/// Transport capability: deliver raw bytes to `recipients` with the given
/// envelope sender.
pub trait MailTransport {
    fn deliver(
        &self,
        envelope_sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<(), DeliveryError>;
}

/// One transaction handed to the transport.
#[derive(Debug)]
pub struct DeliveryAttempt {
    pub envelope_sender: String,
    pub recipients: Vec<String>,
    pub result: Result<(), DeliveryError>,
}

/// Outcome of a delivery run, in recipient order.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Set when the run was refused before any attempt.
    rejected: Option<DeliveryError>,
    attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    /// A run refused up front; no attempt was made.
    pub fn rejected(error: DeliveryError) -> Self {
        Self {
            rejected: Some(error),
            attempts: Vec::new(),
        }
    }

    /// A run made of one transaction.
    pub fn single(
        envelope_sender: &str,
        recipients: Vec<String>,
        result: Result<(), DeliveryError>,
    ) -> Self {
        Self {
            rejected: None,
            attempts: vec![DeliveryAttempt {
                envelope_sender: envelope_sender.to_string(),
                recipients,
                result,
            }],
        }
    }

    pub fn attempts(&self) -> &[DeliveryAttempt] {
        &self.attempts
    }

    /// Every error, in recipient order. Empty means full success.
    pub fn errors(&self) -> Vec<&DeliveryError> {
        self.rejected
            .iter()
            .chain(self.attempts.iter().filter_map(|a| a.result.as_ref().err()))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.rejected.is_none() && self.attempts.iter().all(|a| a.result.is_ok())
    }

    /// Recipients whose transaction succeeded.
    pub fn delivered(&self) -> impl Iterator<Item = &str> {
        self.attempts
            .iter()
            .filter(|a| a.result.is_ok())
            .flat_map(|a| a.recipients.iter().map(String::as_str))
    }
}

/// Build the VERP envelope sender for `recipient`:
/// `local@domain` becomes `local+user=host@domain` for `user@host`.
pub fn verp_envelope(envelope_sender: &str, recipient: &str) -> Result<String, DeliveryError> {
    let (local, domain) = split_envelope(envelope_sender)?;
    Ok(verp_address(local, domain, recipient))
}

fn verp_address(local: &str, domain: &str, recipient: &str) -> String {
    format!("{local}+{}@{domain}", recipient.replacen('@', "=", 1))
}

fn split_envelope(envelope_sender: &str) -> Result<(&str, &str), DeliveryError> {
    match envelope_sender.split_once('@') {
        Some((local, domain)) if !domain.contains('@') => Ok((local, domain)),
        _ => Err(DeliveryError::InvalidEnvelope {
            sender: envelope_sender.to_string(),
        }),
    }
}

/// Sends messages through a transport, or only previews them in debug mode.
#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    debug: bool,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            debug: false,
        }
    }

    /// In debug mode nothing reaches the transport; the preview is logged.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Deliver `message` to all `recipients` in one transaction.
    pub fn send(
        &self,
        envelope_sender: &str,
        recipients: &[String],
        message: &Message,
    ) -> Result<(), DeliveryError> {
        if self.debug {
            tracing::info!("{}", message.send_debug(envelope_sender, recipients));
            return Ok(());
        }
        self.transport
            .deliver(envelope_sender, recipients, &message.serialize())
    }

    /// Deliver `message` to each recipient separately with a VERP envelope.
    ///
    /// A malformed envelope sender refuses the whole run. Otherwise every
    /// recipient gets exactly one attempt, whatever happened to the others.
    pub fn send_verp(
        &self,
        envelope_sender: &str,
        recipients: &[String],
        message: &Message,
    ) -> DeliveryReport {
        let (local, domain) = match split_envelope(envelope_sender) {
            Ok(parts) => parts,
            Err(e) => return DeliveryReport::rejected(e),
        };

        let mut report = DeliveryReport::default();
        for recipient in recipients {
            let envelope = verp_address(local, domain, recipient);
            let result = self.send(&envelope, std::slice::from_ref(recipient), message);
            report.attempts.push(DeliveryAttempt {
                envelope_sender: envelope,
                recipients: vec![recipient.clone()],
                result,
            });
        }
        report
    }
}
