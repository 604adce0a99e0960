//! SMTP transport via lettre.
//!
//! Messages are sent raw with an explicit envelope so the envelope sender
//! (VERP address) is independent of the From header.

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::MailTransport;
use crate::config::{SmtpConfig, SmtpSecurity};
use crate::error::{ConfigError, DeliveryError};

/// Outbound SMTP relay.
pub struct SmtpRelay {
    transport: SmtpTransport,
}

impl SmtpRelay {
    /// Build the relay. No connection is made until the first delivery.
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigError> {
        let builder = match config.security {
            SmtpSecurity::None => SmtpTransport::builder_dangerous(&config.host),
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| relay_error(&config.host, e))?,
            SmtpSecurity::Tls => {
                SmtpTransport::relay(&config.host).map_err(|e| relay_error(&config.host, e))?
            }
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if let Some(username) = &config.username {
            let password = config
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        tracing::debug!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP relay configured"
        );
        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl MailTransport for SmtpRelay {
    fn deliver(
        &self,
        envelope_sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<(), DeliveryError> {
        let from = parse_address(envelope_sender)?;
        let to = recipients
            .iter()
            .map(|r| parse_address(r))
            .collect::<Result<Vec<_>, _>>()?;

        let envelope = Envelope::new(Some(from), to).map_err(|e| DeliveryError::InvalidAddress {
            address: recipients.join(", "),
            reason: e.to_string(),
        })?;

        self.transport
            .send_raw(&envelope, message)
            .map_err(|e| DeliveryError::Transport {
                recipients: recipients.join(", "),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn relay_error(host: &str, e: lettre::transport::smtp::Error) -> ConfigError {
    ConfigError::InvalidValue {
        key: "NANOLIST_SMTP_HOST".into(),
        message: format!("cannot relay through {host}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_for_every_security_mode() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        for security in [SmtpSecurity::None, SmtpSecurity::StartTls, SmtpSecurity::Tls] {
            let config = SmtpConfig {
                host: "smtp.example.com".into(),
                security,
                ..SmtpConfig::default()
            };
            assert!(SmtpRelay::new(&config).is_ok());
        }
    }

    #[test]
    fn invalid_recipient_is_reported_before_connecting() {
        let relay = SmtpRelay::new(&SmtpConfig::default()).unwrap();
        let err = relay
            .deliver("dev@lists.example.com", &["not an address".to_string()], b"")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }

    #[test]
    fn invalid_envelope_sender_is_reported() {
        let relay = SmtpRelay::new(&SmtpConfig::default()).unwrap();
        let err = relay
            .deliver("nobody", &["x@foo.com".to_string()], b"")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }
}
