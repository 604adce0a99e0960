//! nanolist — a small mailing list relay.
//!
//! Incoming mail is parsed into a [`message::Message`], routed by the
//! [`bot::Bot`] and redistributed by each addressed [`list::List`] through
//! the [`delivery::Mailer`], one VERP transaction per subscriber.

pub mod address;
pub mod bot;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod list;
pub mod message;
pub mod store;
