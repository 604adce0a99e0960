//! Mailing list definitions, posting rules and redistribution.
//!
//! `List` is a plain record. Storage is reached through the
//! [`SubscriberStore`] and [`ListDirectory`] traits, which the persistence
//! layer implements and callers pass in explicitly.

use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryReport, Mailer};
use crate::error::{DatabaseError, ListError};
use crate::message::Message;

/// A mailing list definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    /// Stable key; the list's own address.
    pub id: String,
    /// Redistribution address, used as envelope sender.
    pub address: String,
    pub name: String,
    pub description: String,
    /// Left out of public listings.
    pub hidden: bool,
    /// No unsubscribe instructions in outgoing mail, no self-service
    /// subscription changes.
    pub locked: bool,
    /// Only subscribers may post.
    pub subscribers_only: bool,
    /// Allowed posters. Empty means no whitelist.
    #[serde(default)]
    pub posters: Vec<String>,
    /// Always copied on redistribution (archives).
    #[serde(default)]
    pub bcc: Vec<String>,
}

/// Subscription capabilities supplied by the persistence layer.
///
/// Addresses passed in and returned are normalized.
pub trait SubscriberStore {
    /// Add `address` to the list.
    fn subscribe(&self, list_id: &str, address: &str) -> Result<(), DatabaseError>;

    /// Remove `address` from the list. Returns whether it was subscribed.
    fn unsubscribe(&self, list_id: &str, address: &str) -> Result<bool, DatabaseError>;

    /// All subscribers of the list, in a stable order.
    fn subscribers(&self, list_id: &str) -> Result<Vec<String>, DatabaseError>;

    /// Whether `address` is subscribed to the list.
    fn is_subscribed(&self, list_id: &str, address: &str) -> Result<bool, DatabaseError>;
}

/// List lookup supplied by the persistence layer.
pub trait ListDirectory {
    /// Find a list by id or redistribution address.
    fn lookup_list(&self, address: &str) -> Result<List, ListError>;

    /// Every known list.
    fn all_lists(&self) -> Result<Vec<List>, DatabaseError>;
}

/// How a list hands its copy to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// One transaction per recipient with a VERP envelope sender.
    #[default]
    Verp,
    /// One transaction for all recipients.
    Single,
}

impl List {
    /// Whether `sender` (already normalized) may post to this list.
    ///
    /// Subscribers-only and the poster whitelist are independent checks; both
    /// must pass. A failed subscription lookup denies.
    pub fn can_post(&self, store: &dyn SubscriberStore, sender: &str) -> bool {
        if self.subscribers_only {
            match store.is_subscribed(&self.id, sender) {
                Ok(true) => {}
                Ok(false) | Err(_) => return false,
            }
        }

        if !self.posters.is_empty() {
            return self.posters.iter().any(|poster| poster == sender);
        }

        true
    }

    /// Subscribe `address`.
    pub fn subscribe(&self, store: &dyn SubscriberStore, address: &str) -> Result<(), ListError> {
        if store.is_subscribed(&self.id, address)? {
            return Err(ListError::AlreadySubscribed {
                list: self.id.clone(),
                address: address.to_string(),
            });
        }
        store.subscribe(&self.id, address)?;
        Ok(())
    }

    /// Unsubscribe `address`; nothing changes if it was not subscribed.
    pub fn unsubscribe(&self, store: &dyn SubscriberStore, address: &str) -> Result<(), ListError> {
        if store.unsubscribe(&self.id, address)? {
            Ok(())
        } else {
            Err(ListError::NotSubscribed {
                list: self.id.clone(),
                address: address.to_string(),
            })
        }
    }

    /// Current subscribers.
    pub fn subscribers(&self, store: &dyn SubscriberStore) -> Result<Vec<String>, ListError> {
        Ok(store.subscribers(&self.id)?)
    }

    /// Deliver `message` to every subscriber plus the list's Bcc set, with
    /// the list address as envelope sender.
    ///
    /// A failed subscriber lookup aborts before any delivery.
    pub fn send(
        &self,
        store: &dyn SubscriberStore,
        mailer: &Mailer,
        message: &Message,
        mode: DeliveryMode,
    ) -> Result<DeliveryReport, ListError> {
        let mut recipients = store
            .subscribers(&self.id)
            .map_err(ListError::SubscriberLookup)?;
        recipients.extend(self.bcc.iter().cloned());

        let report = match mode {
            DeliveryMode::Verp => mailer.send_verp(&self.address, &recipients, message),
            DeliveryMode::Single => {
                let result = mailer.send(&self.address, &recipients, message);
                DeliveryReport::single(&self.address, recipients, result)
            }
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::delivery::testing::RecordingTransport;

    /// In-memory subscriber store for a single list.
    #[derive(Default)]
    struct MemoryStore {
        subscribers: RefCell<BTreeSet<String>>,
        broken: bool,
    }

    impl MemoryStore {
        fn with(addresses: &[&str]) -> Self {
            Self {
                subscribers: RefCell::new(addresses.iter().map(|a| a.to_string()).collect()),
                broken: false,
            }
        }

        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }

        fn check(&self) -> Result<(), DatabaseError> {
            if self.broken {
                Err(DatabaseError::Query("disk I/O error".into()))
            } else {
                Ok(())
            }
        }
    }

    impl SubscriberStore for MemoryStore {
        fn subscribe(&self, _list_id: &str, address: &str) -> Result<(), DatabaseError> {
            self.check()?;
            self.subscribers.borrow_mut().insert(address.to_string());
            Ok(())
        }

        fn unsubscribe(&self, _list_id: &str, address: &str) -> Result<bool, DatabaseError> {
            self.check()?;
            Ok(self.subscribers.borrow_mut().remove(address))
        }

        fn subscribers(&self, _list_id: &str) -> Result<Vec<String>, DatabaseError> {
            self.check()?;
            Ok(self.subscribers.borrow().iter().cloned().collect())
        }

        fn is_subscribed(&self, _list_id: &str, address: &str) -> Result<bool, DatabaseError> {
            self.check()?;
            Ok(self.subscribers.borrow().contains(address))
        }
    }

    fn list() -> List {
        List {
            id: "dev@lists.example.com".into(),
            address: "dev@lists.example.com".into(),
            name: "Dev".into(),
            ..List::default()
        }
    }

    // ── can_post ────────────────────────────────────────────────────

    #[test]
    fn open_list_allows_anyone() {
        let store = MemoryStore::default();
        assert!(list().can_post(&store, "stranger@example.com"));
    }

    #[test]
    fn subscribers_only_denies_non_subscriber_regardless_of_posters() {
        let store = MemoryStore::default();
        let list = List {
            subscribers_only: true,
            posters: vec!["a@x.com".into()],
            ..list()
        };
        assert!(!list.can_post(&store, "a@x.com"));
    }

    #[test]
    fn subscribers_only_allows_subscriber() {
        let store = MemoryStore::with(&["a@x.com"]);
        let list = List {
            subscribers_only: true,
            ..list()
        };
        assert!(list.can_post(&store, "a@x.com"));
    }

    #[test]
    fn subscribers_only_denies_on_lookup_failure() {
        let store = MemoryStore::broken();
        let list = List {
            subscribers_only: true,
            ..list()
        };
        assert!(!list.can_post(&store, "a@x.com"));
    }

    #[test]
    fn poster_whitelist_is_exact() {
        let store = MemoryStore::default();
        let list = List {
            posters: vec!["a@x.com".into()],
            ..list()
        };
        assert!(list.can_post(&store, "a@x.com"));
        assert!(!list.can_post(&store, "b@x.com"));
    }

    #[test]
    fn both_restrictions_must_pass() {
        let store = MemoryStore::with(&["a@x.com", "b@x.com"]);
        let list = List {
            subscribers_only: true,
            posters: vec!["a@x.com".into()],
            ..list()
        };
        assert!(list.can_post(&store, "a@x.com"));
        assert!(!list.can_post(&store, "b@x.com"));
    }

    // ── Subscriptions ───────────────────────────────────────────────

    #[test]
    fn subscribe_twice_is_rejected() {
        let store = MemoryStore::default();
        list().subscribe(&store, "a@x.com").unwrap();
        assert!(matches!(
            list().subscribe(&store, "a@x.com"),
            Err(ListError::AlreadySubscribed { .. })
        ));
    }

    #[test]
    fn unsubscribe_unknown_address_is_not_subscribed() {
        let store = MemoryStore::with(&["a@x.com"]);
        let err = list().unsubscribe(&store, "b@x.com").unwrap_err();
        assert!(matches!(err, ListError::NotSubscribed { .. }));
        assert_eq!(list().subscribers(&store).unwrap(), vec!["a@x.com"]);
    }

    #[test]
    fn locked_list_still_has_subscribers() {
        let store = MemoryStore::default();
        let list = List {
            locked: true,
            ..list()
        };
        list.subscribe(&store, "a@x.com").unwrap();
        assert_eq!(list.subscribers(&store).unwrap(), vec!["a@x.com"]);
    }

    // ── send ────────────────────────────────────────────────────────

    #[test]
    fn send_appends_bcc_to_subscribers() {
        let store = MemoryStore::with(&["a@x.com"]);
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::new(transport.clone());
        let list = List {
            bcc: vec!["archive@example.com".into()],
            ..list()
        };

        let report = list
            .send(&store, &mailer, &Message::default(), DeliveryMode::Verp)
            .unwrap();

        assert!(report.is_success());
        let sent = transport.deliveries();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipients, vec!["a@x.com"]);
        assert_eq!(sent[0].envelope_sender, "dev+a=x.com@lists.example.com");
        assert_eq!(sent[1].recipients, vec!["archive@example.com"]);
    }

    #[test]
    fn send_single_mode_uses_one_transaction() {
        let store = MemoryStore::with(&["a@x.com", "b@x.com"]);
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::new(transport.clone());

        let report = list()
            .send(&store, &mailer, &Message::default(), DeliveryMode::Single)
            .unwrap();

        assert!(report.is_success());
        let sent = transport.deliveries();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope_sender, "dev@lists.example.com");
        assert_eq!(sent[0].recipients, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn send_aborts_when_subscriber_lookup_fails() {
        let store = MemoryStore::broken();
        let transport = Arc::new(RecordingTransport::default());
        let mailer = Mailer::new(transport.clone());

        let err = list()
            .send(&store, &mailer, &Message::default(), DeliveryMode::Verp)
            .unwrap_err();

        assert!(matches!(err, ListError::SubscriberLookup(_)));
        assert!(transport.deliveries().is_empty());
    }
}
