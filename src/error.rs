//! Error types for nanolist.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Message error: {0}")]
    Parse(#[from] ParseError),

    #[error("List error: {0}")]
    List(#[from] ListError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Query(e.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        DatabaseError::Serialization(e.to_string())
    }
}

/// An address field failed RFC 5322 mailbox parsing.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid address in {field}: {value:?} ({reason})")]
    InvalidFormat {
        field: String,
        value: String,
        reason: String,
    },
}

/// Inbound message is not well-formed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message is empty")]
    Empty,

    #[error("Message has no header block")]
    MissingHeaders,

    #[error("Message has no sender")]
    MissingSender,

    #[error("Failed to read message: {0}")]
    Io(#[from] std::io::Error),
}

/// List lookup, authorization and subscription errors.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("Unknown list: {address}")]
    NotFound { address: String },

    #[error("List {id} already exists")]
    AlreadyExists { id: String },

    #[error("{sender} is not allowed to post to {list}")]
    AuthorizationDenied { list: String, sender: String },

    #[error("{address} is not subscribed to {list}")]
    NotSubscribed { list: String, address: String },

    #[error("{address} is already subscribed to {list}")]
    AlreadySubscribed { list: String, address: String },

    #[error("List {list} is locked")]
    Locked { list: String },

    #[error("Subscriber lookup failed: {0}")]
    SubscriberLookup(#[source] DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Delivery errors, reported per attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid envelope sender {sender}")]
    InvalidEnvelope { sender: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Delivery to {recipients} failed: {reason}")]
    Transport { recipients: String, reason: String },
}
