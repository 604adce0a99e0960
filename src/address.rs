//! Address normalization — reduce RFC 5322 mailboxes to `local@domain`.
//!
//! Every address is normalized before it is compared or stored. Header
//! syntax (display names, comments, groups) is read by mail-parser; each
//! resulting addr-spec is then checked with lettre.

use lettre::Address as AddrSpec;
use mail_parser::{Addr, Address, MessageParser};

use crate::error::AddressError;

/// Addresses read from an address-list header.
#[derive(Debug, Default)]
pub struct AddressList {
    /// Valid entries, normalized, in header order.
    pub addresses: Vec<String>,
    /// Entries that are not a usable mailbox.
    pub rejected: Vec<AddressError>,
}

/// Normalize a single address field.
///
/// Empty input means "not set" and is returned unchanged. Anything else must
/// hold exactly one mailbox; the display name and comments are dropped.
pub fn normalize(field: &str, value: &str) -> Result<String, AddressError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let mut entries = entries(trimmed).into_iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => entry.map_err(|(_, reason)| invalid(field, value, reason)),
        (None, _) => Err(invalid(field, value, "no mailbox found")),
        (Some(_), Some(_)) => Err(invalid(field, value, "expected a single mailbox")),
    }
}

/// Normalize every element of an address sequence.
///
/// Empty elements stay empty so the result lines up with the input. The
/// first invalid element fails the whole call.
pub fn normalize_all(field: &str, values: &[String]) -> Result<Vec<String>, AddressError> {
    values.iter().map(|v| normalize(field, v)).collect()
}

/// Parse an address-list header (`To`, `Cc`, `Bcc`).
///
/// Group syntax is flattened, so `undisclosed-recipients:;` yields nothing.
/// A malformed entry is reported in [`AddressList::rejected`] without
/// affecting the others.
pub fn parse_address_list(field: &str, value: &str) -> AddressList {
    let mut list = AddressList::default();
    if value.trim().is_empty() {
        return list;
    }
    for entry in entries(value) {
        match entry {
            Ok(address) => list.addresses.push(address),
            Err((text, reason)) => list.rejected.push(invalid(field, &text, reason)),
        }
    }
    list
}

type Entry = Result<String, (String, String)>;

/// Run `value` through mail-parser's address grammar and validate each
/// addr-spec it yields. Failures carry the entry text and a reason.
fn entries(value: &str) -> Vec<Entry> {
    // mail-parser only exposes its address grammar on whole messages.
    let header = format!("To: {}\r\n\r\n", value.replace(['\r', '\n'], " "));
    let Some(parsed) = MessageParser::default().parse(header.as_bytes()) else {
        return vec![Err((value.to_string(), "not an address header".to_string()))];
    };
    let addrs: Vec<&Addr<'_>> = match parsed.to() {
        Some(Address::List(addrs)) => addrs.iter().collect(),
        Some(Address::Group(groups)) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
        None => return vec![Err((value.to_string(), "not an address header".to_string()))],
    };

    addrs
        .into_iter()
        .filter(|a| a.address.is_some() || a.name.is_some())
        .map(|a| match a.address.as_deref() {
            Some(spec) => spec
                .trim()
                .parse::<AddrSpec>()
                .map(|addr| addr.to_string())
                .map_err(|e| (spec.to_string(), e.to_string())),
            None => Err((
                a.name.as_deref().unwrap_or_default().to_string(),
                "no address".to_string(),
            )),
        })
        .collect()
}

fn invalid(field: &str, value: &str, err: impl std::fmt::Display) -> AddressError {
    AddressError::InvalidFormat {
        field: field.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_display_name() {
        assert_eq!(
            normalize("from", "Alice Example <alice@example.com>").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn bare_address_is_unchanged() {
        assert_eq!(
            normalize("from", "alice@example.com").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("from", "\"Bob\" <bob@example.org>").unwrap();
        let twice = normalize("from", &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_passes_through() {
        assert_eq!(normalize("from", "").unwrap(), "");
        assert_eq!(normalize("from", "   ").unwrap(), "");
    }

    #[test]
    fn invalid_address_names_the_field() {
        let err = normalize("poster", "not an address").unwrap_err();
        let AddressError::InvalidFormat { field, value, .. } = err;
        assert_eq!(field, "poster");
        assert_eq!(value, "not an address");
    }

    #[test]
    fn normalize_all_keeps_empty_positions() {
        let values = vec![
            "A <a@x.com>".to_string(),
            String::new(),
            "b@y.com".to_string(),
        ];
        assert_eq!(
            normalize_all("bcc", &values).unwrap(),
            vec!["a@x.com".to_string(), String::new(), "b@y.com".to_string()]
        );
    }

    #[test]
    fn normalize_all_fails_as_a_whole() {
        let values = vec!["a@x.com".to_string(), "nope".to_string()];
        assert!(normalize_all("bcc", &values).is_err());
    }

    #[test]
    fn comment_is_dropped() {
        assert_eq!(
            normalize("from", "alice@example.com (Alice)").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn several_mailboxes_are_not_one_address() {
        assert!(normalize("from", "a@x.com, b@y.com").is_err());
    }

    #[test]
    fn address_list_header() {
        let list = parse_address_list("to", "Alice <alice@example.com>, bob@example.org");
        assert_eq!(
            list.addresses,
            vec!["alice@example.com".to_string(), "bob@example.org".to_string()]
        );
        assert!(list.rejected.is_empty());
        assert!(parse_address_list("to", "").addresses.is_empty());
    }

    #[test]
    fn address_list_with_comments() {
        let list = parse_address_list("cc", "carol@example.com (Carol), Dave <dave@example.com>");
        assert_eq!(
            list.addresses,
            vec!["carol@example.com".to_string(), "dave@example.com".to_string()]
        );
    }

    #[test]
    fn empty_group_yields_no_addresses() {
        let list = parse_address_list("to", "undisclosed-recipients:;");
        assert!(list.addresses.is_empty());
    }

    #[test]
    fn group_members_are_flattened() {
        let list = parse_address_list("to", "team: a@x.com, B <b@y.com>;");
        assert_eq!(
            list.addresses,
            vec!["a@x.com".to_string(), "b@y.com".to_string()]
        );
    }

    #[test]
    fn malformed_entry_does_not_hide_the_others() {
        let list = parse_address_list("to", "dev@lists.example.com, Nobody <nowhere>");
        assert_eq!(list.addresses, vec!["dev@lists.example.com".to_string()]);
        assert_eq!(list.rejected.len(), 1);
    }
}
