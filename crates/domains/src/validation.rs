//! Input checks applied before any registry mutation.

use std::net::Ipv4Addr;

use crate::error::{DomainError, Result};

const MAX_LABEL_LEN: usize = 63;

/// Whether unroutable IPv4 space is accepted for node addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPolicy {
    #[default]
    PublicOnly,
    AnyIpv4,
}

/// RFC1035 label: 1–63 chars, leading letter, no trailing hyphen,
/// letters/digits/hyphens only. FQDNs are not labels.
pub fn is_rfc1035_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    if !bytes[0].is_ascii_alphabetic() || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

pub fn validate_node_name(name: &str) -> Result<()> {
    if is_rfc1035_label(name) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("{name:?} isn't a valid node name")))
    }
}

/// RFC1918, RFC6598 (CGNAT), multicast, and the usual non-routable specials.
pub fn is_public_ipv4(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    let cgnat = a == 100 && (64..128).contains(&b);
    !(addr.is_private()
        || cgnat
        || addr.is_multicast()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast()
        || a == 0
        || a >= 240)
}

pub fn parse_node_address(raw: &str, policy: AddressPolicy) -> Result<Ipv4Addr> {
    let addr: Ipv4Addr = raw
        .trim()
        .parse()
        .map_err(|_| DomainError::Validation(format!("{raw:?} isn't a valid IPv4 address")))?;
    if policy == AddressPolicy::PublicOnly && !is_public_ipv4(addr) {
        return Err(DomainError::Validation(format!(
            "{addr} isn't a publicly routable IPv4 address"
        )));
    }
    Ok(addr)
}
