//! # Naming
//!
//! How node names map onto DNS labels and orchestrator hostnames, and how a
//! user's email becomes a namespace slug.

use serde::{Deserialize, Serialize};

use crate::validation::is_rfc1035_label;

/// The DNS zone nodes are published in.
///
/// A node `n` is published as label `n{managed_suffix}` in `zone`. A record is
/// managed only when its label carries the suffix and what precedes it is a
/// valid node name; with an empty suffix every well-formed `A` label is managed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDomain {
    pub zone: String,
    #[serde(default)]
    pub managed_suffix: String,
}

impl NodeDomain {
    pub fn new(zone: impl Into<String>, managed_suffix: impl Into<String>) -> Self {
        Self { zone: zone.into(), managed_suffix: managed_suffix.into() }
    }

    pub fn host_label(&self, node_name: &str) -> String {
        format!("{node_name}{}", self.managed_suffix)
    }

    /// The node name a managed label belongs to, or `None` for unmanaged labels.
    pub fn node_name_for_label<'a>(&self, label: &'a str) -> Option<&'a str> {
        let name = label.strip_suffix(self.managed_suffix.as_str())?;
        is_rfc1035_label(name).then_some(name)
    }

    /// Strips `{managed_suffix}.{zone}`, then `.{zone}`, from an orchestrator hostname.
    pub fn normalize_hostname<'a>(&self, hostname: &'a str) -> &'a str {
        let hostname = hostname.trim_end_matches('.');
        let full = format!("{}.{}", self.managed_suffix, self.zone);
        if let Some(name) = strip_suffix_ignore_case(hostname, &full) {
            return name;
        }
        strip_suffix_ignore_case(hostname, &format!(".{}", self.zone)).unwrap_or(hostname)
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() <= suffix.len() {
        return None;
    }
    let split = s.len() - suffix.len();
    (s.is_char_boundary(split) && s[split..].eq_ignore_ascii_case(suffix)).then(|| &s[..split])
}

/// DNS labels are case-insensitive, so node names are stored folded.
pub fn fold_node_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Emails are compared case-folded everywhere.
pub fn fold_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `A.B.C@x` → `a-b-c-x`.
pub fn namespace_base(email: &str) -> String {
    fold_email(email).replace(['.', '@'], "-")
}

/// The slug candidates tried in order: the base, then `base0`, `base1`, …
pub fn namespace_candidates(email: &str) -> impl Iterator<Item = String> {
    let base = namespace_base(email);
    std::iter::once(base.clone()).chain((0u64..).map(move |n| format!("{base}{n}")))
}
