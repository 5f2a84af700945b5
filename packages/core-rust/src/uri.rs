//! URI and CURIE syntax helpers.
//!
//! WAMP v1 lets peers abbreviate URIs as `prefix:reference` once they have
//! announced the prefix. These helpers only classify and split strings; the
//! per-connection prefix tables live in the server crate.

use std::sync::OnceLock;

use regex::Regex;

/// Matches `scheme://rest` where `scheme` follows RFC 3986 and nothing
/// contains whitespace. `kv:item` is not absolute under this rule.
fn absolute_uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").expect("absolute URI pattern is valid")
    })
}

/// Returns `true` if `candidate` is an absolute URI rather than a CURIE.
#[must_use]
pub fn is_absolute_uri(candidate: &str) -> bool {
    absolute_uri_pattern().is_match(candidate)
}

/// A compact URI split into its prefix token and reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Curie<'a> {
    /// Token announced earlier through a `Prefix` message.
    pub prefix: &'a str,
    /// Remainder appended to the expanded prefix URI.
    pub reference: &'a str,
}

/// Splits `candidate` into a [`Curie`].
///
/// Returns `None` unless the string contains exactly one colon. Absolute
/// URIs are not filtered here; call [`is_absolute_uri`] first.
#[must_use]
pub fn split_curie(candidate: &str) -> Option<Curie<'_>> {
    let mut parts = candidate.split(':');
    let prefix = parts.next()?;
    let reference = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Curie { prefix, reference })
}
