//! Identifier normalization (`PREFIX:LOCAL` ↔ full URI).
//!
//! Ingestion turns `PATO:0000014` into `http://purl.obolibrary.org/obo/PATO_0000014`;
//! downstream consumers turn URIs back into the short display form. Both
//! directions share one [`PrefixMap`], so a legacy prefix that is rewritten on
//! the way in is restored on the way out.

use std::fmt;

use thiserror::Error;

/// Base namespace for OBO PURLs.
pub const OBO_PURL_BASE: &str = "http://purl.obolibrary.org/obo/";

/// Characters that may not appear in a URI path segment.
pub const ILLEGAL_URI_CHARS: &[char] = &[' ', '<', '>', '"', '{', '}', '|', '\\', '^', '`'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("empty identifier")]
    Empty,
    #[error("identifier `{0}` has no prefix separator")]
    MissingColon(String),
    #[error("identifier `{raw}` contains illegal URI character {ch:?}")]
    IllegalCharacter { raw: String, ch: char },
}

/// A `PREFIX:LOCAL` pair, split at the first colon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    prefix: String,
    local: String,
}

impl Identifier {
    /// Split `raw` at its first colon after validating it.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = truncate_qualifier(raw);
        validate(raw)?;
        let (prefix, local) = raw
            .split_once(':')
            .ok_or_else(|| IdentifierError::MissingColon(raw.to_string()))?;
        Ok(Self {
            prefix: prefix.to_string(),
            local: local.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

/// A validated identifier in its full-URI form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedId {
    uri: String,
    fragment: String,
    prefix: String,
}

impl NormalizedId {
    /// Full URI, e.g. `http://purl.obolibrary.org/obo/PATO_0000014`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// URI-safe fragment, e.g. `PATO_0000014`.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Canonical (post-remap) prefix, e.g. `PATO` or `NCBITaxon`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn from_uri(uri: &str) -> Self {
        let fragment = uri.rsplit(['/', '#']).next().unwrap_or(uri).to_string();
        let prefix = fragment
            .split_once('_')
            .map(|(p, _)| p.to_string())
            .unwrap_or_else(|| fragment.clone());
        Self {
            uri: uri.to_string(),
            fragment,
            prefix,
        }
    }
}

/// Bidirectional table between display prefixes and canonical URI prefixes.
///
/// `ncbi` ↔ `NCBITaxon`: registered data writes `ncbi:9606`, while the
/// NCBITaxon ontology graph uses `.../obo/NCBITaxon_9606`.
///
/// The table also lists prefixes that contain `_` themselves (`my_pref`).
/// A URI fragment is split after the longest registered prefix it starts
/// with, and only falls back to its first `_` when none matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMap {
    entries: Vec<(String, String)>,
    known: Vec<String>,
}

impl Default for PrefixMap {
    fn default() -> Self {
        Self::empty().with_alias("ncbi", "NCBITaxon")
    }
}

impl PrefixMap {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            known: Vec::new(),
        }
    }

    /// Register `display` as the short-form alias of `canonical`.
    pub fn with_alias(mut self, display: &str, canonical: &str) -> Self {
        self.entries.retain(|(d, c)| d != display && c != canonical);
        self.entries
            .push((display.to_string(), canonical.to_string()));
        self
    }

    /// Register a prefix that must survive shortening intact.
    pub fn with_known_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() && !self.known.iter().any(|k| k == prefix) {
            self.known.push(prefix.to_string());
        }
        self
    }

    pub fn to_canonical<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(display, _)| display == prefix)
            .map(|(_, canonical)| canonical.as_str())
            .unwrap_or(prefix)
    }

    pub fn to_display<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(_, canonical)| canonical == prefix)
            .map(|(display, _)| display.as_str())
            .unwrap_or(prefix)
    }

    /// Split a URI fragment into `(prefix, local)`.
    pub fn split_fragment<'f>(&self, fragment: &'f str) -> Option<(&'f str, &'f str)> {
        let registered = self
            .entries
            .iter()
            .flat_map(|(d, c)| [d.as_str(), c.as_str()])
            .chain(self.known.iter().map(String::as_str));

        let longest = registered
            .filter(|prefix| {
                fragment.len() > prefix.len()
                    && fragment.starts_with(prefix)
                    && fragment.as_bytes()[prefix.len()] == b'_'
            })
            .map(str::len)
            .max();

        match longest {
            Some(len) => Some((&fragment[..len], &fragment[len + 1..])),
            None => fragment.split_once('_'),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.known.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, c)| (d.as_str(), c.as_str()))
    }

    pub fn known(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

/// Converts identifiers to URIs and back. Immutable once built; share it by
/// reference across a run.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    base: String,
    prefixes: PrefixMap,
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(OBO_PURL_BASE, PrefixMap::default())
    }
}

impl IdentifierNormalizer {
    pub fn new(base: &str, prefixes: PrefixMap) -> Self {
        Self {
            base: base.to_string(),
            prefixes,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    /// Validate `raw` and rewrite it into a full URI.
    ///
    /// Trailing qualifiers (`EXACT []`, `{...}`) are cut at the first space or
    /// `[`. Values that already start with `http` are taken to be URIs and are
    /// passed through unchanged.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedId, IdentifierError> {
        let raw = truncate_qualifier(raw);
        validate(raw)?;

        if is_absolute_uri(raw) {
            return Ok(NormalizedId::from_uri(raw));
        }

        let id = Identifier::parse(raw)?;
        let prefix = self.prefixes.to_canonical(id.prefix()).to_string();
        let fragment = format!("{prefix}_{}", id.local());
        Ok(NormalizedId {
            uri: format!("{}{fragment}", self.base),
            fragment,
            prefix,
        })
    }

    /// Turn a URI under the base namespace back into `prefix:local`.
    ///
    /// URIs outside the base namespace are returned unchanged, as are
    /// fragments without a `_` separator.
    pub fn shorten(&self, uri: &str) -> String {
        let Some(fragment) = uri.strip_prefix(self.base.as_str()) else {
            return uri.to_string();
        };
        match self.prefixes.split_fragment(fragment) {
            Some((prefix, local)) => format!("{}:{local}", self.prefixes.to_display(prefix)),
            None => fragment.to_string(),
        }
    }
}

fn truncate_qualifier(raw: &str) -> &str {
    let raw = raw.trim();
    let end = raw.find([' ', '\t', '[']).unwrap_or(raw.len());
    raw[..end].trim_end()
}

fn validate(raw: &str) -> Result<(), IdentifierError> {
    if raw.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if let Some(ch) = raw.chars().find(|c| ILLEGAL_URI_CHARS.contains(c)) {
        return Err(IdentifierError::IllegalCharacter {
            raw: raw.to_string(),
            ch,
        });
    }
    if !raw.contains(':') {
        return Err(IdentifierError::MissingColon(raw.to_string()));
    }
    Ok(())
}

fn is_absolute_uri(raw: &str) -> bool {
    raw.starts_with("http")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_identifier() {
        let n = IdentifierNormalizer::default();
        let id = n.normalize("PATO:0000014").expect("valid");
        assert_eq!(id.uri(), "http://purl.obolibrary.org/obo/PATO_0000014");
        assert_eq!(id.fragment(), "PATO_0000014");
        assert_eq!(id.prefix(), "PATO");
    }

    #[test]
    fn truncates_trailing_qualifiers() {
        let n = IdentifierNormalizer::default();
        assert_eq!(
            n.normalize("  RO:0002470 {source=\"x\"}").expect("valid").fragment(),
            "RO_0002470"
        );
        assert_eq!(n.normalize("GO:1[abc]").expect("valid").fragment(), "GO_1");
    }

    #[test]
    fn only_first_colon_is_replaced() {
        let n = IdentifierNormalizer::default();
        let id = n.normalize("ENVO:part:7").expect("valid");
        assert_eq!(id.fragment(), "ENVO_part:7");
        assert_eq!(n.shorten(id.uri()), "ENVO:part:7");
    }

    #[test]
    fn rejects_missing_colon_and_illegal_chars() {
        let n = IdentifierNormalizer::default();
        assert!(matches!(n.normalize("nocolon"), Err(IdentifierError::MissingColon(_))));
        assert!(matches!(
            n.normalize("A:b<c"),
            Err(IdentifierError::IllegalCharacter { ch: '<', .. })
        ));
        assert!(matches!(
            n.normalize("A:b|c"),
            Err(IdentifierError::IllegalCharacter { ch: '|', .. })
        ));
        assert_eq!(n.normalize("   "), Err(IdentifierError::Empty));
    }

    #[test]
    fn absolute_uris_pass_through() {
        let n = IdentifierNormalizer::default();
        let id = n
            .normalize("http://example.org/onto#Thing_1")
            .expect("valid");
        assert_eq!(id.uri(), "http://example.org/onto#Thing_1");
        assert_eq!(id.fragment(), "Thing_1");
        assert_eq!(n.shorten(id.uri()), "http://example.org/onto#Thing_1");
    }

    #[test]
    fn legacy_prefix_is_remapped_both_ways() {
        let n = IdentifierNormalizer::default();
        let id = n.normalize("ncbi:9606").expect("valid");
        assert_eq!(id.uri(), "http://purl.obolibrary.org/obo/NCBITaxon_9606");
        assert_eq!(id.prefix(), "NCBITaxon");
        assert_eq!(n.shorten(id.uri()), "ncbi:9606");

        // Canonical spelling in the ontology file lands on the same URI.
        assert_eq!(n.normalize("NCBITaxon:9606").expect("valid"), id);
    }

    #[test]
    fn shorten_accepts_legacy_uri_form() {
        let n = IdentifierNormalizer::default();
        assert_eq!(
            n.shorten("http://purl.obolibrary.org/obo/ncbi_7742"),
            "ncbi:7742"
        );
    }

    #[test]
    fn shorten_leaves_foreign_uris_alone() {
        let n = IdentifierNormalizer::default();
        assert_eq!(
            n.shorten("http://my-db.org/user_taxon/foo"),
            "http://my-db.org/user_taxon/foo"
        );
    }

    #[test]
    fn empty_prefix_map_is_identity() {
        let n = IdentifierNormalizer::new(OBO_PURL_BASE, PrefixMap::empty());
        let id = n.normalize("ncbi:1").expect("valid");
        assert_eq!(id.fragment(), "ncbi_1");
        assert_eq!(n.shorten(id.uri()), "ncbi:1");
    }

    #[test]
    fn alias_replaces_conflicting_entries() {
        let map = PrefixMap::default().with_alias("taxon", "NCBITaxon");
        assert_eq!(map.to_display("NCBITaxon"), "taxon");
        assert_eq!(map.to_canonical("ncbi"), "ncbi");
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn underscore_prefix_round_trips_once_registered() {
        let plain = IdentifierNormalizer::default();
        let uri = plain.normalize("my_pref:0001").expect("valid");
        assert_eq!(uri.fragment(), "my_pref_0001");
        assert_eq!(plain.shorten(uri.uri()), "my:pref_0001");

        let n = IdentifierNormalizer::new(
            OBO_PURL_BASE,
            PrefixMap::default().with_known_prefix("my").with_known_prefix("my_pref"),
        );
        assert_eq!(n.shorten(uri.uri()), "my_pref:0001");
        assert_eq!(n.shorten("http://purl.obolibrary.org/obo/my_other_1"), "my:other_1");
        assert_eq!(n.shorten("http://purl.obolibrary.org/obo/NCBITaxon_9606"), "ncbi:9606");
    }

    #[test]
    fn anything_starting_with_http_passes_through() {
        let n = IdentifierNormalizer::default();
        let id = n.normalize("http:foo").expect("valid");
        assert_eq!(id.uri(), "http:foo");
        assert_eq!(n.normalize("https://x.org/A_1").expect("valid").uri(), "https://x.org/A_1");
    }
}
