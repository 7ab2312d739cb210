//! Term-block records and the field grammar that fills them.

use regex::Regex;

use crate::identifier::{IdentifierError, IdentifierNormalizer, NormalizedId};

/// Kind of a bracketed block header (`[Term]`, `[Typedef]`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Term,
    Typedef,
    Instance,
    Other(String),
}

impl BlockKind {
    /// Recognize a block-start line. Returns `None` for field lines.
    pub fn from_header(line: &str) -> Option<Self> {
        let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
        Some(match inner {
            "Term" => Self::Term,
            "Typedef" => Self::Typedef,
            "Instance" => Self::Instance,
            other => Self::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Term => "Term",
            Self::Typedef => "Typedef",
            Self::Instance => "Instance",
            Self::Other(name) => name,
        }
    }
}

/// A finalized ontology entity with a valid id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: BlockKind,
    /// Line number of the block header.
    pub line_no: usize,
    pub id: NormalizedId,
    pub label: Option<String>,
    pub synonyms: Vec<String>,
    pub parents: Vec<NormalizedId>,
}

/// Why a block produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discarded {
    MissingId { kind: BlockKind, line_no: usize },
    InvalidId { kind: BlockKind, line_no: usize, error: IdentifierError },
}

/// Compiled matchers for field values. Built once per run.
#[derive(Debug, Clone)]
pub struct FieldGrammar {
    parent_token: Regex,
    any_token: Regex,
    parent_fields: Vec<String>,
}

impl Default for FieldGrammar {
    fn default() -> Self {
        Self::new(&["is_a:"])
    }
}

impl FieldGrammar {
    /// `parent_fields` are the field prefixes (with colon) whose value names a
    /// parent class, e.g. `is_a:` or `relationship:`.
    pub fn new(parent_fields: &[&str]) -> Self {
        Self {
            parent_token: Regex::new(r"^([A-Za-z0-9_.-]+:[A-Za-z0-9_.-]+)").unwrap(),
            any_token: Regex::new(r"[A-Za-z0-9_.-]+:[A-Za-z0-9_.-]+").unwrap(),
            parent_fields: parent_fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// First well-formed `PREFIX:LOCAL` token at the start of `value`.
    pub fn parent_token<'a>(&self, value: &'a str) -> Option<&'a str> {
        self.parent_token
            .captures(value.trim_start())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Last well-formed token before any `{...}` qualifier. Used for fields
    /// that lead with a relation name, as in `relationship: part_of GO:1`.
    pub fn related_token<'a>(&self, value: &'a str) -> Option<&'a str> {
        let head = value.split('{').next().unwrap_or(value);
        self.any_token.find_iter(head).last().map(|m| m.as_str())
    }

    /// `Some(token)` when `line` is a parent field; the token is `None` when
    /// the value holds no usable identifier.
    fn parent_of<'a>(&self, line: &'a str) -> Option<Option<&'a str>> {
        self.parent_fields.iter().find_map(|field| {
            let value = line.strip_prefix(field.as_str())?;
            Some(if field == "is_a:" {
                self.parent_token(value)
            } else {
                self.related_token(value)
            })
        })
    }
}

enum IdState {
    Unset,
    Valid(NormalizedId),
    Invalid(IdentifierError),
}

/// Accumulates the fields of one open block.
pub struct RecordBuilder {
    kind: BlockKind,
    line_no: usize,
    id: IdState,
    label: Option<String>,
    synonyms: Vec<String>,
    parents: Vec<NormalizedId>,
}

impl RecordBuilder {
    pub fn new(kind: BlockKind, line_no: usize) -> Self {
        Self {
            kind,
            line_no,
            id: IdState::Unset,
            label: None,
            synonyms: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// True once an invalid `id:` has been seen; later fields are ignored.
    pub fn is_inert(&self) -> bool {
        matches!(self.id, IdState::Invalid(_))
    }

    /// Apply one field line. Unknown fields and field parse misses are ignored.
    pub fn apply(&mut self, line: &str, normalizer: &IdentifierNormalizer, grammar: &FieldGrammar) {
        if self.is_inert() {
            return;
        }

        if let Some(value) = line.strip_prefix("id:") {
            // A block has one id; repeated id lines do not rename it.
            if matches!(self.id, IdState::Unset) {
                self.id = match normalizer.normalize(unquote(value)) {
                    Ok(id) => IdState::Valid(id),
                    Err(error) => {
                        tracing::debug!(line = self.line_no, %error, "inert block");
                        IdState::Invalid(error)
                    }
                };
            }
        } else if let Some(value) = line.strip_prefix("name:") {
            let name = unquote(value);
            if !name.is_empty() {
                self.label = Some(unescape(name));
            }
        } else if let Some(token) = grammar.parent_of(line) {
            if let Some(parent) = token.and_then(|token| normalizer.normalize(token).ok()) {
                self.parents.push(parent);
            }
        } else if let Some(value) = line.strip_prefix("synonym:") {
            if let Some(synonym) = first_quoted(value) {
                let synonym = synonym.trim();
                if !synonym.is_empty() {
                    self.synonyms.push(unescape(synonym));
                }
            }
        }
    }

    /// Close the block.
    pub fn finish(self) -> Result<Record, Discarded> {
        match self.id {
            IdState::Valid(id) => Ok(Record {
                kind: self.kind,
                line_no: self.line_no,
                id,
                label: self.label,
                synonyms: self.synonyms,
                parents: self.parents,
            }),
            IdState::Unset => Err(Discarded::MissingId {
                kind: self.kind,
                line_no: self.line_no,
            }),
            IdState::Invalid(error) => Err(Discarded::InvalidId {
                kind: self.kind,
                line_no: self.line_no,
                error,
            }),
        }
    }
}

/// Trim and drop one pair of surrounding double quotes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Body of the first double-quoted string in `value` (escapes kept raw).
fn first_quoted(value: &str) -> Option<&str> {
    let start = value.find('"')? + 1;
    let mut escaped = false;
    for (offset, ch) in value[start..].char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(&value[start..start + offset]),
            _ => {}
        }
    }
    None
}

/// Resolve OBO backslash escapes (`\"`, `\\`, `\n`, `\t`, ...).
fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('W') => out.push(' '),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(lines: &[&str]) -> Result<Record, Discarded> {
        let normalizer = IdentifierNormalizer::default();
        let grammar = FieldGrammar::default();
        let mut builder = RecordBuilder::new(BlockKind::Term, 1);
        for line in lines {
            builder.apply(line, &normalizer, &grammar);
        }
        builder.finish()
    }

    #[test]
    fn recognizes_headers() {
        assert_eq!(BlockKind::from_header("[Term]"), Some(BlockKind::Term));
        assert_eq!(BlockKind::from_header("[Typedef]"), Some(BlockKind::Typedef));
        assert_eq!(
            BlockKind::from_header("[ Annotation ]"),
            Some(BlockKind::Other("Annotation".to_string()))
        );
        assert_eq!(BlockKind::from_header("id: X:1"), None);
    }

    #[test]
    fn collects_fields() {
        let record = build(&[
            "id: PATO:0000014",
            "name: red",
            r#"synonym: "crimson" EXACT []"#,
            "is_a: PATO:0000001",
            "def: \"ignored\" []",
        ])
        .expect("record");

        assert_eq!(record.id.fragment(), "PATO_0000014");
        assert_eq!(record.label.as_deref(), Some("red"));
        assert_eq!(record.synonyms, vec!["crimson".to_string()]);
        assert_eq!(record.parents.len(), 1);
        assert_eq!(record.parents[0].fragment(), "PATO_0000001");
    }

    #[test]
    fn parent_ignores_trailing_qualifier() {
        let record = build(&["id: X:1", "is_a: RO:0002470 {comment}"]).expect("record");
        assert_eq!(
            record.parents[0].uri(),
            "http://purl.obolibrary.org/obo/RO_0002470"
        );
    }

    #[test]
    fn fields_before_id_are_kept() {
        let record = build(&["name: early", "id: X:1"]).expect("record");
        assert_eq!(record.label.as_deref(), Some("early"));
    }

    #[test]
    fn invalid_id_makes_block_inert() {
        let result = build(&["id: bad{id}:1", "name: whatever"]);
        assert!(matches!(
            result,
            Err(Discarded::InvalidId {
                error: IdentifierError::IllegalCharacter { ch: '{', .. },
                ..
            })
        ));
    }

    #[test]
    fn missing_id_is_discarded() {
        assert!(matches!(build(&["name: orphan"]), Err(Discarded::MissingId { .. })));
    }

    #[test]
    fn repeated_id_keeps_first() {
        let record = build(&["id: X:1", "id: X:2"]).expect("record");
        assert_eq!(record.id.fragment(), "X_1");
    }

    #[test]
    fn quoted_name_is_unquoted() {
        let record = build(&["id: X:1", r#"name: "quoted name""#]).expect("record");
        assert_eq!(record.label.as_deref(), Some("quoted name"));
    }

    #[test]
    fn synonym_without_quotes_is_skipped() {
        let record = build(&["id: X:1", "synonym: bare EXACT []", r#"synonym: "" EXACT []"#])
            .expect("record");
        assert!(record.synonyms.is_empty());
    }

    #[test]
    fn synonym_keeps_escaped_quotes_and_bang() {
        let record = build(&["id: X:1", r#"synonym: "the \"big\" one!" RELATED []"#])
            .expect("record");
        assert_eq!(record.synonyms, vec![r#"the "big" one!"#.to_string()]);
    }

    #[test]
    fn synonyms_keep_order_and_duplicates() {
        let record = build(&[
            "id: X:1",
            r#"synonym: "b" EXACT []"#,
            r#"synonym: "a" EXACT []"#,
            r#"synonym: "b" NARROW []"#,
        ])
        .expect("record");
        assert_eq!(record.synonyms, vec!["b", "a", "b"]);
    }

    #[test]
    fn custom_parent_fields() {
        let normalizer = IdentifierNormalizer::default();
        let grammar = FieldGrammar::new(&["is_a:", "subset_of:"]);
        let mut builder = RecordBuilder::new(BlockKind::Term, 1);
        builder.apply("id: X:1", &normalizer, &grammar);
        builder.apply("subset_of: X:0", &normalizer, &grammar);
        let record = builder.finish().expect("record");
        assert_eq!(record.parents[0].fragment(), "X_0");
    }

    #[test]
    fn parent_token_requires_leading_curie() {
        let grammar = FieldGrammar::default();
        assert_eq!(grammar.parent_token(" GO:0008150 ! bp"), Some("GO:0008150"));
        assert_eq!(grammar.parent_token("part_of GO:1"), None);
        assert_eq!(grammar.related_token(" part_of GO:1 {source=\"PMID:9\"}"), Some("GO:1"));
    }

    #[test]
    fn relationship_field_yields_target() {
        let normalizer = IdentifierNormalizer::default();
        let grammar = FieldGrammar::new(&["is_a:", "relationship:"]);
        let mut builder = RecordBuilder::new(BlockKind::Term, 1);
        builder.apply("id: GO:2", &normalizer, &grammar);
        builder.apply("relationship: part_of GO:1 ! parent", &normalizer, &grammar);
        builder.apply("is_a: part_of GO:3", &normalizer, &grammar);
        let record = builder.finish().expect("record");

        let parents: Vec<&str> = record.parents.iter().map(|p| p.fragment()).collect();
        assert_eq!(parents, vec!["GO_1"]);
    }
}
