//! Darwin Core schema terms as search documents.
//!
//! The Simple Darwin Core XSD lists its terms as element references inside
//! the `SimpleDarwinRecord` element (`<xs:element ref="dwc:occurrenceID"/>`).
//! Each reference becomes one [`Document`] for the `dwc` index.
//!
//! An optional label file supplies Japanese labels keyed by term URI. A
//! Japanese label takes precedence as the display label and is also added to
//! the synonyms, so both spellings are searchable.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use obograph_obo::Document;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub const DWC_INDEX: &str = "dwc";
pub const DWC_ONTOLOGY: &str = "DwC";
pub const SCHEMA_RECORD: &str = "SimpleDarwinRecord";

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
}

/// Namespace URI for the prefixes the Darwin Core schema uses.
pub fn namespace_for(prefix: &str) -> Option<&'static str> {
    match prefix {
        "dwc" => Some("http://rs.tdwg.org/dwc/terms/"),
        "dc" => Some("http://purl.org/dc/elements/1.1/"),
        "dcterms" => Some("http://purl.org/dc/terms/"),
        _ => None,
    }
}

/// One `prefix:local` element reference from the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTerm {
    pub prefix: String,
    pub local: String,
}

impl SchemaTerm {
    /// `None` unless `reference` has exactly one colon with text on both sides.
    pub fn parse(reference: &str) -> Option<Self> {
        let (prefix, local) = reference.trim().split_once(':')?;
        if prefix.is_empty() || local.is_empty() || local.contains(':') {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            local: local.to_string(),
        })
    }

    pub fn reference(&self) -> String {
        format!("{}:{}", self.prefix, self.local)
    }

    /// Primary key, e.g. `dwc_occurrenceID`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.prefix, self.local)
    }

    /// Term URI; empty for prefixes without a known namespace.
    pub fn uri(&self) -> String {
        namespace_for(&self.prefix)
            .map(|ns| format!("{ns}{}", self.local))
            .unwrap_or_default()
    }

    pub fn to_document(&self, labels: &JapaneseLabels) -> Document {
        let uri = self.uri();
        let en = self.local.clone();
        let ja = labels.get(&uri).unwrap_or_default().to_string();

        let mut synonyms = vec![self.reference()];
        if !ja.is_empty() {
            synonyms.push(ja.clone());
        }
        Document {
            id: self.id(),
            label: if ja.is_empty() { en.clone() } else { ja.clone() },
            en,
            ja,
            uri,
            synonyms,
            ontology: DWC_ONTOLOGY.to_string(),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, SchemaError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| SchemaError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn push_reference(element: &BytesStart<'_>, terms: &mut Vec<SchemaTerm>) {
    if let Some(term) = attribute(element, b"ref").as_deref().and_then(SchemaTerm::parse) {
        terms.push(term);
    }
}

pub fn read_schema_file(path: &Path) -> Result<Vec<SchemaTerm>, SchemaError> {
    read_schema_terms(open(path)?)
}

/// Element references inside `SimpleDarwinRecord`, in document order.
pub fn read_schema_terms<R: BufRead>(source: R) -> Result<Vec<SchemaTerm>, SchemaError> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut record_depth: Option<usize> = None;
    let mut terms = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(source) => {
                return Err(SchemaError::Xml {
                    position: reader.buffer_position(),
                    source,
                })
            }
        };
        match event {
            Event::Start(e) => {
                depth += 1;
                if e.local_name().as_ref() == b"element" {
                    if record_depth.is_some() {
                        push_reference(&e, &mut terms);
                    } else if attribute(&e, b"name").as_deref() == Some(SCHEMA_RECORD) {
                        record_depth = Some(depth);
                    }
                }
            }
            Event::Empty(e) => {
                if record_depth.is_some() && e.local_name().as_ref() == b"element" {
                    push_reference(&e, &mut terms);
                }
            }
            Event::End(_) => {
                if record_depth == Some(depth) {
                    record_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(terms)
}

/// Japanese labels keyed by term URI.
///
/// A subject is any element carrying an `about` attribute (a full URI) or a
/// `ref` attribute (`dwc:occurrenceID`). Its first `label` or `documentation`
/// child tagged `xml:lang="ja"`, or carrying no language tag, is its label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JapaneseLabels {
    labels: HashMap<String, String>,
}

impl JapaneseLabels {
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        Self::from_reader(open(path)?)
    }

    pub fn from_reader<R: BufRead>(source: R) -> Result<Self, SchemaError> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut subject: Option<(usize, String)> = None;
        let mut capture: Option<String> = None;
        let mut labels = HashMap::new();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(source) => {
                    return Err(SchemaError::Xml {
                        position: reader.buffer_position(),
                        source,
                    })
                }
            };
            match event {
                Event::Start(e) => {
                    depth += 1;
                    if let Some(uri) = subject_uri(&e) {
                        subject = Some((depth, uri));
                    } else if subject.is_some() && is_japanese_label(&e) {
                        capture = Some(String::new());
                    }
                }
                Event::Text(text) => {
                    if let Some(label) = capture.as_mut() {
                        match text.unescape() {
                            Ok(value) => label.push_str(&value),
                            Err(source) => {
                                return Err(SchemaError::Xml {
                                    position: reader.buffer_position(),
                                    source,
                                })
                            }
                        }
                    }
                }
                Event::End(_) => {
                    if let (Some(label), Some((_, uri))) = (capture.take(), subject.as_ref()) {
                        let label = label.trim();
                        if !label.is_empty() {
                            labels.entry(uri.clone()).or_insert_with(|| label.to_string());
                        }
                    }
                    if subject.as_ref().is_some_and(|(d, _)| *d == depth) {
                        subject = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { labels })
    }

    pub fn get(&self, uri: &str) -> Option<&str> {
        self.labels.get(uri).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<(String, String)> for JapaneseLabels {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

fn subject_uri(element: &BytesStart<'_>) -> Option<String> {
    if let Some(about) = attribute(element, b"about") {
        return Some(about);
    }
    attribute(element, b"ref")
        .as_deref()
        .and_then(SchemaTerm::parse)
        .map(|term| term.uri())
        .filter(|uri| !uri.is_empty())
}

fn is_japanese_label(element: &BytesStart<'_>) -> bool {
    let name = element.local_name();
    if name.as_ref() != b"label" && name.as_ref() != b"documentation" {
        return false;
    }
    match attribute(element, b"lang") {
        Some(lang) => lang == "ja",
        None => true,
    }
}
