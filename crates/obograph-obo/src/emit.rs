//! Record emission: triples for the graph store, flat documents for search.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const SKOS_ALT_LABEL: &str = "http://www.w3.org/2004/02/skos/core#altLabel";
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Object {
    Iri(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: &'static str,
    pub object: Object,
}

impl Triple {
    fn iri(subject: &str, predicate: &'static str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate,
            object: Object::Iri(object.to_string()),
        }
    }

    fn literal(subject: &str, predicate: &'static str, value: &str) -> Self {
        Self {
            subject: subject.to_string(),
            predicate,
            object: Object::Literal(value.to_string()),
        }
    }
}

/// N-Triples form, e.g. `<s> <p> "o" .`
impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> ", self.subject, self.predicate)?;
        match &self.object {
            Object::Iri(iri) => write!(f, "<{iri}> ."),
            Object::Literal(value) => write!(f, "\"{}\" .", escape_literal(value)),
        }
    }
}

/// Escape a literal for a SPARQL / N-Triples string. Newlines collapse to a
/// space and carriage returns are dropped.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push(' '),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Flat search-index document. `id` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub label: String,
    pub en: String,
    pub ja: String,
    pub uri: String,
    pub synonyms: Vec<String>,
    pub ontology: String,
}

/// Conversion of a finalized record into sink items.
pub trait Emit: Sized {
    fn emit(record: &Record) -> Vec<Self>;
}

impl Emit for Triple {
    fn emit(record: &Record) -> Vec<Self> {
        let subject = record.id.uri();
        let mut out = Vec::with_capacity(2 + record.parents.len() + record.synonyms.len());

        out.push(Triple::iri(subject, RDF_TYPE, OWL_CLASS));
        if let Some(label) = &record.label {
            out.push(Triple::literal(subject, RDFS_LABEL, label));
        }
        for parent in &record.parents {
            out.push(Triple::iri(subject, RDFS_SUBCLASS_OF, parent.uri()));
        }
        for synonym in &record.synonyms {
            out.push(Triple::literal(subject, SKOS_ALT_LABEL, synonym));
        }
        out
    }
}

impl Emit for Document {
    fn emit(record: &Record) -> Vec<Self> {
        let en = record.label.clone().unwrap_or_default();
        vec![Document {
            id: record.id.fragment().to_string(),
            label: en.clone(),
            en,
            ja: String::new(),
            uri: record.id.uri().to_string(),
            synonyms: record.synonyms.clone(),
            ontology: record.id.prefix().to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::IdentifierNormalizer;
    use crate::record::BlockKind;

    fn sample() -> Record {
        let n = IdentifierNormalizer::default();
        Record {
            kind: BlockKind::Term,
            line_no: 1,
            id: n.normalize("PATO:0000014").unwrap(),
            label: Some("red".to_string()),
            synonyms: vec!["crimson".to_string()],
            parents: vec![n.normalize("PATO:0000001").unwrap()],
        }
    }

    #[test]
    fn triples_in_field_order() {
        let triples = Triple::emit(&sample());
        let predicates: Vec<&str> = triples.iter().map(|t| t.predicate).collect();
        assert_eq!(predicates, vec![RDF_TYPE, RDFS_LABEL, RDFS_SUBCLASS_OF, SKOS_ALT_LABEL]);
        assert_eq!(
            triples[0].to_string(),
            "<http://purl.obolibrary.org/obo/PATO_0000014> \
             <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> \
             <http://www.w3.org/2002/07/owl#Class> ."
        );
        assert_eq!(
            triples[3].to_string(),
            "<http://purl.obolibrary.org/obo/PATO_0000014> \
             <http://www.w3.org/2004/02/skos/core#altLabel> \"crimson\" ."
        );
    }

    #[test]
    fn minimal_record_emits_type_only() {
        let mut record = sample();
        record.label = None;
        record.parents.clear();
        record.synonyms.clear();
        assert_eq!(Triple::emit(&record).len(), 1);
    }

    #[test]
    fn escapes_literals() {
        assert_eq!(escape_literal("a \"b\" \\c\r\nd"), "a \\\"b\\\" \\\\c d");
    }

    #[test]
    fn document_carries_record_fields() {
        let docs = Document::emit(&sample());
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.id, "PATO_0000014");
        assert_eq!(doc.label, "red");
        assert_eq!(doc.en, "red");
        assert_eq!(doc.ontology, "PATO");
        assert_eq!(doc.uri, "http://purl.obolibrary.org/obo/PATO_0000014");
        assert_eq!(doc.synonyms, vec!["crimson".to_string()]);

        let json = serde_json::to_value(doc).unwrap();
        assert_eq!(json["id"], "PATO_0000014");
        assert_eq!(json["ja"], "");
    }
}
