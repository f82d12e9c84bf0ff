//! Source record parser.
//!
//! Decodes one TriG file from the source dataset into a [`ParsedRecord`]:
//! release status, optional replacement id, preferred and alternate
//! labels, and (for works) the author list. Labels prefer native-script
//! (`@bo`) values; transliteration-only (`@bo-x-ewts`) values are decoded
//! to Tibetan Unicode before use. Parse failures are returned to the
//! caller, which logs and counts them without aborting the run.

use std::path::Path;

use anyhow::{Context, Result};
use ewts::EwtsConverter;
use oxrdf::{Quad, Subject, Term};
use oxttl::TriGParser;

use crate::models::{ParsedRecord, RecordType};

const ADMIN_NS: &str = "http://purl.bdrc.io/ontology/admin/";
const DATA_NS: &str = "http://purl.bdrc.io/admindata/";
const CORE_NS: &str = "http://purl.bdrc.io/ontology/core/";
const RESOURCE_NS: &str = "http://purl.bdrc.io/resource/";
const SKOS_NS: &str = "http://www.w3.org/2004/02/skos/core#";

const NATIVE_LANG: &str = "bo";
const TRANSLIT_LANG: &str = "bo-x-ewts";

/// Recognized authorship role ids (local names under the resource
/// namespace). `R0ER0014` is the commentator role: when any creator holds
/// it, only commentators are reported as authors.
const AUTHOR_ROLES: [&str; 4] = ["R0ER0011", "R0ER0014", "R0ER0019", "R0ER0025"];
const COMMENTATOR_ROLE: &str = "R0ER0014";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Iri(String),
    Blank(String),
}

#[derive(Debug, Clone)]
enum Object {
    Node(Node),
    Literal { value: String, lang: Option<String> },
}

/// Union of all graphs in one TriG document, preserving triple order.
struct Graph {
    triples: Vec<(Node, String, Object)>,
}

impl Graph {
    fn parse(trig: &str) -> Result<Self> {
        let mut triples = Vec::new();
        for quad in TriGParser::new().for_reader(trig.as_bytes()) {
            let quad: Quad = quad?;
            let subject = match quad.subject {
                Subject::NamedNode(n) => Node::Iri(n.into_string()),
                Subject::BlankNode(b) => Node::Blank(b.into_string()),
                #[allow(unreachable_patterns)]
                _ => continue,
            };
            let predicate = quad.predicate.into_string();
            let object = match quad.object {
                Term::NamedNode(n) => Object::Node(Node::Iri(n.into_string())),
                Term::BlankNode(b) => Object::Node(Node::Blank(b.into_string())),
                Term::Literal(lit) => Object::Literal {
                    lang: lit.language().map(|l| l.to_string()),
                    value: lit.destruct().0,
                },
                #[allow(unreachable_patterns)]
                _ => continue,
            };
            triples.push((subject, predicate, object));
        }
        Ok(Graph { triples })
    }

    fn objects<'a>(
        &'a self,
        subject: &'a Node,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Object> {
        self.triples
            .iter()
            .filter(move |(s, p, _)| s == subject && p == predicate)
            .map(|(_, _, o)| o)
    }
}

fn resource_local_name(node: &Node) -> Option<&str> {
    match node {
        Node::Iri(iri) => iri.strip_prefix(RESOURCE_NS),
        Node::Blank(_) => None,
    }
}

/// Extract a single label, preferring `@bo` over decoded `@bo-x-ewts`.
fn extract_label(
    graph: &Graph,
    subject: &Node,
    predicate: &str,
    converter: &EwtsConverter,
) -> Option<String> {
    let mut native: Option<String> = None;
    let mut translit: Option<String> = None;

    for obj in graph.objects(subject, predicate) {
        if let Object::Literal { value, lang } = obj {
            match lang.as_deref() {
                Some(NATIVE_LANG) => native = Some(value.clone()),
                Some(TRANSLIT_LANG) => translit = Some(value.clone()),
                _ => {}
            }
        }
    }

    native.or_else(|| translit.map(|t| converter.ewts_to_unicode(&t)))
}

/// Extract all labels for a predicate: native-script values first, then
/// decoded transliteration-only values, encounter order within each group.
fn extract_labels(
    graph: &Graph,
    subject: &Node,
    predicate: &str,
    converter: &EwtsConverter,
) -> Vec<String> {
    let mut native = Vec::new();
    let mut translit = Vec::new();

    for obj in graph.objects(subject, predicate) {
        if let Object::Literal { value, lang } = obj {
            match lang.as_deref() {
                Some(NATIVE_LANG) => native.push(value.clone()),
                Some(TRANSLIT_LANG) => translit.push(value.clone()),
                _ => {}
            }
        }
    }

    native.extend(translit.iter().map(|t| converter.ewts_to_unicode(t)));
    native
}

/// Extract author person ids from creator nodes.
///
/// A creator qualifies only when its role is one of the recognized
/// authorship roles and its agent resolves to a resource id. When any
/// qualifying creator holds the commentator role, only commentators are
/// returned; otherwise all qualifying agents, in encounter order.
fn extract_authors(graph: &Graph, subject: &Node) -> Vec<String> {
    let role_iris: Vec<String> = AUTHOR_ROLES
        .iter()
        .map(|r| format!("{}{}", RESOURCE_NS, r))
        .collect();
    let commentator_iri = format!("{}{}", RESOURCE_NS, COMMENTATOR_ROLE);
    let creator_pred = format!("{}creator", CORE_NS);
    let role_pred = format!("{}role", CORE_NS);
    let agent_pred = format!("{}agent", CORE_NS);

    let mut commentators = Vec::new();
    let mut others = Vec::new();

    for creator in graph.objects(subject, &creator_pred) {
        let Object::Node(creator_node) = creator else {
            continue;
        };

        let role = graph
            .objects(creator_node, &role_pred)
            .find_map(|obj| match obj {
                Object::Node(Node::Iri(iri)) if role_iris.iter().any(|r| r == iri) => {
                    Some(iri.clone())
                }
                _ => None,
            });
        let Some(role) = role else {
            continue;
        };

        let agent = graph
            .objects(creator_node, &agent_pred)
            .find_map(|obj| match obj {
                Object::Node(node) => resource_local_name(node).map(|n| n.to_string()),
                _ => None,
            });
        let Some(agent) = agent else {
            continue;
        };

        if role == commentator_iri {
            commentators.push(agent);
        } else {
            others.push(agent);
        }
    }

    if commentators.is_empty() {
        others
    } else {
        commentators
    }
}

/// Parse one TriG document into a [`ParsedRecord`].
pub fn parse_record(record_id: &str, trig: &str) -> Result<ParsedRecord> {
    let graph = Graph::parse(trig)
        .with_context(|| format!("failed to parse source record '{}'", record_id))?;
    let converter = EwtsConverter::create();

    let admin_subject = Node::Iri(format!("{}{}", DATA_NS, record_id));
    let resource_subject = Node::Iri(format!("{}{}", RESOURCE_NS, record_id));

    let status_pred = format!("{}status", ADMIN_NS);
    let released_iri = format!("{}StatusReleased", DATA_NS);
    let is_released = graph
        .objects(&admin_subject, &status_pred)
        .any(|obj| matches!(obj, Object::Node(Node::Iri(iri)) if *iri == released_iri));

    let replace_pred = format!("{}replaceWith", ADMIN_NS);
    let replacement_id = graph
        .objects(&admin_subject, &replace_pred)
        .find_map(|obj| match obj {
            Object::Node(node) => resource_local_name(node).map(|n| n.to_string()),
            _ => None,
        });

    let pref_pred = format!("{}prefLabel", SKOS_NS);
    let alt_pred = format!("{}altLabel", SKOS_NS);
    let pref_label = extract_label(&graph, &resource_subject, &pref_pred, &converter);
    let alt_labels = extract_labels(&graph, &resource_subject, &alt_pred, &converter);

    let record_type = RecordType::from_id(record_id);

    let authors = if record_type == RecordType::Work {
        extract_authors(&graph, &resource_subject)
    } else {
        Vec::new()
    };

    Ok(ParsedRecord {
        id: record_id.to_string(),
        record_type,
        is_released,
        replacement_id,
        pref_label,
        alt_labels,
        authors,
    })
}

/// Parse one record file; the record id is the file stem.
pub fn parse_record_file(path: &Path) -> Result<ParsedRecord> {
    let record_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("record file has no stem: {}", path.display()))?;
    let trig = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read record file: {}", path.display()))?;
    parse_record(&record_id, &trig)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXES: &str = r#"
        @prefix adm: <http://purl.bdrc.io/ontology/admin/> .
        @prefix bda: <http://purl.bdrc.io/admindata/> .
        @prefix bdo: <http://purl.bdrc.io/ontology/core/> .
        @prefix bdr: <http://purl.bdrc.io/resource/> .
        @prefix skos: <http://www.w3.org/2004/02/skos/core#> .
    "#;

    fn trig(body: &str) -> String {
        format!("{}\n{}", PREFIXES, body)
    }

    #[test]
    fn native_script_label_wins_over_transliteration() {
        let doc = trig(
            r#"
            bda:W100 adm:status bda:StatusReleased .
            bdr:W100 skos:prefLabel "chos"@bo-x-ewts , "ཆོས"@bo .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert!(record.is_released);
        assert_eq!(record.pref_label.as_deref(), Some("ཆོས"));
    }

    #[test]
    fn transliteration_only_label_is_decoded() {
        let doc = trig(
            r#"
            bdr:W100 skos:prefLabel "chos"@bo-x-ewts .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert_eq!(record.pref_label.as_deref(), Some("ཆོས"));
    }

    #[test]
    fn alternate_labels_keep_native_first_then_decoded() {
        let doc = trig(
            r#"
            bdr:W100 skos:altLabel "gzhan"@bo-x-ewts , "མཚན་གཞན"@bo .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert_eq!(record.alt_labels, vec!["མཚན་གཞན", "གཞན"]);
    }

    #[test]
    fn commentator_role_excludes_other_authors() {
        let doc = trig(
            r#"
            bdr:W100 bdo:creator [ bdo:role bdr:R0ER0011 ; bdo:agent bdr:P111 ] ;
                     bdo:creator [ bdo:role bdr:R0ER0014 ; bdo:agent bdr:P222 ] .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert_eq!(record.authors, vec!["P222"]);
    }

    #[test]
    fn all_qualifying_authors_in_encounter_order_without_commentator() {
        let doc = trig(
            r#"
            bdr:W100 bdo:creator [ bdo:role bdr:R0ER0019 ; bdo:agent bdr:P111 ] ;
                     bdo:creator [ bdo:role bdr:R0ER0011 ; bdo:agent bdr:P222 ] ;
                     bdo:creator [ bdo:role bdr:R9999999 ; bdo:agent bdr:P333 ] .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert_eq!(record.authors, vec!["P111", "P222"]);
    }

    #[test]
    fn creators_without_agent_are_ignored() {
        let doc = trig(
            r#"
            bdr:W100 bdo:creator [ bdo:role bdr:R0ER0011 ] ;
                     bdo:creator [ bdo:role bdr:R0ER0011 ; bdo:agent bdr:P444 ] .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert_eq!(record.authors, vec!["P444"]);
    }

    #[test]
    fn persons_never_get_authors() {
        let doc = trig(
            r#"
            bdr:P100 bdo:creator [ bdo:role bdr:R0ER0011 ; bdo:agent bdr:P444 ] .
            "#,
        );
        let record = parse_record("P100", &doc).unwrap();
        assert_eq!(record.record_type, RecordType::Person);
        assert!(record.authors.is_empty());
    }

    #[test]
    fn replacement_id_and_unreleased_status() {
        let doc = trig(
            r#"
            bda:W100 adm:status bda:StatusWithdrawn ;
                     adm:replaceWith bdr:W999 .
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert!(!record.is_released);
        assert_eq!(record.replacement_id.as_deref(), Some("W999"));
    }

    #[test]
    fn named_graphs_are_collapsed() {
        let doc = trig(
            r#"
            @prefix bdg: <http://purl.bdrc.io/graph/> .
            bdg:W100 {
                bda:W100 adm:status bda:StatusReleased .
                bdr:W100 skos:prefLabel "ཆོས"@bo .
            }
            "#,
        );
        let record = parse_record("W100", &doc).unwrap();
        assert!(record.is_released);
        assert_eq!(record.pref_label.as_deref(), Some("ཆོས"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_record("W100", "this is not trig {{{").is_err());
    }
}
