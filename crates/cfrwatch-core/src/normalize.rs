//! Schema normalisation: walk a shape-specific fixed path down to the list of
//! boundary-definition sections and turn each into a [`CanonicalRecord`].
//!
//! Two publications carry the same sections in different layouts:
//!
//! ```text
//! Historical (consolidated eCFR)          Annual (compiled CFR edition)
//! DLPSTEXTCLASS                           CFRGRANULE
//!   TEXT/BODY/ECFRBRWS/DIV1/DIV3/DIV4       SUBPART[0]
//!     DIV5[6]            (part 9)             SECTION[*]
//!       DIV6[2]          (subpart C)            SECTNO, SUBJECT, CITA | SECAUTH
//!         DIV8[*]
//!           @N, HEAD, CITA | SECAUTH
//! ```
//!
//! The first section in both layouts is the subpart's "General" section and
//! never describes a boundary.

use crate::record::{CanonicalRecord, RevisionIndex};
use crate::xml::{Node, XmlTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

const HISTORICAL_ROOT: &str = "DLPSTEXTCLASS";
const HISTORICAL_PATH: &[(&str, usize)] = &[
    ("TEXT", 0),
    ("BODY", 0),
    ("ECFRBRWS", 0),
    ("DIV1", 0),
    ("DIV3", 0),
    ("DIV4", 0),
    ("DIV5", 6),
    ("DIV6", 2),
];
const HISTORICAL_SECTION: &str = "DIV8";

const ANNUAL_ROOT: &str = "CFRGRANULE";
const ANNUAL_PATH: &[(&str, usize)] = &[("SUBPART", 0)];
const ANNUAL_SECTION: &str = "SECTION";

const SECTION_SYMBOL: char = '§';

/// Well-formed markup that does not have the layout the selected shape expects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The document root is not the element the shape starts from.
    #[error("expected root <{expected}>, found <{found}>")]
    Root { expected: &'static str, found: String },

    /// A step on the fixed path to the sections is missing.
    #[error("path step {step} did not resolve")]
    Path { step: String },

    /// The path resolved but holds no section elements.
    #[error("no <{0}> sections under the expected path")]
    NoSections(&'static str),

    /// A section lacks its identifier or title.
    #[error("section #{position}: missing {field}")]
    MissingField {
        position: usize,
        field: &'static str,
    },

    /// The identifier is not prefixed by the section symbol and whitespace.
    #[error("section #{position}: identifier {raw:?} does not start with `§ `")]
    Identifier { position: usize, raw: String },

    /// A historical header has no run of three or more spaces before the title.
    #[error("section {identifier}: header {raw:?} has no title part")]
    Header { identifier: String, raw: String },

    /// Neither a citation nor a statutory authority carries any text.
    #[error("section {identifier}: neither CITA nor SECAUTH is present")]
    MissingFingerprint { identifier: String },
}

/// Which publication layout a document follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentShape {
    /// Consolidated eCFR title, all years folded together.
    Historical,
    /// One year's compiled CFR edition of part 9 subpart C.
    Annual,
}

impl DocumentShape {
    pub fn normalizer(self) -> &'static dyn Normalizer {
        match self {
            DocumentShape::Historical => &HistoricalNormalizer,
            DocumentShape::Annual => &AnnualNormalizer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentShape::Historical => "historical",
            DocumentShape::Annual => "annual",
        }
    }
}

impl fmt::Display for DocumentShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Normalizer {
    fn normalize(&self, tree: &XmlTree) -> Result<RevisionIndex, ShapeError>;
}

pub fn normalize_document(
    tree: &XmlTree,
    shape: DocumentShape,
) -> Result<RevisionIndex, ShapeError> {
    shape.normalizer().normalize(tree)
}

/// Reads `DIV8` sections of the consolidated eCFR title.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalNormalizer;

impl Normalizer for HistoricalNormalizer {
    fn normalize(&self, tree: &XmlTree) -> Result<RevisionIndex, ShapeError> {
        let sections = resolve_sections(
            tree,
            HISTORICAL_ROOT,
            HISTORICAL_PATH,
            HISTORICAL_SECTION,
        )?;
        build_index(sections, |position, section| {
            let raw_id = section.attr("N").ok_or(ShapeError::MissingField {
                position,
                field: "N attribute",
            })?;
            let identifier = strip_section_symbol(raw_id).ok_or_else(|| ShapeError::Identifier {
                position,
                raw: raw_id.to_string(),
            })?;
            let head = section
                .child("HEAD", 0)
                .and_then(Node::text)
                .ok_or(ShapeError::MissingField {
                    position,
                    field: "HEAD",
                })?;
            let title = split_header(head).ok_or_else(|| ShapeError::Header {
                identifier: identifier.to_string(),
                raw: head.to_string(),
            })?;
            Ok(CanonicalRecord {
                identifier: identifier.to_string(),
                name: strip_terminal_period(title).to_string(),
                revision_fingerprint: fingerprint(section, identifier)?,
            })
        })
    }
}

/// Reads `SECTION` elements of one year's compiled edition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnualNormalizer;

impl Normalizer for AnnualNormalizer {
    fn normalize(&self, tree: &XmlTree) -> Result<RevisionIndex, ShapeError> {
        let sections = resolve_sections(tree, ANNUAL_ROOT, ANNUAL_PATH, ANNUAL_SECTION)?;
        build_index(sections, |position, section| {
            let raw_id = section
                .child("SECTNO", 0)
                .and_then(Node::text)
                .ok_or(ShapeError::MissingField {
                    position,
                    field: "SECTNO",
                })?;
            let identifier = strip_section_symbol(raw_id).ok_or_else(|| ShapeError::Identifier {
                position,
                raw: raw_id.to_string(),
            })?;
            let subject = section
                .child("SUBJECT", 0)
                .and_then(Node::text)
                .ok_or(ShapeError::MissingField {
                    position,
                    field: "SUBJECT",
                })?;
            Ok(CanonicalRecord {
                identifier: identifier.to_string(),
                name: strip_terminal_period(subject.trim()).to_string(),
                revision_fingerprint: fingerprint(section, identifier)?,
            })
        })
    }
}

fn resolve_sections<'a>(
    tree: &'a XmlTree,
    root: &'static str,
    path: &[(&str, usize)],
    section_tag: &'static str,
) -> Result<&'a [Node], ShapeError> {
    let mut node = tree.root(root).ok_or_else(|| ShapeError::Root {
        expected: root,
        found: tree.root_name.clone(),
    })?;
    for (tag, index) in path {
        node = node.child(tag, *index).ok_or_else(|| ShapeError::Path {
            step: format!("{tag}[{index}]"),
        })?;
    }
    match node.children(section_tag) {
        Some(sections) if !sections.is_empty() => Ok(sections),
        _ => Err(ShapeError::NoSections(section_tag)),
    }
}

fn build_index<F>(sections: &[Node], mut read: F) -> Result<RevisionIndex, ShapeError>
where
    F: FnMut(usize, &Node) -> Result<CanonicalRecord, ShapeError>,
{
    let mut index = RevisionIndex::new();
    // Index 0 is the subpart's "General" section.
    for (position, section) in sections.iter().enumerate().skip(1) {
        let record = read(position, section)?;
        debug!(identifier = %record.identifier, name = %record.name, "normalized section");
        if let Some(previous) = index.insert(record) {
            warn!(
                identifier = %previous.identifier,
                "duplicate section identifier; keeping the later entry"
            );
        }
    }
    Ok(index)
}

fn fingerprint(section: &Node, identifier: &str) -> Result<String, ShapeError> {
    // 9.126 (Santa Clara Valley) carries SECAUTH without CITA in some editions.
    // An empty CITA counts as absent, with or without attributes.
    let text_of = |tag: &str| {
        section
            .child(tag, 0)
            .and_then(Node::text)
            .filter(|text| !text.is_empty())
    };
    text_of("CITA")
        .or_else(|| text_of("SECAUTH"))
        .map(ToOwned::to_owned)
        .ok_or_else(|| ShapeError::MissingFingerprint {
            identifier: identifier.to_string(),
        })
}

fn strip_section_symbol(raw: &str) -> Option<&str> {
    let rest = raw.trim().strip_prefix(SECTION_SYMBOL)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let identifier = rest.trim_start();
    (!identifier.is_empty()).then_some(identifier)
}

fn header_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {3,}").expect("header separator regex must compile"))
}

/// `"§ 9.22   Napa Valley."` -> `"Napa Valley."`
fn split_header(head: &str) -> Option<&str> {
    let mut parts = header_separator().splitn(head, 2);
    let _label = parts.next()?;
    let title = parts.next()?.trim();
    (!title.is_empty()).then_some(title)
}

fn strip_terminal_period(text: &str) -> &str {
    text.trim_end_matches('.').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    const GENERAL_DIV8: &str =
        r#"<DIV8 N="§ 9.21" TYPE="SECTION"><HEAD>§ 9.21   General.</HEAD><P>The viticultural areas listed in this subpart are approved.</P></DIV8>"#;

    fn historical_doc(sections: &str) -> String {
        let part_padding = r#"<DIV5 N="1" TYPE="PART"/>"#.repeat(6);
        let subpart_padding = r#"<DIV6 N="A" TYPE="SUBPART"/>"#.repeat(2);
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<DLPSTEXTCLASS><TEXT><BODY><ECFRBRWS><DIV1 N="1" TYPE="TITLE"><DIV3 N="I" TYPE="CHAPTER"><DIV4 N="A" TYPE="SUBCHAP">
{part_padding}
<DIV5 N="9" TYPE="PART">{subpart_padding}<DIV6 N="C" TYPE="SUBPART">
{GENERAL_DIV8}
{sections}
</DIV6></DIV5></DIV4></DIV3></DIV1></ECFRBRWS></BODY></TEXT></DLPSTEXTCLASS>"#
        )
    }

    fn annual_doc(sections: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<CFRGRANULE><FDSYS><TITLE>Title 27</TITLE></FDSYS><SUBPART>
<HD SOURCE="HED">Subpart C—Approved American Viticultural Areas</HD>
<SECTION><SECTNO>§ 9.21</SECTNO><SUBJECT>General.</SUBJECT><P>The viticultural areas listed in this subpart are approved.</P></SECTION>
{sections}
</SUBPART></CFRGRANULE>"#
        )
    }

    fn normalize(xml: &str, shape: DocumentShape) -> Result<RevisionIndex, ShapeError> {
        let tree = parse_document(xml.as_bytes()).expect("fixture should be well-formed");
        normalize_document(&tree, shape)
    }

    #[test]
    fn historical_skips_general_section_and_strips_prefixes() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.22" TYPE="SECTION"><HEAD>§ 9.22   Napa Valley.</HEAD><P>(a) Name.</P><CITA TYPE="N">[T.D. ATF-79, 46 FR 9063, Jan. 28, 1981]</CITA></DIV8>
<DIV8 N="§ 9.23" TYPE="SECTION"><HEAD>§ 9.23   Mt. Veeder.</HEAD><CITA TYPE="N">[T.D. ATF-200, 50 FR 2677]</CITA></DIV8>"#,
        );
        let index = normalize(&xml, DocumentShape::Historical).expect("should normalize");

        assert_eq!(index.len(), 2);
        assert!(!index.contains("9.21"));
        let napa = index.get("9.22").expect("9.22 present");
        assert_eq!(napa.name, "Napa Valley");
        assert_eq!(
            napa.revision_fingerprint,
            "[T.D. ATF-79, 46 FR 9063, Jan. 28, 1981]"
        );
        assert_eq!(index.get("9.23").map(|r| r.name.as_str()), Some("Mt. Veeder"));
    }

    #[test]
    fn historical_falls_back_to_statutory_authority() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.126" TYPE="SECTION"><HEAD>§ 9.126   Santa Clara Valley.</HEAD><SECAUTH TYPE="N">Authority: 27 U.S.C. 205</SECAUTH></DIV8>"#,
        );
        let index = normalize(&xml, DocumentShape::Historical).expect("should normalize");
        let record = index.get("9.126").expect("9.126 present");
        assert_eq!(record.name, "Santa Clara Valley");
        assert_eq!(record.revision_fingerprint, "Authority: 27 U.S.C. 205");
    }

    #[test]
    fn citation_wins_over_statutory_authority() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.24" TYPE="SECTION"><HEAD>§ 9.24   Lodi.</HEAD><SECAUTH TYPE="N">Authority: 27 U.S.C. 205</SECAUTH><CITA TYPE="N">[T.D. ATF-131]</CITA></DIV8>"#,
        );
        let index = normalize(&xml, DocumentShape::Historical).expect("should normalize");
        assert_eq!(
            index.get("9.24").map(|r| r.revision_fingerprint.as_str()),
            Some("[T.D. ATF-131]")
        );
    }

    #[test]
    fn empty_citation_falls_back_to_statutory_authority() {
        for cita in ["<CITA/>", r#"<CITA TYPE="N"/>"#, r#"<CITA TYPE="N">  </CITA>"#] {
            let xml = historical_doc(&format!(
                r#"<DIV8 N="§ 9.24" TYPE="SECTION"><HEAD>§ 9.24   Lodi.</HEAD>{cita}<SECAUTH TYPE="N">auth</SECAUTH></DIV8>"#
            ));
            let index = normalize(&xml, DocumentShape::Historical).expect("should normalize");
            assert_eq!(
                index.get("9.24").map(|r| r.revision_fingerprint.as_str()),
                Some("auth"),
                "{cita}"
            );
        }
    }

    #[test]
    fn historical_header_splits_on_longer_space_runs() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.25" TYPE="SECTION"><HEAD>§ 9.25     Santa Cruz Mountains.</HEAD><CITA TYPE="N">x</CITA></DIV8>"#,
        );
        let index = normalize(&xml, DocumentShape::Historical).expect("should normalize");
        assert_eq!(
            index.get("9.25").map(|r| r.name.as_str()),
            Some("Santa Cruz Mountains")
        );
    }

    #[test]
    fn header_without_title_is_a_shape_failure() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.25" TYPE="SECTION"><HEAD>§ 9.25 Santa Cruz Mountains.</HEAD><CITA TYPE="N">x</CITA></DIV8>"#,
        );
        assert!(matches!(
            normalize(&xml, DocumentShape::Historical),
            Err(ShapeError::Header { identifier, .. }) if identifier == "9.25"
        ));
    }

    #[test]
    fn missing_fingerprint_is_a_shape_failure() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.22" TYPE="SECTION"><HEAD>§ 9.22   Napa Valley.</HEAD></DIV8>"#,
        );
        assert_eq!(
            normalize(&xml, DocumentShape::Historical),
            Err(ShapeError::MissingFingerprint {
                identifier: "9.22".to_string()
            })
        );
    }

    #[test]
    fn identifier_without_section_symbol_fails_loudly() {
        let xml = historical_doc(
            r#"<DIV8 N="9.22" TYPE="SECTION"><HEAD>§ 9.22   Napa Valley.</HEAD><CITA TYPE="N">x</CITA></DIV8>"#,
        );
        assert!(matches!(
            normalize(&xml, DocumentShape::Historical),
            Err(ShapeError::Identifier { position: 1, .. })
        ));
    }

    #[test]
    fn truncated_path_is_a_shape_failure() {
        let xml = "<DLPSTEXTCLASS><TEXT><BODY><ECFRBRWS><DIV1 N=\"1\"/></ECFRBRWS></BODY></TEXT></DLPSTEXTCLASS>";
        assert!(matches!(
            normalize(xml, DocumentShape::Historical),
            Err(ShapeError::Path { step }) if step == "DIV3[0]"
        ));
    }

    #[test]
    fn wrong_shape_reports_root_mismatch() {
        let xml = annual_doc("");
        assert!(matches!(
            normalize(&xml, DocumentShape::Historical),
            Err(ShapeError::Root { expected: "DLPSTEXTCLASS", .. })
        ));
        let xml = historical_doc("");
        assert!(matches!(
            normalize(&xml, DocumentShape::Annual),
            Err(ShapeError::Root { expected: "CFRGRANULE", .. })
        ));
    }

    #[test]
    fn general_section_alone_yields_empty_index() {
        let index = normalize(&annual_doc(""), DocumentShape::Annual).expect("should normalize");
        assert!(index.is_empty());
    }

    #[test]
    fn annual_reads_flat_child_values() {
        let xml = annual_doc(
            r#"<SECTION><SECTNO>§ 9.22</SECTNO><SUBJECT>Napa Valley.</SUBJECT><P>(a) Name.</P><CITA>[T.D. ATF-79, 46 FR 9063]</CITA></SECTION>
<SECTION><SECTNO>§ 9.126</SECTNO><SUBJECT>Santa Clara Valley.</SUBJECT><SECAUTH>Authority: 27 U.S.C. 205</SECAUTH></SECTION>"#,
        );
        let index = normalize(&xml, DocumentShape::Annual).expect("should normalize");
        assert_eq!(index.len(), 2);
        let napa = index.get("9.22").expect("9.22 present");
        assert_eq!(napa.name, "Napa Valley");
        assert_eq!(napa.revision_fingerprint, "[T.D. ATF-79, 46 FR 9063]");
        assert_eq!(
            index.get("9.126").map(|r| r.revision_fingerprint.as_str()),
            Some("Authority: 27 U.S.C. 205")
        );
    }

    #[test]
    fn annual_missing_subject_is_a_shape_failure() {
        let xml = annual_doc(r#"<SECTION><SECTNO>§ 9.22</SECTNO><CITA>x</CITA></SECTION>"#);
        assert_eq!(
            normalize(&xml, DocumentShape::Annual),
            Err(ShapeError::MissingField {
                position: 1,
                field: "SUBJECT"
            })
        );
    }

    #[test]
    fn annual_duplicate_identifier_keeps_last() {
        let xml = annual_doc(
            r#"<SECTION><SECTNO>§ 9.22</SECTNO><SUBJECT>Napa Valley.</SUBJECT><CITA>first</CITA></SECTION>
<SECTION><SECTNO>§ 9.22</SECTNO><SUBJECT>Napa Valley.</SUBJECT><CITA>second</CITA></SECTION>"#,
        );
        let index = normalize(&xml, DocumentShape::Annual).expect("should normalize");
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get("9.22").map(|r| r.revision_fingerprint.as_str()),
            Some("second")
        );
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let xml = historical_doc(
            r#"<DIV8 N="§ 9.22" TYPE="SECTION"><HEAD>§ 9.22   Napa Valley.</HEAD><CITA TYPE="N">[a]</CITA></DIV8>"#,
        );
        let tree = parse_document(xml.as_bytes()).expect("fixture should be well-formed");
        let first = normalize_document(&tree, DocumentShape::Historical).expect("first pass");
        let second = normalize_document(&tree, DocumentShape::Historical).expect("second pass");
        assert_eq!(first, second);
    }

    #[test]
    fn names_never_keep_trailing_periods() {
        assert_eq!(strip_terminal_period("Napa Valley."), "Napa Valley");
        assert_eq!(strip_terminal_period("Mt. Veeder.."), "Mt. Veeder");
        assert_eq!(strip_terminal_period("Lodi"), "Lodi");
    }
}
