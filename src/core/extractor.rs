use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::tei::Element;

const TITLE_PATH: &str = "teiHeader/fileDesc/titleStmt/title";
const ABSTRACT_PATH: &str = "teiHeader/profileDesc/abstract";
const KEYWORD_PATH: &str = "teiHeader/profileDesc/textClass/keywords/term";
const AUTHOR_PATH: &str = "teiHeader/fileDesc/sourceDesc//biblStruct/analytic/author";
const HEADER_VENUE_PATH: &str = "teiHeader/fileDesc/sourceDesc//biblStruct/monogr/title";
const BACK_DIV_PATH: &str = "text/back/div";
const REFERENCE_PATH: &str = "text/back/div/listBibl/biblStruct";
const ACKNOWLEDGEMENT_TOKEN: &str = "acknowledgement";

/// One author mention as it appears in the markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedAuthor {
    pub forename: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub affiliation_name: Option<String>,
    pub affiliation_country: Option<String>,
}

/// A bibliography entry that carried a usable title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedReference {
    pub title: String,
    pub venue: Option<String>,
    pub date: Option<String>,
    pub authors: Vec<ExtractedAuthor>,
}

/// Raw record for one converted document, before any corpus-level merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub title: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub authors: Vec<ExtractedAuthor>,
    pub references: Vec<ExtractedReference>,
    pub acknowledgement: String,
    pub venue: Option<String>,
}

/// Best-effort extraction of scholarly records from GROBID TEI markup.
///
/// Every lookup is guarded: a missing element only empties the field that
/// depended on it, so extraction itself cannot fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeiExtractor;

impl TeiExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, markup: &str) -> ExtractedDocument {
        let root = Element::parse(markup);

        let document = ExtractedDocument {
            title: text_at(&root, TITLE_PATH).unwrap_or_default(),
            abstract_text: root.find(ABSTRACT_PATH).map(Element::text).unwrap_or_default(),
            keywords: self.keywords(&root),
            authors: root.find_all(AUTHOR_PATH).into_iter().map(|a| self.author(a)).collect(),
            references: self.references(&root),
            acknowledgement: self.acknowledgement(&root),
            venue: text_at(&root, HEADER_VENUE_PATH),
        };

        debug!(
            "Extracted '{}': {} authors, {} references, {} keywords",
            document.title,
            document.authors.len(),
            document.references.len(),
            document.keywords.len()
        );

        document
    }

    fn keywords(&self, root: &Element) -> Vec<String> {
        root.find_all(KEYWORD_PATH)
            .into_iter()
            .map(Element::text)
            .filter(|term| !term.is_empty())
            .collect()
    }

    fn author(&self, author: &Element) -> ExtractedAuthor {
        ExtractedAuthor {
            forename: text_at(author, "persName/forename"),
            surname: text_at(author, "persName/surname"),
            email: text_at(author, "email"),
            affiliation_name: text_at(author, "affiliation/orgName"),
            affiliation_country: text_at(author, "affiliation/address/country"),
        }
    }

    /// The last qualifying back-matter division wins, and within it the last
    /// element carrying text supplies the acknowledgement.
    fn acknowledgement(&self, root: &Element) -> String {
        let Some(section) = root
            .find_all(BACK_DIV_PATH)
            .into_iter()
            .filter(|div| is_acknowledgement(div))
            .last()
        else {
            return String::new();
        };

        section
            .preorder()
            .into_iter()
            .map(Element::own_text)
            .filter(|text| !text.is_empty())
            .last()
            .unwrap_or_default()
    }

    fn references(&self, root: &Element) -> Vec<ExtractedReference> {
        root.find_all(REFERENCE_PATH)
            .into_iter()
            .filter_map(|entry| self.reference(entry))
            .collect()
    }

    fn reference(&self, entry: &Element) -> Option<ExtractedReference> {
        let analytic_title = text_at(entry, "analytic/title");
        let monograph_title = text_at(entry, "monogr/title");

        let (title, venue) = match (analytic_title, monograph_title) {
            (Some(title), venue) => (title, venue),
            (None, Some(title)) => (title, None),
            (None, None) => {
                debug!("Dropping bibliography entry without a title");
                return None;
            }
        };

        let analytic_authors = entry.find_all("analytic/author");
        let authors = if analytic_authors.is_empty() {
            entry.find_all("monogr/author")
        } else {
            analytic_authors
        };

        let date = entry.find("monogr/imprint/date").and_then(|date| {
            let text = date.text();
            if text.is_empty() {
                date.attr("when").map(str::to_string)
            } else {
                Some(text)
            }
        });

        Some(ExtractedReference {
            title,
            venue,
            date,
            authors: authors.into_iter().map(|a| self.author(a)).collect(),
        })
    }
}

fn is_acknowledgement(div: &Element) -> bool {
    div.attributes.iter().any(|(_, value)| {
        value
            .split_whitespace()
            .any(|token| token == ACKNOWLEDGEMENT_TOKEN)
    })
}

fn text_at(element: &Element, path: &str) -> Option<String> {
    element
        .find(path)
        .map(Element::text)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader xml:lang="en">
    <fileDesc>
      <titleStmt><title level="a" type="main">Graph Methods for Citation Analysis</title></titleStmt>
      <sourceDesc>
        <biblStruct>
          <analytic>
            <author>
              <persName><forename type="first">Jane</forename><surname>Smith</surname></persName>
              <email>jane@uni.edu</email>
              <affiliation>
                <orgName type="institution">Example University</orgName>
                <address><country key="ES">Spain</country></address>
              </affiliation>
            </author>
            <author><persName><surname>Doe</surname></persName></author>
          </analytic>
          <monogr><title level="j">Journal of Graphs</title></monogr>
        </biblStruct>
      </sourceDesc>
    </fileDesc>
    <profileDesc>
      <textClass><keywords><term>graphs</term><term>citations</term></keywords></textClass>
      <abstract><div><p>We study
        citation graphs.</p><p>They are large.</p></div></abstract>
    </profileDesc>
  </teiHeader>
  <text>
    <back>
      <div type="acknowledgement"><div><head>Acknowledgements</head><p>Thanks to the first funder.</p></div></div>
      <div type="acknowledgement"><div><head>Acknowledgements</head><p>Funded by the Research Council.</p></div></div>
      <div type="references">
        <listBibl>
          <biblStruct>
            <analytic>
              <title level="a">Deep Citation Networks</title>
              <author><persName><forename>Ann</forename><surname>Lee</surname></persName></author>
            </analytic>
            <monogr>
              <title level="j">Network Science</title>
              <author><persName><forename>Ignored</forename><surname>Editor</surname></persName></author>
              <imprint><date type="published" when="2019">2019</date></imprint>
            </monogr>
          </biblStruct>
          <biblStruct>
            <monogr>
              <title level="m">A Book on Graphs</title>
              <author><persName><forename>Bob</forename><surname>Ray</surname></persName></author>
              <imprint><date type="published" when="2001-05"/></imprint>
            </monogr>
          </biblStruct>
          <biblStruct>
            <analytic><title level="a">Chapter on Graph Cuts</title></analytic>
            <monogr>
              <title level="m">Handbook of Graphs</title>
              <author><persName><forename>Eve</forename><surname>Kay</surname></persName></author>
              <author><persName><forename>Tom</forename><surname>Roe</surname></persName></author>
            </monogr>
          </biblStruct>
          <biblStruct>
            <monogr><imprint><date when="1999"/></imprint></monogr>
          </biblStruct>
        </listBibl>
      </div>
    </back>
  </text>
</TEI>"#;

    #[test]
    fn test_extract_header_fields() {
        let doc = TeiExtractor::new().extract(SAMPLE);
        assert_eq!(doc.title, "Graph Methods for Citation Analysis");
        assert_eq!(doc.abstract_text, "We study citation graphs.They are large.");
        assert_eq!(doc.keywords, vec!["graphs", "citations"]);
        assert_eq!(doc.venue.as_deref(), Some("Journal of Graphs"));
    }

    #[test]
    fn test_extract_authors_with_missing_blocks() {
        let doc = TeiExtractor::new().extract(SAMPLE);
        assert_eq!(doc.authors.len(), 2);
        assert_eq!(
            doc.authors[0],
            ExtractedAuthor {
                forename: Some("Jane".to_string()),
                surname: Some("Smith".to_string()),
                email: Some("jane@uni.edu".to_string()),
                affiliation_name: Some("Example University".to_string()),
                affiliation_country: Some("Spain".to_string()),
            }
        );
        assert_eq!(doc.authors[1].forename, None);
        assert_eq!(doc.authors[1].surname.as_deref(), Some("Doe"));
        assert_eq!(doc.authors[1].affiliation_name, None);
    }

    #[test]
    fn test_acknowledgement_last_match_wins() {
        let doc = TeiExtractor::new().extract(SAMPLE);
        assert_eq!(doc.acknowledgement, "Funded by the Research Council.");
    }

    #[test]
    fn test_reference_title_and_venue_precedence() {
        let doc = TeiExtractor::new().extract(SAMPLE);
        assert_eq!(doc.references.len(), 3);

        let article = &doc.references[0];
        assert_eq!(article.title, "Deep Citation Networks");
        assert_eq!(article.venue.as_deref(), Some("Network Science"));
        assert_eq!(article.date.as_deref(), Some("2019"));
        assert_eq!(article.authors.len(), 1);
        assert_eq!(article.authors[0].surname.as_deref(), Some("Lee"));

        let book = &doc.references[1];
        assert_eq!(book.title, "A Book on Graphs");
        assert_eq!(book.venue, None);
        assert_eq!(book.date.as_deref(), Some("2001-05"));
        assert_eq!(book.authors[0].surname.as_deref(), Some("Ray"));
    }

    #[test]
    fn test_reference_authors_fall_back_to_monograph_independently_of_title() {
        let doc = TeiExtractor::new().extract(SAMPLE);

        let chapter = &doc.references[2];
        assert_eq!(chapter.title, "Chapter on Graph Cuts");
        assert_eq!(chapter.venue.as_deref(), Some("Handbook of Graphs"));
        assert_eq!(chapter.date, None);
        let surnames: Vec<_> = chapter.authors.iter().filter_map(|a| a.surname.as_deref()).collect();
        assert_eq!(surnames, vec!["Kay", "Roe"]);
    }

    #[test]
    fn test_unusable_input_yields_empty_document() {
        let doc = TeiExtractor::new().extract("not markup at all");
        assert_eq!(doc, ExtractedDocument::default());

        let doc = TeiExtractor::new().extract("<TEI><text><back/></text></TEI>");
        assert!(doc.title.is_empty());
        assert!(doc.authors.is_empty());
        assert!(doc.references.is_empty());
        assert!(doc.acknowledgement.is_empty());
    }
}
