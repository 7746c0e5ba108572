//! Integration tests for the Atom to RSS conversion pipeline.
//!
//! These run the public `convert` entry point end-to-end and check the
//! resulting documents structurally by reading them back with the same
//! element lookups the converter uses.

use atom2rss::convert::{convert, AtomDocument, ConvertError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

const FULL_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <description>Notes &amp; essays</description>
  <updated>2024-01-05T10:00:00Z</updated>
  <link href="https://example.com/"/>
  <link rel="self" href="https://example.com/atom.xml"/>
  <author><name>Jane Doe</name></author>
  <entry>
    <title>First post</title>
    <link href="https://example.com/first"/>
    <author><name>Jane Doe</name></author>
    <published>2024-01-02T15:04:05Z</published>
    <content type="html">&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Second post</title>
    <link href="https://example.com/second"/>
    <published>sometime last week</published>
  </entry>
  <entry>
    <title>Third post</title>
  </entry>
</feed>"#;

fn rss_doc(rss: &str) -> AtomDocument {
    AtomDocument::parse(rss).expect("converter output must be well-formed XML")
}

fn item_field(doc: &AtomDocument, index: usize, field: &str) -> Option<String> {
    doc.root()
        .children()
        .find(|c| c.name() == "channel")?
        .children()
        .filter(|c| c.name() == "item")
        .nth(index)?
        .extract_inner(field)
}

fn item_count(doc: &AtomDocument) -> usize {
    doc.root()
        .children()
        .find(|c| c.name() == "channel")
        .map(|ch| ch.children().filter(|c| c.name() == "item").count())
        .unwrap_or(0)
}

// ============================================================================
// Channel mapping
// ============================================================================

#[test]
fn test_channel_fields() {
    let doc = rss_doc(&convert(FULL_FEED).unwrap());

    assert_eq!(doc.root().name(), "rss");
    assert_eq!(doc.root().attribute("version"), Some("2.0"));
    assert_eq!(
        doc.extract_inner("rss > channel > title").as_deref(),
        Some("Example Blog")
    );
    assert_eq!(
        doc.extract_inner("rss > channel > description").as_deref(),
        Some("Notes &amp; essays")
    );
    assert_eq!(
        doc.extract_inner("rss > channel > pubDate").as_deref(),
        Some("2024-01-05T10:00:00Z")
    );
    assert_eq!(
        doc.extract_text("rss > channel > link").as_deref(),
        Some("https://example.com/atom.xml")
    );
    assert_eq!(
        doc.extract_text("rss > channel > author").as_deref(),
        Some("Jane Doe")
    );
}

#[test]
fn test_namespaces_always_declared() {
    let rss = convert("<feed/>").unwrap();
    assert!(rss.contains(r#"xmlns:media="http://search.yahoo.com/mrss/""#));
    assert!(rss.contains(r#"xmlns:atom="http://www.w3.org/2005/Atom""#));
    assert!(rss.contains(r#"xmlns:dc="http://purl.org/dc/elements/1.1/""#));
}

#[test]
fn test_only_non_self_link_used() {
    let rss = convert(r#"<feed><link rel="alternate" href="https://example.com/"/></feed>"#).unwrap();
    let doc = rss_doc(&rss);
    assert_eq!(
        doc.extract_text("rss > channel > link").as_deref(),
        Some("https://example.com/")
    );
}

#[test]
fn test_channel_field_order() {
    let rss = convert(FULL_FEED).unwrap();
    let doc = rss_doc(&rss);
    let channel = doc.root().children().next().unwrap();
    let names: Vec<_> = channel.children().map(|c| c.name()).collect();
    assert_eq!(
        names,
        vec!["title", "description", "pubDate", "link", "author", "item", "item", "item"]
    );

    let item = channel.children().nth(5).unwrap();
    let item_names: Vec<_> = item.children().map(|c| c.name()).collect();
    assert_eq!(item_names, vec!["title", "link", "creator", "pubDate", "description"]);
    assert!(rss.contains("<dc:creator>Jane Doe</dc:creator>"));
}

// ============================================================================
// Item mapping
// ============================================================================

#[test]
fn test_item_fields() {
    let doc = rss_doc(&convert(FULL_FEED).unwrap());

    assert_eq!(item_field(&doc, 0, "title").as_deref(), Some("First post"));
    assert_eq!(
        item_field(&doc, 0, "link").as_deref(),
        Some("https://example.com/first")
    );
    assert_eq!(item_field(&doc, 0, "creator").as_deref(), Some("Jane Doe"));
    assert_eq!(
        item_field(&doc, 0, "pubDate").as_deref(),
        Some("Tue, Jan 02, 2024, 03:04:05 PM GMT")
    );
}

#[test]
fn test_content_copied_verbatim() {
    let doc = rss_doc(&convert(FULL_FEED).unwrap());
    assert_eq!(
        item_field(&doc, 0, "description").as_deref(),
        Some("&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;")
    );
}

#[test]
fn test_missing_fields_present_and_empty() {
    let doc = rss_doc(&convert(FULL_FEED).unwrap());

    // Unparseable date
    assert_eq!(item_field(&doc, 1, "pubDate").as_deref(), Some(""));
    // No author, no content
    assert_eq!(item_field(&doc, 1, "creator").as_deref(), Some(""));
    assert_eq!(item_field(&doc, 1, "description").as_deref(), Some(""));
    // Nothing but a title
    for field in ["link", "creator", "pubDate", "description"] {
        assert_eq!(item_field(&doc, 2, field).as_deref(), Some(""), "{field}");
    }
}

#[test]
fn test_empty_feed_has_all_channel_fields() {
    let doc = rss_doc(&convert("<feed></feed>").unwrap());
    for field in ["title", "description", "pubDate", "link", "author"] {
        assert_eq!(
            doc.extract_inner(&format!("rss > channel > {field}")).as_deref(),
            Some(""),
            "{field}"
        );
    }
    assert_eq!(item_count(&doc), 0);
}

#[test]
fn test_xhtml_content_kept_as_markup() {
    let rss = convert(
        r#"<feed><entry><content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Hi <em>there</em></p></div></content></entry></feed>"#,
    )
    .unwrap();
    assert!(rss.contains(
        r#"<description><div xmlns="http://www.w3.org/1999/xhtml"><p>Hi <em>there</em></p></div></description>"#
    ));
    assert_eq!(item_count(&rss_doc(&rss)), 1);
}

#[test]
fn test_ancestor_prefixes_stay_bound_in_output() {
    let rss = convert(
        r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:xhtml="http://www.w3.org/1999/xhtml"><entry><content type="xhtml"><xhtml:div>Hi <xhtml:b>there</xhtml:b></xhtml:div></content></entry></feed>"#,
    )
    .unwrap();
    assert!(rss.contains(
        r#"<description><xhtml:div xmlns:xhtml="http://www.w3.org/1999/xhtml">Hi <xhtml:b>there</xhtml:b></xhtml:div></description>"#
    ));

    let mut reader = NsReader::from_str(&rss);
    loop {
        match reader.read_resolved_event().unwrap() {
            (ResolveResult::Unknown(prefix), _) => {
                panic!("unbound prefix {}", String::from_utf8_lossy(&prefix))
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }
}

#[test]
fn test_bom_prefixed_feed_converts_cleanly() {
    let rss = convert(
        "\u{FEFF}<feed><title>T\u{e9}st</title><entry><content>Body</content></entry></feed>",
    )
    .unwrap();
    assert!(rss.contains("<title>T\u{e9}st</title>"));
    assert!(rss.contains("<description>Body</description>"));
}

// ============================================================================
// Failures and determinism
// ============================================================================

#[test]
fn test_unclosed_tag_fails_with_parse_error() {
    let result = convert("<feed><entry><title>Unclosed</entry></feed>");
    assert!(matches!(result, Err(ConvertError::Parse(_))));

    let result = convert("<feed><title>Truncated");
    assert!(matches!(result, Err(ConvertError::Parse(_))));
}

#[test]
fn test_forbidden_character_reference_fails() {
    let result = convert("<feed><entry><content>&#x1;</content></entry></feed>");
    assert!(matches!(result, Err(ConvertError::Parse(_))));
}

#[test]
fn test_broken_declaration_fails() {
    let result = convert(r#"<?xml version="1.0" encoding="no-such-charset"?><feed/>"#);
    assert!(matches!(result, Err(ConvertError::Parse(_))));
}

#[test]
fn test_conversion_is_idempotent() {
    let first = convert(FULL_FEED).unwrap();
    let second = convert(FULL_FEED).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Properties
// ============================================================================

fn entry_title() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{0,20}"
}

fn feed_with_titles(titles: &[String]) -> String {
    let mut xml = String::from(r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>P</title>"#);
    for title in titles {
        xml.push_str("<entry><title>");
        xml.push_str(title);
        xml.push_str("</title></entry>");
    }
    xml.push_str("</feed>");
    xml
}

proptest! {
    #[test]
    fn prop_items_match_entries_in_order(titles in prop::collection::vec(entry_title(), 0..12)) {
        let rss = convert(&feed_with_titles(&titles)).unwrap();
        let doc = rss_doc(&rss);

        prop_assert_eq!(item_count(&doc), titles.len());
        for (i, title) in titles.iter().enumerate() {
            let field = item_field(&doc, i, "title");
            prop_assert_eq!(field.as_deref(), Some(title.as_str()));
        }
    }

    #[test]
    fn prop_conversion_deterministic(titles in prop::collection::vec(entry_title(), 0..6)) {
        let xml = feed_with_titles(&titles);
        prop_assert_eq!(convert(&xml).unwrap(), convert(&xml).unwrap());
    }

    #[test]
    fn prop_valid_timestamps_always_format(secs in 0i64..4_102_444_800) {
        let dt = chrono::DateTime::from_timestamp(secs, 0).unwrap();
        let xml = format!(
            "<feed><entry><published>{}</published></entry></feed>",
            dt.to_rfc3339()
        );
        let doc = rss_doc(&convert(&xml).unwrap());
        let pub_date = item_field(&doc, 0, "pubDate").unwrap();
        prop_assert!(pub_date.ends_with(" GMT"));
        prop_assert!(pub_date.contains(&dt.format("%Y").to_string()));
    }
}
