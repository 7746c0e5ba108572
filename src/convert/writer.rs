use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use thiserror::Error;

use super::builder::{RssChannel, RssItem};
use super::parser::is_xml_char;

const NS_MEDIA: &str = "http://search.yahoo.com/mrss/";
const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";

/// Errors that can occur while serializing an RSS document.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The XML writer failed.
    #[error("Failed to write RSS document: {0}")]
    Write(String),

    /// A field holds a character XML 1.0 cannot represent.
    #[error("Field `{field}` contains a character not allowed in XML: U+{code:04X}")]
    InvalidCharacter { field: &'static str, code: u32 },
}

/// Serializes a finished channel as an indented RSS 2.0 document.
///
/// Field contents are written as-is: they are already XML fragments (see
/// [`RssChannel`]), so nothing is re-escaped.
pub fn write_rss(channel: &RssChannel, indent: usize) -> Result<String, SerializationError> {
    let mut w = RssWriter::new(indent);

    w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("xmlns:media", NS_MEDIA));
    rss.push_attribute(("xmlns:atom", NS_ATOM));
    rss.push_attribute(("xmlns:dc", NS_DC));
    rss.push_attribute(("version", "2.0"));
    w.event(Event::Start(rss))?;
    w.event(Event::Start(BytesStart::new("channel")))?;

    w.field("title", &channel.title)?;
    w.field("description", &channel.description)?;
    w.field("pubDate", &channel.pub_date)?;
    w.field("link", &channel.link)?;
    w.field("author", &channel.author)?;

    for item in &channel.items {
        w.item(item)?;
    }

    w.event(Event::End(BytesEnd::new("channel")))?;
    w.event(Event::End(BytesEnd::new("rss")))?;

    let bytes = w.inner.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| SerializationError::Write(e.to_string()))
}

struct RssWriter {
    inner: Writer<Cursor<Vec<u8>>>,
}

impl RssWriter {
    fn new(indent: usize) -> Self {
        Self {
            inner: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', indent),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), SerializationError> {
        self.inner
            .write_event(event)
            .map_err(|e| SerializationError::Write(e.to_string()))
    }

    /// Writes `<name>content</name>` on one line. An empty text event keeps
    /// empty fields as `<name></name>` rather than splitting the tags.
    fn field(&mut self, name: &'static str, content: &str) -> Result<(), SerializationError> {
        check_chars(name, content)?;
        self.event(Event::Start(BytesStart::new(name)))?;
        self.event(Event::Text(BytesText::from_escaped(content)))?;
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn item(&mut self, item: &RssItem) -> Result<(), SerializationError> {
        self.event(Event::Start(BytesStart::new("item")))?;
        self.field("title", &item.title)?;
        self.field("link", &item.link)?;
        self.field("dc:creator", &item.creator)?;
        self.field("pubDate", &item.pub_date)?;
        self.field("description", &item.description)?;
        self.event(Event::End(BytesEnd::new("item")))
    }
}

fn check_chars(field: &'static str, content: &str) -> Result<(), SerializationError> {
    match content.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(SerializationError::InvalidCharacter {
            field,
            code: c as u32,
        }),
        None => Ok(()),
    }
}
