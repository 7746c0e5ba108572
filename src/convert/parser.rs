use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::name::PrefixDeclaration;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted from an input document.
/// Bounds memory use on hostile feeds; real Atom documents stay in single digits.
const MAX_DEPTH: usize = 256;

/// Encodings a declaration may name. The input is already decoded text, so
/// any other label would describe bytes this document does not have.
const SUPPORTED_ENCODINGS: [&str; 4] = ["utf-8", "utf8", "us-ascii", "ascii"];

/// Errors that can occur while reading a feed document.
///
/// Only structurally invalid XML is an error. A document that is well-formed
/// but lacks the expected Atom elements parses fine and yields empty lookups.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The underlying XML reader rejected the input.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// An element was still open when the input ended.
    #[error("Unclosed element <{0}>")]
    UnclosedElement(String),

    /// An end tag did not match the innermost open element.
    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEnd { expected: String, found: String },

    /// The input contained no element at all.
    #[error("Document has no root element")]
    NoRootElement,

    /// A second top-level element or stray text followed the root.
    #[error("Content outside the root element")]
    ContentOutsideRoot,

    /// Text, an attribute value or a character reference resolves to a
    /// character XML 1.0 does not allow.
    #[error("Character U+{code:04X} at byte {position} is not allowed in XML")]
    InvalidCharacter { position: u64, code: u32 },

    /// Nesting exceeded the safety limit.
    #[error("Element nesting exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

#[derive(Debug)]
enum Child {
    Element(usize),
    Text(String),
}

#[derive(Debug)]
struct Node {
    /// Local name, namespace prefix stripped.
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<usize>,
    /// `xmlns:prefix` declarations made on this element.
    namespaces: Vec<(String, String)>,
    /// Prefixes this element's name and attributes refer to.
    prefixes: Vec<String>,
    /// Source offset just past the raw tag name, where declarations can be spliced in.
    name_end: usize,
    /// Byte range of the raw markup between the start and end tag.
    inner: std::ops::Range<usize>,
}

/// A parsed feed document: an arena of elements plus the source text they
/// were read from, so inner markup can be handed out verbatim.
#[derive(Debug)]
pub struct AtomDocument {
    source: String,
    nodes: Vec<Node>,
    root: usize,
}

/// Handle to one element of an [`AtomDocument`].
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a AtomDocument,
    id: usize,
}

/// One step of a child-combinator path such as `link[rel=self]`.
#[derive(Debug, PartialEq)]
struct Step<'p> {
    name: &'p str,
    predicate: Option<(&'p str, &'p str)>,
}

impl<'p> Step<'p> {
    fn parse(raw: &'p str) -> Self {
        let raw = raw.trim();
        let Some((name, rest)) = raw.split_once('[') else {
            return Step {
                name: raw,
                predicate: None,
            };
        };
        let predicate = rest
            .strip_suffix(']')
            .and_then(|body| body.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim(),
                    value.trim().trim_matches(|c| c == '"' || c == '\''),
                )
            });
        Step {
            name: name.trim(),
            predicate,
        }
    }

    fn matches(&self, node: &Node) -> bool {
        if node.name != self.name {
            return false;
        }
        match self.predicate {
            None => true,
            Some((key, value)) => node
                .attributes
                .iter()
                .any(|(k, v)| k == key && v == value),
        }
    }
}

fn parse_path(path: &str) -> Vec<Step<'_>> {
    path.split('>').map(Step::parse).collect()
}

impl AtomDocument {
    /// Parses `xml` into a navigable document.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the text is not well-formed XML. Atom
    /// schema constraints are not checked; a missing `feed` root only means
    /// every lookup comes back empty.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        // quick-xml (0.37) never expands <!ENTITY> declarations. Text and
        // attribute unescaping only resolves the five predefined entities
        // plus character references; anything else is rejected as malformed.
        // The reader skips a leading BOM when counting positions, so drop it
        // here to keep inner ranges aligned with `source`.
        let xml = xml.strip_prefix('\u{FEFF}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut nodes: Vec<Node> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut root: Option<usize> = None;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| ParseError::Xml {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(e) => {
                    let after_tag = reader.buffer_position() as usize;
                    let id = push_element(&mut nodes, &open, &mut root, &e, &reader, before)?;
                    nodes[id].inner = after_tag..after_tag;
                    open.push(id);
                    if open.len() > MAX_DEPTH {
                        return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                    }
                }
                Event::Empty(e) => {
                    push_element(&mut nodes, &open, &mut root, &e, &reader, before)?;
                }
                Event::End(e) => {
                    let found = local_name(e.local_name().as_ref())?;
                    let Some(id) = open.pop() else {
                        return Err(ParseError::MismatchedEnd {
                            expected: String::new(),
                            found,
                        });
                    };
                    if nodes[id].name != found {
                        return Err(ParseError::MismatchedEnd {
                            expected: nodes[id].name.clone(),
                            found,
                        });
                    }
                    // The end tag is the last "</" before the reader position.
                    let after_end = reader.buffer_position() as usize;
                    let end_start = xml[..after_end]
                        .rfind("</")
                        .unwrap_or(after_end)
                        .max(nodes[id].inner.start);
                    nodes[id].inner.end = end_start;
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|err| ParseError::Xml {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    check_chars(&text, before)?;
                    push_text(&mut nodes, &open, text.into_owned())?;
                }
                Event::CData(e) => {
                    let text = std::str::from_utf8(&e).map_err(|err| ParseError::Xml {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    check_chars(text, before)?;
                    push_text(&mut nodes, &open, text.to_owned())?;
                }
                Event::Decl(d) => {
                    check_declaration(&d).map_err(|message| ParseError::Xml {
                        position: before as u64,
                        message,
                    })?;
                }
                Event::Eof => break,
                // Comments, processing instructions and DOCTYPE carry
                // nothing the converter reads.
                _ => {}
            }
        }

        if let Some(&id) = open.last() {
            return Err(ParseError::UnclosedElement(nodes[id].name.clone()));
        }
        let root = root.ok_or(ParseError::NoRootElement)?;

        Ok(Self {
            source: xml.to_owned(),
            nodes,
            root,
        })
    }

    /// The document element.
    pub fn root(&self) -> ElementRef<'_> {
        ElementRef {
            doc: self,
            id: self.root,
        }
    }

    /// Text content of the first element matching `path`, e.g. `"feed > author > name"`.
    /// The first step must name the root element.
    pub fn extract_text(&self, path: &str) -> Option<String> {
        self.select(path).map(|el| el.text())
    }

    /// Inner markup of the first element matching `path`, as it appears in
    /// the source (see [`ElementRef::inner_markup`]).
    pub fn extract_inner(&self, path: &str) -> Option<String> {
        self.select(path).map(|el| el.inner_markup())
    }

    /// Unescaped value of `attribute` on the first element matching `path`.
    ///
    /// Only the first match is considered: if it lacks the attribute the
    /// result is `None` even when a later element carries it.
    pub fn extract_attribute(&self, path: &str, attribute: &str) -> Option<String> {
        self.select(path)
            .and_then(|el| el.attribute(attribute))
            .map(str::to_owned)
    }

    /// All `entry` children of the root `feed`, in document order.
    pub fn list_entries(&self) -> Vec<ElementRef<'_>> {
        let root = self.root();
        if root.name() != "feed" {
            tracing::debug!(root = %root.name(), "Document root is not <feed>, no entries");
            return Vec::new();
        }
        root.children().filter(|el| el.name() == "entry").collect()
    }

    fn select(&self, path: &str) -> Option<ElementRef<'_>> {
        let steps = parse_path(path);
        let (first, rest) = steps.split_first()?;
        if !first.matches(&self.nodes[self.root]) {
            return None;
        }
        self.root().find(rest)
    }
}

impl<'a> ElementRef<'a> {
    fn node(&self) -> &'a Node {
        &self.doc.nodes[self.id]
    }

    /// Local name of the element.
    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.node()
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated, unescaped text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.node().children {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Element(id) => ElementRef {
                    doc: self.doc,
                    id: *id,
                }
                .collect_text(out),
            }
        }
    }

    /// Inner markup, byte-for-byte from the source document.
    pub fn inner_xml(&self) -> &'a str {
        &self.doc.source[self.node().inner.clone()]
    }

    /// Inner markup that stands on its own outside this document.
    ///
    /// Identical to [`inner_xml`](Self::inner_xml) except that prefixes bound
    /// on an ancestor get their `xmlns:prefix` declaration repeated on the
    /// top-level elements of the fragment that use them.
    pub fn inner_markup(&self) -> String {
        let raw = self.inner_xml();
        let base = self.node().inner.start;

        let mut splices: Vec<(usize, String)> = Vec::new();
        for child in self.children() {
            let mut unbound = Vec::new();
            child.collect_unbound(&mut Vec::new(), &mut unbound);
            let declarations: String = unbound
                .into_iter()
                .filter_map(|prefix| {
                    let uri = self.lookup_namespace(prefix)?;
                    Some(format!(" xmlns:{}=\"{}\"", prefix, escape(uri)))
                })
                .collect();
            if !declarations.is_empty() {
                splices.push((child.node().name_end - base, declarations));
            }
        }
        if splices.is_empty() {
            return raw.to_owned();
        }

        let mut out = String::with_capacity(raw.len() + 64);
        let mut last = 0;
        for (at, declarations) in splices {
            out.push_str(&raw[last..at]);
            out.push_str(&declarations);
            last = at;
        }
        out.push_str(&raw[last..]);
        out
    }

    /// Prefixes used in this subtree that are not declared within it.
    fn collect_unbound(&self, scope: &mut Vec<&'a str>, unbound: &mut Vec<&'a str>) {
        let node = self.node();
        let depth = scope.len();
        scope.extend(node.namespaces.iter().map(|(prefix, _)| prefix.as_str()));
        for prefix in &node.prefixes {
            if !scope.contains(&prefix.as_str()) && !unbound.contains(&prefix.as_str()) {
                unbound.push(prefix.as_str());
            }
        }
        for child in self.children() {
            child.collect_unbound(scope, unbound);
        }
        scope.truncate(depth);
    }

    /// Namespace bound to `prefix` on this element or its nearest ancestor.
    fn lookup_namespace(&self, prefix: &str) -> Option<&'a str> {
        let mut current = Some(self.id);
        while let Some(id) = current {
            let node = &self.doc.nodes[id];
            if let Some((_, uri)) = node.namespaces.iter().find(|(p, _)| p == prefix) {
                return Some(uri.as_str());
            }
            current = node.parent;
        }
        None
    }

    /// Element children in document order.
    pub fn children(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let doc = self.doc;
        self.node().children.iter().filter_map(move |child| match child {
            Child::Element(id) => Some(ElementRef { doc, id: *id }),
            Child::Text(_) => None,
        })
    }

    /// Text of the first element matching `path`, relative to this element
    /// (`"author > name"` looks at `author` children).
    pub fn extract_text(&self, path: &str) -> Option<String> {
        self.find(&parse_path(path)).map(|el| el.text())
    }

    pub fn extract_inner(&self, path: &str) -> Option<String> {
        self.find(&parse_path(path)).map(|el| el.inner_markup())
    }

    pub fn extract_attribute(&self, path: &str, attribute: &str) -> Option<String> {
        self.find(&parse_path(path))
            .and_then(|el| el.attribute(attribute))
            .map(str::to_owned)
    }

    /// Depth-first search so the first match is the first in document order.
    fn find(&self, steps: &[Step<'_>]) -> Option<ElementRef<'a>> {
        let Some((step, rest)) = steps.split_first() else {
            return Some(*self);
        };
        self.children()
            .filter(|child| step.matches(child.node()))
            .find_map(|child| child.find(rest))
    }
}

fn local_name(raw: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| ParseError::Xml {
            position: 0,
            message: e.to_string(),
        })
}

/// Rejects a malformed `<?xml ...?>` declaration or one naming an encoding
/// other than UTF-8 or ASCII.
fn check_declaration(decl: &BytesDecl<'_>) -> Result<(), String> {
    let version = decl.version().map_err(|e| e.to_string())?;
    let valid_version = version
        .strip_prefix(b"1.")
        .is_some_and(|minor| !minor.is_empty() && minor.iter().all(u8::is_ascii_digit));
    if !valid_version {
        return Err(format!(
            "invalid XML version \"{}\"",
            String::from_utf8_lossy(&version)
        ));
    }

    if let Some(encoding) = decl.encoding() {
        let encoding = encoding.map_err(|e| e.to_string())?;
        let label = String::from_utf8_lossy(&encoding);
        // EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
        let well_formed = label.starts_with(|c: char| c.is_ascii_alphabetic())
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !well_formed {
            return Err(format!("malformed encoding name \"{label}\""));
        }
        if !SUPPORTED_ENCODINGS
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&label))
        {
            return Err(format!("unsupported encoding \"{label}\""));
        }
    }
    Ok(())
}

/// Whether `c` may appear in an XML 1.0 document.
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Checks resolved text, so character references like `&#x1;` are caught too.
fn check_chars(text: &str, position: usize) -> Result<(), ParseError> {
    match text.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(ParseError::InvalidCharacter {
            position: position as u64,
            code: c as u32,
        }),
        None => Ok(()),
    }
}

fn push_element(
    nodes: &mut Vec<Node>,
    open: &[usize],
    root: &mut Option<usize>,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    start: usize,
) -> Result<usize, ParseError> {
    let mut attributes = Vec::new();
    let mut namespaces = Vec::new();
    let mut prefixes = Vec::new();
    if let Some(prefix) = e.name().prefix() {
        prefixes.push(local_name(prefix.as_ref())?);
    }

    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Xml {
            position: start as u64,
            message: err.to_string(),
        })?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| ParseError::Xml {
                position: start as u64,
                message: err.to_string(),
            })?;
        check_chars(&value, start)?;

        match attr.key.as_namespace_binding() {
            Some(PrefixDeclaration::Named(prefix)) => {
                namespaces.push((local_name(prefix)?, value.into_owned()));
            }
            Some(PrefixDeclaration::Default) => {}
            None => {
                if let Some(prefix) = attr.key.prefix() {
                    let prefix = local_name(prefix.as_ref())?;
                    if prefix != "xml" && !prefixes.contains(&prefix) {
                        prefixes.push(prefix);
                    }
                }
                let key = local_name(attr.key.local_name().as_ref())?;
                attributes.push((key, value.into_owned()));
            }
        }
    }

    let id = nodes.len();
    nodes.push(Node {
        name: local_name(e.local_name().as_ref())?,
        attributes,
        children: Vec::new(),
        parent: open.last().copied(),
        namespaces,
        prefixes,
        name_end: start + 1 + e.name().as_ref().len(),
        inner: 0..0,
    });

    match open.last() {
        Some(&parent) => nodes[parent].children.push(Child::Element(id)),
        None if root.is_none() => *root = Some(id),
        None => return Err(ParseError::ContentOutsideRoot),
    }
    Ok(id)
}

fn push_text(nodes: &mut [Node], open: &[usize], text: String) -> Result<(), ParseError> {
    match open.last() {
        Some(&parent) => nodes[parent].children.push(Child::Text(text)),
        None if text.trim().is_empty() => {}
        None => return Err(ParseError::ContentOutsideRoot),
    }
    Ok(())
}
