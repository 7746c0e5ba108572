use quick_xml::escape::escape;

use super::date::format_pub_date;
use super::parser::{AtomDocument, ElementRef};

/// Feed-level metadata of the RSS output.
///
/// Every field holds XML-ready content: element text is carried over as the
/// source's inner markup, attribute-derived values are escaped on the way in.
/// Missing source data is an empty string, never omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssChannel {
    pub title: String,
    pub description: String,
    pub pub_date: String,
    pub link: String,
    pub author: String,
    pub items: Vec<RssItem>,
}

/// One RSS `<item>`, built from one Atom `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub creator: String,
    pub pub_date: String,
    pub description: String,
}

/// Maps a parsed Atom document onto the RSS value model.
///
/// | RSS            | Atom                                                   |
/// |----------------|--------------------------------------------------------|
/// | `title`        | `feed > title`                                         |
/// | `description`  | `feed > description`                                   |
/// | `pubDate`      | `feed > updated`, copied as-is                         |
/// | `link`         | `feed > link[rel=self]/@href`, else `feed > link/@href` |
/// | `author`       | `feed > author > name`                                 |
pub fn build_channel(doc: &AtomDocument) -> RssChannel {
    let link = doc
        .extract_attribute("feed > link[rel=self]", "href")
        .filter(|href| !href.is_empty())
        .or_else(|| doc.extract_attribute("feed > link", "href"))
        .map(|href| escape(href.as_str()).into_owned())
        .unwrap_or_default();

    let items: Vec<RssItem> = doc.list_entries().into_iter().map(build_item).collect();
    tracing::debug!(items = items.len(), "Mapped Atom entries to RSS items");

    RssChannel {
        title: doc.extract_inner("feed > title").unwrap_or_default(),
        description: doc.extract_inner("feed > description").unwrap_or_default(),
        pub_date: doc.extract_inner("feed > updated").unwrap_or_default(),
        link,
        author: doc.extract_inner("feed > author > name").unwrap_or_default(),
        items,
    }
}

fn build_item(entry: ElementRef<'_>) -> RssItem {
    let published = entry.extract_text("published");
    let pub_date = format_pub_date(published.as_deref());

    RssItem {
        title: entry.extract_inner("title").unwrap_or_default(),
        link: entry
            .extract_attribute("link", "href")
            .map(|href| escape(href.as_str()).into_owned())
            .unwrap_or_default(),
        creator: entry.extract_inner("author > name").unwrap_or_default(),
        pub_date,
        description: entry.extract_inner("content").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn channel(xml: &str) -> RssChannel {
        build_channel(&AtomDocument::parse(xml).unwrap())
    }

    #[test]
    fn test_full_mapping() {
        let ch = channel(
            r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blog</title>
  <description>About things</description>
  <updated>2024-01-05T00:00:00Z</updated>
  <link rel="self" href="https://example.com/atom.xml"/>
  <author><name>Jane</name></author>
  <entry>
    <title>Post</title>
    <link href="https://example.com/post?a=1&amp;b=2"/>
    <author><name>Joe</name></author>
    <published>2024-01-02T15:04:05Z</published>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
  </entry>
</feed>"#,
        );

        assert_eq!(
            ch,
            RssChannel {
                title: "Blog".into(),
                description: "About things".into(),
                pub_date: "2024-01-05T00:00:00Z".into(),
                link: "https://example.com/atom.xml".into(),
                author: "Jane".into(),
                items: vec![RssItem {
                    title: "Post".into(),
                    link: "https://example.com/post?a=1&amp;b=2".into(),
                    creator: "Joe".into(),
                    pub_date: "Tue, Jan 02, 2024, 03:04:05 PM GMT".into(),
                    description: "&lt;p&gt;Body&lt;/p&gt;".into(),
                }],
            }
        );
    }

    #[test]
    fn test_self_link_preferred() {
        let ch = channel(
            r#"<feed><link href="https://example.com/"/><link rel="self" href="https://example.com/feed"/></feed>"#,
        );
        assert_eq!(ch.link, "https://example.com/feed");
    }

    #[test]
    fn test_first_link_fallback() {
        let ch = channel(
            r#"<feed><link rel="alternate" href="https://example.com/"/><link href="https://other.example.com/"/></feed>"#,
        );
        assert_eq!(ch.link, "https://example.com/");
    }

    #[test]
    fn test_hrefless_self_link_is_also_first_link() {
        let ch = channel(r#"<feed><link rel="self"/><link href="https://example.com/"/></feed>"#);
        // The first generic link is the hrefless self link itself.
        assert_eq!(ch.link, "");
    }

    #[test]
    fn test_empty_self_href_falls_back() {
        let ch = channel(
            r#"<feed><link href="https://example.com/"/><link rel="self" href=""/></feed>"#,
        );
        assert_eq!(ch.link, "https://example.com/");
    }

    #[test]
    fn test_bom_prefixed_feed_maps_cleanly() {
        let ch = channel(
            "\u{FEFF}<feed><title>Hello</title><entry><content>Body</content></entry></feed>",
        );
        assert_eq!(ch.title, "Hello");
        assert_eq!(ch.items[0].description, "Body");
    }

    #[test]
    fn test_empty_feed_defaults() {
        let ch = channel("<feed/>");
        assert_eq!(ch, RssChannel::default());
    }

    #[test]
    fn test_empty_entry_defaults() {
        let ch = channel("<feed><entry/><entry></entry></feed>");
        assert_eq!(ch.items, vec![RssItem::default(), RssItem::default()]);
    }

    #[test]
    fn test_unparseable_published_is_empty() {
        let ch = channel("<feed><entry><published>not a date</published></entry></feed>");
        assert_eq!(ch.items[0].pub_date, "");
    }

    #[test]
    fn test_non_feed_root_maps_nothing() {
        let ch = channel("<rss><channel><title>RSS</title></channel></rss>");
        assert_eq!(ch, RssChannel::default());
    }
}
