use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use super::FeedItem;
use super::FeedParser;

/// RSS 2.0 `<item>` entries keyed by a numeric `<guid>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RssFeedParser;

struct RssPatterns {
    item: Regex,
    title: Regex,
    link: Regex,
    pub_date: Regex,
    guid: Regex,
    creator: Regex,
}

impl RssPatterns {
    fn compile() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            item: Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>")?,
            title: element("title")?,
            link: element("link")?,
            pub_date: element("pubDate")?,
            guid: element("guid")?,
            creator: element("dc:creator")?,
        })
    }
}

fn element(name: &str) -> Result<Regex, regex_lite::Error> {
    Regex::new(&format!(r"(?s)<{name}\b[^>]*>(.*?)</{name}>"))
}

fn patterns() -> Option<&'static RssPatterns> {
    static PATTERNS: OnceLock<Option<RssPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match RssPatterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(err) => {
                warn!(error = %err, "failed to compile rss patterns");
                None
            }
        })
        .as_ref()
}

impl FeedParser for RssFeedParser {
    fn parse(&self, raw: &str) -> Vec<FeedItem> {
        let Some(patterns) = patterns() else {
            return Vec::new();
        };
        let prelude = match raw.find("<item") {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let forum = capture(&patterns.title, prelude);

        let mut items = Vec::new();
        for block in patterns.item.captures_iter(raw) {
            let Some(body) = block.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let guid = capture(&patterns.guid, body);
            let Some(sequence) = guid.as_deref().and_then(|g| g.parse::<u64>().ok()) else {
                debug!(?guid, "skipping feed item without a numeric guid");
                continue;
            };
            items.push(FeedItem {
                sequence,
                title: capture(&patterns.title, body).unwrap_or_default(),
                link: capture(&patterns.link, body).unwrap_or_default(),
                published: capture(&patterns.pub_date, body),
                creator: capture(&patterns.creator, body),
                forum: forum.clone(),
            });
        }
        items
    }
}

fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| clean_text(m.as_str()))
}

fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"));
    match inner {
        Some(cdata) => cdata.trim().to_string(),
        None => decode_entities(trimmed),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// JSON array of items, or an object with an `items` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFeedParser;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonFeed {
    Items(Vec<FeedItem>),
    Wrapped { items: Vec<FeedItem> },
}

impl FeedParser for JsonFeedParser {
    fn parse(&self, raw: &str) -> Vec<FeedItem> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<JsonFeed>(raw) {
            Ok(JsonFeed::Items(items)) | Ok(JsonFeed::Wrapped { items }) => items,
            Err(err) => {
                warn!(error = %err, "failed to parse json feed");
                Vec::new()
            }
        }
    }
}
