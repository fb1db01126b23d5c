//! RSS and Atom feed source.
//!
//! Fetches over HTTP with a blocking [`reqwest`] client and parses with the
//! [`rss`] crate (RSS 0.9x, 1.0 and 2.0). A document whose root is not an
//! RSS element is retried as Atom with [`atom_syndication`]. Parsing is split
//! out into [`RssSource::parse`] and friends so it can be tested without the
//! network.

use std::collections::BTreeMap;

use atom_syndication::Feed;
use chrono::Utc;
use reqwest::blocking::Client;
use tracing::debug;

use super::{FeedEntry, FeedSource};
use crate::error::Result;
use crate::timestamp::parse_feed_date;

/// An RSS or Atom feed source.
#[derive(Debug, Clone, Default)]
pub struct RssSource {
    client: Client,
}

impl RssSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxy, timeouts, user agent, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Parse an already-fetched [`rss::Channel`] into [`FeedEntry`]s.
    ///
    /// Entries keep the channel's order (conventionally newest first).
    pub fn parse_channel(channel: &rss::Channel) -> Vec<FeedEntry> {
        channel.items().iter().map(parse_item).collect()
    }

    /// Parse an already-fetched Atom [`Feed`] into [`FeedEntry`]s.
    pub fn parse_atom(feed: &Feed) -> Vec<FeedEntry> {
        feed.entries().iter().map(parse_atom_entry).collect()
    }

    /// Parse a raw feed document, RSS first and Atom when the root element
    /// is not RSS.
    pub fn parse(body: &[u8]) -> Result<Vec<FeedEntry>> {
        match rss::Channel::read_from(body) {
            Ok(channel) => Ok(Self::parse_channel(&channel)),
            Err(rss::Error::InvalidStartTag) => {
                debug!("Not an RSS document, trying Atom");
                let feed = Feed::read_from(body)?;
                Ok(Self::parse_atom(&feed))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl FeedSource for RssSource {
    fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let body = self.client.get(url).send()?.error_for_status()?.bytes()?;
        Self::parse(body.as_ref())
    }
}

fn parse_item(item: &rss::Item) -> FeedEntry {
    // Prefer <guid>, fall back to <link>, then empty string.
    let id = item
        .guid()
        .map(|g| g.value().to_string())
        .or_else(|| item.link().map(String::from))
        .unwrap_or_default();

    let dublin_core = item.dublin_core_ext();

    let mut fields = BTreeMap::new();
    if let Some(comments) = item.comments() {
        fields.insert("comments".to_string(), comments.to_string());
    }
    if let Some(source) = item.source() {
        fields.insert("source_url".to_string(), source.url().to_string());
        if let Some(title) = source.title() {
            fields.insert("source".to_string(), title.to_string());
        }
    }
    if let Some(enclosure) = item.enclosure() {
        fields.insert("enclosure_url".to_string(), enclosure.url().to_string());
        fields.insert("enclosure_type".to_string(), enclosure.mime_type().to_string());
    }
    if let Some(dc) = dublin_core {
        if !dc.creators().is_empty() {
            fields.insert("dc:creator".to_string(), dc.creators().join(", "));
        }
    }
    for (prefix, elements) in item.extensions() {
        for (name, values) in elements {
            if let Some(value) = values.first().and_then(|ext| ext.value()) {
                fields.insert(format!("{prefix}:{name}"), value.to_string());
            }
        }
    }

    // <pubDate> first, then <dc:date>. Unparseable dates degrade to None.
    let published = item
        .pub_date()
        .and_then(parse_feed_date)
        .or_else(|| {
            dublin_core
                .and_then(|dc| dc.dates().first())
                .and_then(|d| parse_feed_date(d))
        })
        .or_else(|| fields.get("dc:date").and_then(|d| parse_feed_date(d)));

    FeedEntry {
        id,
        title: item.title().map(String::from),
        link: item.link().map(String::from),
        description: item.description().map(String::from),
        author: item.author().map(String::from),
        categories: item
            .categories()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        published,
        fields,
    }
}

fn parse_atom_entry(entry: &atom_syndication::Entry) -> FeedEntry {
    let alternate = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().to_string());

    let id = if entry.id().is_empty() {
        alternate.clone().unwrap_or_default()
    } else {
        entry.id().to_string()
    };

    let mut fields = BTreeMap::new();
    fields.insert("updated".to_string(), entry.updated().to_rfc3339());
    if let Some(rights) = entry.rights() {
        fields.insert("rights".to_string(), rights.value.clone());
    }
    if let Some(title) = entry.source().map(|s| s.title()) {
        fields.insert("source".to_string(), title.value.clone());
    }
    for link in entry.links().iter().filter(|l| l.rel() != "alternate") {
        fields.insert(format!("link:{}", link.rel()), link.href().to_string());
    }
    for (prefix, elements) in entry.extensions() {
        for (name, values) in elements {
            if let Some(value) = values.first().and_then(|ext| ext.value()) {
                fields.insert(format!("{prefix}:{name}"), value.to_string());
            }
        }
    }

    // <published> first, then <updated>, which every Atom entry carries.
    let published = entry
        .published()
        .unwrap_or_else(|| entry.updated())
        .with_timezone(&Utc);

    let title = &entry.title().value;
    FeedEntry {
        id,
        title: (!title.is_empty()).then(|| title.clone()),
        link: alternate,
        description: entry
            .summary()
            .map(|s| s.value.clone())
            .or_else(|| entry.content().and_then(|c| c.value()).map(String::from)),
        author: entry.authors().first().map(|a| a.name().to_string()),
        categories: entry
            .categories()
            .iter()
            .map(|c| c.term().to_string())
            .collect(),
        published: Some(published),
        fields,
    }
}
