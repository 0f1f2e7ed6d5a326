use crate::types::FeedItem;
use feed_rs::parser;
use rss::Channel;
use tracing::debug;

/// Parses a feed document into its items.
///
/// RSS 2.0 is read with the `rss` crate so that each item's `pubDate` keeps
/// its original text. Anything else (Atom, RSS 1.0) goes through `feed-rs`,
/// whose already-parsed dates are rendered back as RFC 3339. Items without a
/// link are dropped.
pub fn parse_feed_document(content: &[u8]) -> Result<Vec<FeedItem>, String> {
    debug!("Parsing feed content ({} bytes)", content.len());

    match Channel::read_from(content) {
        Ok(channel) => Ok(items_from_channel(&channel)),
        Err(rss_err) => match parser::parse(content) {
            Ok(feed) => Ok(items_from_feed_rs(feed)),
            Err(e) => Err(format!("not an RSS document ({}) nor Atom ({})", rss_err, e)),
        },
    }
}

fn items_from_channel(channel: &Channel) -> Vec<FeedItem> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = item.link()?.trim();
            if link.is_empty() {
                return None;
            }

            Some(FeedItem {
                title: item.title().unwrap_or_default().to_string(),
                link: link.to_string(),
                description: item.description().map(|s| s.to_string()),
                pub_date: item.pub_date().map(|s| s.to_string()),
            })
        })
        .collect()
}

fn items_from_feed_rs(feed: feed_rs::model::Feed) -> Vec<FeedItem> {
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry_link(&entry.links)?;

            Some(FeedItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link,
                description: entry.summary.map(|s| s.content),
                pub_date: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
            })
        })
        .collect()
}

/// The entry's page: a `rel="alternate"` link, or one without a `rel`.
fn entry_link(links: &[feed_rs::model::Link]) -> Option<String> {
    links
        .iter()
        .filter(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .map(|link| link.href.trim())
        .find(|href| !href.is_empty())
        .map(str::to_string)
}
