//! RSS feed rendering.
//!
//! Built on demand from the current index, so the feed always reflects the
//! same snapshot the HTML views would show.

use crate::{
    config::SiteConfig,
    content::{ContentStore, Post},
};
use anyhow::{Result, anyhow};
use chrono::Utc;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder, validation::Validate};

/// Body characters used when a post has no meta description.
pub const SUMMARY_CHARS: usize = 200;

const GENERATOR: &str = "kubeblog";

/// Render the RSS 2.0 document for every post, newest first.
///
/// `host` is the request's `Host` header, used for absolute links when
/// `[base.url]` is not configured.
pub fn render_feed(store: &ContentStore, config: &SiteConfig, host: Option<&str>) -> Result<String> {
    let base = base_url(config, host);
    let items: Vec<_> = store
        .list_posts()
        .iter()
        .map(|post| post_to_item(post, &base))
        .collect();

    let channel = ChannelBuilder::default()
        .title(&config.base.title)
        .link(base.clone())
        .description(format!("{} - {}", config.base.title, config.base.description))
        .language(config.base.language.clone())
        .last_build_date(Utc::now().to_rfc2822())
        .generator(GENERATOR.to_string())
        .items(items)
        .build();

    channel
        .validate()
        .map_err(|e| anyhow!("rss validation failed: {e}"))?;
    Ok(channel.to_string())
}

/// Absolute site root without a trailing slash.
fn base_url(config: &SiteConfig, host: Option<&str>) -> String {
    match (&config.base.url, host) {
        (Some(url), _) => url.trim_end_matches('/').to_string(),
        (None, Some(host)) if !host.is_empty() => format!("http://{host}"),
        (None, _) => "http://localhost".to_string(),
    }
}

fn post_to_item(post: &Post, base: &str) -> rss::Item {
    let link = format!("{base}/post/{}", urlencoding::encode(&post.id));
    let categories: Vec<_> = post
        .tags
        .iter()
        .map(|tag| CategoryBuilder::default().name(tag.as_str()).build())
        .collect();
    let author = (!post.author.is_empty()).then(|| post.author.clone());

    ItemBuilder::default()
        .title(post.title.clone())
        .link(link.clone())
        .guid(GuidBuilder::default().permalink(true).value(link).build())
        .description(post.summary(SUMMARY_CHARS))
        .pub_date(post.authored_date.to_rfc2822())
        .author(author)
        .categories(categories)
        .build()
}
