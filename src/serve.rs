//! HTTP front end over the content index.
//!
//! Built on `tiny_http`. Every request reads a fresh snapshot from the
//! [`ContentStore`]; nothing is cached between requests, so content changes
//! show up on the next page load.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Sync Controller │     │ Unblocker Thread │
//! │  (HTTP Server)  │     │  (watch workers) │     │ (Shutdown::wait) │
//! └────────┬────────┘     └────────┬─────────┘     └────────┬─────────┘
//!          │ reads                 │ writes                 │
//!          ▼                       ▼                        ▼
//!     ┌───────────────────────────────┐            server.unblock()
//!     │          ContentStore         │
//!     └───────────────────────────────┘
//! ```

use crate::{
    config::{SiteConfig, cfg},
    content::{ContentStore, Page, Post},
    feed::{SUMMARY_CHARS, render_feed},
    log,
    sync::{Shutdown, StateHandle},
};
use anyhow::{Context, Result, anyhow};
use quick_xml::escape::escape;
use std::{
    borrow::Cow,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    thread,
};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

// ============================================================================
// Constants - HTML Templates
// ============================================================================

/// Page skeleton with header, page navigation and sidebar (embedded at compile time)
const LAYOUT_TEMPLATE: &str = include_str!("embed/layout.html");

const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";
const RSS: &str = "application/rss+xml; charset=utf-8";

// ============================================================================
// Server Entry Point
// ============================================================================

/// Read-only handles the request handlers need.
#[derive(Clone)]
pub struct Site {
    pub store: Arc<ContentStore>,
    pub state: StateHandle,
}

/// Bind the configured address and serve until `shutdown` fires.
///
/// Requests are handled on the calling thread. A helper thread waits on
/// `shutdown` and unblocks the accept loop.
pub fn serve_site(site: Site, shutdown: &Shutdown) -> Result<()> {
    let c = cfg();
    let interface: IpAddr = c
        .serve
        .interface
        .parse()
        .with_context(|| format!("invalid [serve.interface] `{}`", c.serve.interface))?;
    let addr = SocketAddr::new(interface, c.serve.port);

    let server = Server::http(addr).map_err(|e| anyhow!("Failed to bind {addr}: {e}"))?;
    let server = Arc::new(server);

    {
        let server = Arc::clone(&server);
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("serve-unblock".into())
            .spawn(move || {
                shutdown.wait();
                server.unblock();
            })
            .context("Failed to spawn server unblock thread")?;
    }

    log!("serve"; "http://{}", addr);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &site, &cfg()) {
            log!("serve"; "request error: {e}");
        }
    }

    log!("serve"; "stopped");
    Ok(())
}

// ============================================================================
// Request Handling
// ============================================================================

/// A rendered response, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    status: u16,
    content_type: &'static str,
    body: String,
    location: Option<&'static str>,
}

impl Reply {
    fn ok(content_type: &'static str, body: String) -> Self {
        Self::with_status(200, content_type, body)
    }

    fn with_status(status: u16, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type,
            body,
            location: None,
        }
    }

    fn not_found() -> Self {
        Self::with_status(404, TEXT, "404 Not Found".into())
    }

    fn redirect_home() -> Self {
        Self {
            status: 302,
            content_type: TEXT,
            body: String::new(),
            location: Some("/"),
        }
    }
}

fn handle_request(request: Request, site: &Site, config: &SiteConfig) -> Result<()> {
    let host = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Host"))
        .map(|h| h.value.as_str().to_owned());

    let reply = route(request.method(), request.url(), host.as_deref(), site, config);
    respond(request, reply)
}

/// Resolve a request to a reply.
///
/// | Path          | Reply                                      |
/// |---------------|--------------------------------------------|
/// | `/`           | all posts                                  |
/// | `/tag/<t>`    | posts tagged `t`                           |
/// | `/author/<a>` | posts by `a`                               |
/// | `/post/<id>`  | single post                                |
/// | `/page/<id>`  | single page                                |
/// | `/rss.xml`    | feed                                       |
/// | `/healthz`    | liveness                                   |
/// | `/readyz`     | readiness, 503 until the first full sync   |
fn route(method: &Method, url: &str, host: Option<&str>, site: &Site, config: &SiteConfig) -> Reply {
    if !matches!(method, Method::Get | Method::Head) {
        return Reply::with_status(405, TEXT, "405 Method Not Allowed".into());
    }

    // Strip query string before resolving path
    let path = url.split('?').next().unwrap_or(url);

    match path {
        "/" => {
            let posts = site.store.list_posts();
            let content = post_list_html(&config.base.title, &posts);
            Reply::ok(HTML, render_layout(&config.base.title, &content, site, config))
        }
        "/rss.xml" => match render_feed(&site.store, config, host) {
            Ok(xml) => Reply::ok(RSS, xml),
            Err(err) => {
                log!("error"; "{err}");
                Reply::with_status(500, TEXT, "500 Internal Server Error".into())
            }
        },
        "/healthz" => Reply::ok(TEXT, "ok".into()),
        "/readyz" => {
            let state = site.state.get();
            let status = if state.is_synced() { 200 } else { 503 };
            Reply::with_status(status, TEXT, state.to_string())
        }
        _ => route_segment(path, site, config),
    }
}

/// Routes of the form `/<prefix>/<segment>`.
fn route_segment(path: &str, site: &Site, config: &SiteConfig) -> Reply {
    let Some((prefix, raw)) = path.strip_prefix('/').and_then(|p| p.split_once('/')) else {
        return Reply::not_found();
    };
    let Ok(segment) = urlencoding::decode(raw.trim_end_matches('/')) else {
        return Reply::with_status(400, TEXT, "400 Bad Request".into());
    };

    match (prefix, segment) {
        ("tag" | "author" | "post" | "page", segment) if segment.is_empty() => {
            Reply::redirect_home()
        }
        ("tag", tag) => {
            let heading = format!("Posts tagged \u{201c}{tag}\u{201d}");
            let content = post_list_html(&heading, &site.store.list_posts_by_tag(&tag));
            Reply::ok(HTML, render_layout(&heading, &content, site, config))
        }
        ("author", author) => {
            let heading = format!("Posts by {author}");
            let content = post_list_html(&heading, &site.store.list_posts_by_author(&author));
            Reply::ok(HTML, render_layout(&heading, &content, site, config))
        }
        ("post", id) => match site.store.get_post(&id) {
            Some(post) => Reply::ok(HTML, render_layout(&post.title, &post_html(&post), site, config)),
            None => Reply::not_found(),
        },
        ("page", id) => match site.store.get_page(&id) {
            Some(page) => Reply::ok(HTML, render_layout(&page.title, &page_html(&page), site, config)),
            None => Reply::not_found(),
        },
        _ => Reply::not_found(),
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

fn respond(request: Request, reply: Reply) -> Result<()> {
    let mut response = Response::from_string(reply.body)
        .with_status_code(StatusCode(reply.status))
        .with_header(header("Content-Type", reply.content_type)?);
    if let Some(location) = reply.location {
        response.add_header(header("Location", location)?);
    }
    request.respond(response)?;
    Ok(())
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|()| anyhow!("invalid header {name}: {value}"))
}

// ============================================================================
// HTML Rendering
// ============================================================================

/// Wrap view content in the layout, filling the sidebar from the store.
fn render_layout(title: &str, content: &str, site: &Site, config: &SiteConfig) -> String {
    let blog_name = escape(config.base.title.as_str());
    let page_title = if title == config.base.title {
        blog_name.to_string()
    } else {
        format!("{} - {blog_name}", escape(title))
    };

    let pages: String = site
        .store
        .list_pages()
        .iter()
        .map(|page| {
            format!(
                r#"<a href="/page/{}">{}</a>"#,
                urlencoding::encode(&page.id),
                escape(page.title.as_str())
            )
        })
        .collect();

    let mut tags = site.store.list_tags();
    tags.sort();
    let tags = sidebar_links("tag", &tags);

    let mut authors = site.store.list_authors();
    authors.retain(|a| !a.is_empty());
    authors.sort();
    let authors = sidebar_links("author", &authors);

    fill_template(
        LAYOUT_TEMPLATE,
        &[
            ("title", page_title.as_str()),
            ("blog_name", &*blog_name),
            ("pages", pages.as_str()),
            ("tags", tags.as_str()),
            ("authors", authors.as_str()),
            ("content", content),
        ],
    )
}

fn sidebar_links(route: &str, names: &[String]) -> String {
    names
        .iter()
        .map(|name| {
            format!(
                r#"<li><a href="/{route}/{}">{}</a></li>"#,
                urlencoding::encode(name),
                escape(name.as_str())
            )
        })
        .collect()
}

fn post_list_html(heading: &str, posts: &[Arc<Post>]) -> String {
    let mut html = format!("<h1>{}</h1>\n", escape(heading));
    if posts.is_empty() {
        html.push_str(r#"<p class="empty">No posts yet.</p>"#);
        return html;
    }

    for post in posts {
        html.push_str(&format!(
            r#"<article><h2><a href="/post/{}">{}</a></h2>{}<p>{}</p>{}</article>"#,
            urlencoding::encode(&post.id),
            escape(post.title.as_str()),
            post_meta_html(post),
            escape(post.summary(SUMMARY_CHARS).as_str()),
            tag_list_html(&post.tags),
        ));
        html.push('\n');
    }
    html
}

fn post_html(post: &Post) -> String {
    format!(
        "<article><h1>{}</h1>{}{}{}</article>",
        escape(post.title.as_str()),
        post_meta_html(post),
        paragraphs(&post.body),
        tag_list_html(&post.tags),
    )
}

fn page_html(page: &Page) -> String {
    format!(
        "<article><h1>{}</h1>{}</article>",
        escape(page.title.as_str()),
        paragraphs(&page.content),
    )
}

/// "January 2, 2024 by <author>", plus the update date when present.
fn post_meta_html(post: &Post) -> String {
    let mut meta = post.authored_date.format("%B %-d, %Y").to_string();
    if !post.author.is_empty() {
        meta.push_str(&format!(
            r#" by <a href="/author/{}">{}</a>"#,
            urlencoding::encode(&post.author),
            escape(post.author.as_str())
        ));
    }
    if let Some(updated) = post.updated_date {
        meta.push_str(&format!(" (updated {})", updated.format("%B %-d, %Y")));
    }
    format!(r#"<p class="meta">{meta}</p>"#)
}

fn tag_list_html(tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let items: String = tags
        .iter()
        .map(|tag| {
            format!(
                r#"<li><a href="/tag/{}">{}</a></li>"#,
                urlencoding::encode(tag),
                escape(tag.as_str())
            )
        })
        .collect();
    format!(r#"<ul class="tags">{items}</ul>"#)
}

/// Blank-line separated blocks become paragraphs; single newlines become `<br>`.
fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let lines: Vec<Cow<'_, str>> = block.lines().map(|line| escape(line)).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect()
}

/// Replace `{name}` placeholders in one pass.
///
/// Substituted values are never rescanned, so user text containing
/// `{content}` stays literal. Unknown placeholders (CSS blocks) are copied.
fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
