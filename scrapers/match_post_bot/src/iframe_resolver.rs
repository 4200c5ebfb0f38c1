//! Finds an embeddable player on a match detail page.
//!
//! The detail pages are third-party markup that changes without notice, so
//! resolution is a best-effort walk over an ordered list of rules, from very
//! specific to "any iframe on the page", with a blocklist of ad and tracker
//! hosts applied to every candidate.

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::{
    fetcher::HtmlFetcher,
    types::{IframeCandidate, MatchRecord},
    utils::{normalize_protocol_relative, selector},
};

const MIN_SRC_LEN: usize = 10;

pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "/ads/",
    "/ads?",
    "//ads.",
    ".ads.",
    "advert",
    "adserver",
    "adservice",
    "doubleclick",
    "googlesyndication",
    "googletagmanager",
    "google-analytics",
    "popads",
    "propellerads",
    "adsterra",
    "facebook.com/plugins",
];

/// Where a rule reads the player URL from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAttr {
    /// `src` of an iframe.
    IframeSrc,
    /// `data-src` of a lazily loaded iframe.
    LazyIframe,
    /// `src` of a `<video>` or its `<source>`.
    Video,
    /// An arbitrary data attribute naming the embed URL.
    Data(&'static str),
}

pub struct CandidateRule {
    pub name: &'static str,
    selector: Selector,
    source: SourceAttr,
}

impl CandidateRule {
    pub fn new(name: &'static str, css: &str, source: SourceAttr) -> Result<Self> {
        Ok(Self {
            name,
            selector: selector(css)?,
            source,
        })
    }

    fn raw_src<'a>(&self, element: &ElementRef<'a>) -> Option<&'a str> {
        let attr = match self.source {
            SourceAttr::IframeSrc | SourceAttr::Video => "src",
            SourceAttr::LazyIframe => "data-src",
            SourceAttr::Data(name) => name,
        };
        element.value().attr(attr)
    }

    /// Builds a candidate from one element, or `None` when its URL is unusable.
    fn extract(&self, element: &ElementRef, blocklist: &[&str]) -> Option<IframeCandidate> {
        let src = normalize_protocol_relative(self.raw_src(element)?);
        if !is_acceptable_src(&src, blocklist) {
            debug!("Rule {} rejected {}", self.name, src);
            return None;
        }

        // <source> carries the URL but the sizing lives on the parent <video>.
        let sized = match element.value().name() {
            "source" => element
                .parent()
                .and_then(ElementRef::wrap)
                .unwrap_or(*element),
            _ => *element,
        };
        let attr = |name: &str, default: &str| {
            sized
                .value()
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Some(IframeCandidate {
            src,
            width: attr("width", "100%"),
            height: attr("height", "500"),
            allow_fullscreen: sized.value().attr("allowfullscreen").is_some()
                || self.source == SourceAttr::Video,
            frame_border: attr("frameborder", "0"),
            scrolling: attr("scrolling", "no"),
            is_video_tag: self.source == SourceAttr::Video,
        })
    }
}

pub fn is_acceptable_src(src: &str, blocklist: &[&str]) -> bool {
    let lowered = src.trim().to_ascii_lowercase();
    lowered.len() > MIN_SRC_LEN && !blocklist.iter().any(|blocked| lowered.contains(&blocked.to_ascii_lowercase()))
}

pub fn default_rules() -> Result<Vec<CandidateRule>> {
    use SourceAttr::*;
    Ok(vec![
        CandidateRule::new("fullscreen-500", r#"iframe[allowfullscreen][height="500"]"#, IframeSrc)?,
        CandidateRule::new("fullscreen", "iframe[allowfullscreen]", IframeSrc)?,
        CandidateRule::new("youtube", r#"iframe[src*="youtube"]"#, IframeSrc)?,
        CandidateRule::new("twitch", r#"iframe[src*="twitch"]"#, IframeSrc)?,
        CandidateRule::new("stream", r#"iframe[src*="stream"]"#, IframeSrc)?,
        CandidateRule::new("player", r#"iframe[src*="player"]"#, IframeSrc)?,
        CandidateRule::new("embed", r#"iframe[src*="embed"]"#, IframeSrc)?,
        CandidateRule::new(
            "player-container",
            ".video-player iframe, .player-container iframe, #player iframe, .stream-player iframe",
            IframeSrc,
        )?,
        CandidateRule::new("any-iframe", "iframe[src]", IframeSrc)?,
        CandidateRule::new("lazy-iframe", "iframe[data-src]", LazyIframe)?,
        CandidateRule::new("video-source", "video source[src]", Video)?,
        CandidateRule::new("video", "video[src]", Video)?,
        CandidateRule::new("data-embed", "[data-embed]", Data("data-embed"))?,
        CandidateRule::new("data-player-url", "[data-player-url]", Data("data-player-url"))?,
    ])
}

/// First acceptable element, trying rules in priority order and elements
/// within a rule in document order.
pub fn select_candidate(document: &Html, rules: &[CandidateRule], blocklist: &[&str]) -> Option<IframeCandidate> {
    rules.iter().find_map(|rule| {
        document
            .select(&rule.selector)
            .find_map(|element| rule.extract(&element, blocklist))
            .map(|candidate| {
                debug!("Rule {} matched {}", rule.name, candidate.src);
                candidate
            })
    })
}

pub struct IframeResolver<'a, F: HtmlFetcher + ?Sized> {
    fetcher: &'a F,
    rules: Vec<CandidateRule>,
    blocklist: Vec<&'static str>,
    root_url: String,
}

impl<'a, F: HtmlFetcher + ?Sized> IframeResolver<'a, F> {
    pub fn new(fetcher: &'a F, root_url: &str) -> Result<Self> {
        Ok(Self {
            fetcher,
            rules: default_rules()?,
            blocklist: DEFAULT_BLOCKLIST.to_vec(),
            root_url: root_url.to_string(),
        })
    }

    pub fn resolve_html(&self, html: &str) -> Option<IframeCandidate> {
        let document = Html::parse_document(html);
        select_candidate(&document, &self.rules, &self.blocklist)
    }

    /// `None` is a normal outcome: no link, a placeholder link, a failed
    /// fetch, or a page without a usable player.
    pub async fn resolve(&self, record: &MatchRecord) -> Option<IframeCandidate> {
        let link = match record.detail_link.as_deref() {
            Some(link) if link.trim_end_matches('/') != self.root_url.trim_end_matches('/') => link,
            _ => {
                debug!("No usable detail link for {}", record.id);
                return None;
            }
        };

        info!("Extracting iframe from: {}", link);
        let html = match self.fetcher.fetch_html(link).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Error extracting iframe from {}: {:#}", link, e);
                return None;
            }
        };

        let candidate = self.resolve_html(&html);
        match &candidate {
            Some(found) => info!("Found player: {}", found.src),
            None => info!("No player found on {}", link),
        }
        candidate
    }
}
