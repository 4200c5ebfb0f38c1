use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::{
    types::{MatchDay, MatchRecord},
    utils::{absolute_url, first_attr, first_text, selector},
};

const PLACEHOLDER_IMAGE: &str = "data:image/gif;base64";

struct MatchSelectors {
    container: Selector,
    home_name: Selector,
    away_name: Selector,
    home_logo: Selector,
    away_logo: Selector,
    time: Selector,
    league: Selector,
    broadcaster: Selector,
    link: Selector,
}

impl MatchSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            container: selector(".AY_Match")?,
            home_name: selector(".TM1 .TM_Name")?,
            away_name: selector(".TM2 .TM_Name")?,
            home_logo: selector(".TM1 .TM_Logo img")?,
            away_logo: selector(".TM2 .TM_Logo img")?,
            time: selector(".MT_Time")?,
            league: selector(".MT_Info li:last-child span")?,
            broadcaster: selector(".MT_Info li:first-child span")?,
            link: selector("a[href]")?,
        })
    }
}

pub struct MatchParser {
    selectors: MatchSelectors,
    origin: String,
}

impl MatchParser {
    pub fn new(origin: &str) -> Result<Self> {
        Ok(Self {
            selectors: MatchSelectors::new()?,
            origin: origin.to_string(),
        })
    }

    /// Extracts every match block of a schedule page, in document order.
    /// Blocks missing either team name are dropped.
    pub fn parse(&self, html: &str, day: MatchDay) -> Vec<MatchRecord> {
        let document = Html::parse_document(html);
        let mut matches = Vec::new();

        for (index, element) in document.select(&self.selectors.container).enumerate() {
            match self.parse_match(&element, day, index) {
                Some(record) => {
                    debug!("Parsed {} vs {} ({})", record.home_team, record.away_team, record.id);
                    matches.push(record);
                }
                None => warn!("Skipping match #{} on {} - missing team data", index, day),
            }
        }

        info!("Found {} matches for {}", matches.len(), day);
        matches
    }

    fn parse_match(&self, element: &ElementRef, day: MatchDay, index: usize) -> Option<MatchRecord> {
        let s = &self.selectors;
        let home_team = first_text(element, &s.home_name)?;
        let away_team = first_text(element, &s.away_name)?;

        Some(MatchRecord {
            id: format!("{}-{}", day, index),
            home_team,
            away_team,
            home_team_logo: extract_logo(element, &s.home_logo),
            away_team_logo: extract_logo(element, &s.away_logo),
            kickoff_time: first_text(element, &s.time).unwrap_or_else(|| "TBD".to_string()),
            league: first_text(element, &s.league).unwrap_or_else(|| "Football Match".to_string()),
            broadcaster: first_text(element, &s.broadcaster).unwrap_or_else(|| "TBD".to_string()),
            day,
            detail_link: first_attr(element, &s.link, "href")
                .and_then(|href| absolute_url(&href, &self.origin)),
        })
    }
}

/// Lazy-loaded logos carry a base64 GIF in `src` and the real image in `data-src`.
fn extract_logo(element: &ElementRef, logo: &Selector) -> Option<String> {
    match first_attr(element, logo, "src") {
        Some(src) if !src.contains(PLACEHOLDER_IMAGE) => Some(src),
        _ => first_attr(element, logo, "data-src").filter(|src| !src.contains(PLACEHOLDER_IMAGE)),
    }
}
