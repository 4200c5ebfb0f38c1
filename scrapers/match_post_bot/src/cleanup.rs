use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::{
    blogger::BlogApi,
    config::{BotConfig, CleanupConfig},
    fetcher::{fetch_days, HtmlFetcher},
    match_parser::MatchParser,
    publisher::Publisher,
    schedule_time::{calendar_date, is_finished, kickoff_utc, source_offset},
    state::{match_key, UrlMappingStore},
    types::{MatchDay, MatchRecord, UrlMappingEntry},
};

#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    pub min_age: Duration,
    pub max_age: Duration,
    pub grace: Duration,
    pub offset: FixedOffset,
}

impl CleanupPolicy {
    pub fn from_config(config: &CleanupConfig) -> Self {
        Self {
            min_age: Duration::hours(config.min_age_hours),
            max_age: Duration::hours(config.max_age_hours),
            grace: Duration::minutes(config.grace_minutes),
            offset: source_offset(config.source_utc_offset_minutes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupDecision {
    RetainTooRecent,
    RetainInProgress,
    RetainNotScheduled,
    DeleteFinished,
    DeleteExpired,
}

impl CleanupDecision {
    pub fn is_delete(&self) -> bool {
        matches!(self, CleanupDecision::DeleteFinished | CleanupDecision::DeleteExpired)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub checked: usize,
    pub deleted: usize,
    pub retained: usize,
    /// Local entries whose post had already been removed on the blog.
    pub pruned: usize,
    pub failed: usize,
}

/// Decides the fate of one mapping entry. `current` is the same fixture as
/// it appears in a fresh scrape, if it still appears at all.
pub fn decide(
    entry: &UrlMappingEntry,
    current: Option<&MatchRecord>,
    now: DateTime<Utc>,
    policy: &CleanupPolicy,
) -> CleanupDecision {
    let age = now - entry.published;
    if age < policy.min_age {
        return CleanupDecision::RetainTooRecent;
    }
    if age >= policy.max_age {
        return CleanupDecision::DeleteExpired;
    }
    let Some(record) = current else {
        return CleanupDecision::RetainNotScheduled;
    };

    let kickoff = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d")
        .ok()
        .and_then(|date| kickoff_utc(&record.kickoff_time, date, policy.offset));
    if is_finished(kickoff, now, policy.grace) {
        CleanupDecision::DeleteFinished
    } else {
        CleanupDecision::RetainInProgress
    }
}

/// Re-scrapes yesterday and today, then deletes posts of finished or
/// expired fixtures both remotely and from the local store.
pub async fn run_cleanup<F, A>(
    config: &BotConfig,
    fetcher: &F,
    publisher: &Publisher<A>,
    store: &mut UrlMappingStore,
    now: DateTime<Utc>,
) -> Result<CleanupSummary>
where
    F: HtmlFetcher + ?Sized,
    A: BlogApi,
{
    let policy = CleanupPolicy::from_config(&config.cleanup);
    let mut summary = CleanupSummary::default();
    if store.is_empty() {
        info!("No tracked posts to clean up");
        return Ok(summary);
    }

    let parser = MatchParser::new(&config.source.origin)?;
    let pages = fetch_days(fetcher, &config.source, &[MatchDay::Yesterday, MatchDay::Today]).await;
    let mut current: HashMap<String, MatchRecord> = HashMap::new();
    for (day, html) in pages {
        let date = calendar_date(day, now, policy.offset).format("%Y-%m-%d").to_string();
        for record in parser.parse(&html, day) {
            current.insert(match_key(&record.home_team, &record.away_team, &date), record);
        }
    }

    let decisions: Vec<(String, UrlMappingEntry, CleanupDecision)> = store
        .iter()
        .map(|(key, entry)| {
            let decision = decide(entry, current.get(key), now, &policy);
            (key.clone(), entry.clone(), decision)
        })
        .collect();

    for (key, entry, decision) in decisions {
        summary.checked += 1;
        if !decision.is_delete() {
            match publisher.get_post(&entry.post_id).await {
                Ok(None) => {
                    info!("Post {} no longer exists, forgetting it", entry.post_id);
                    store.remove(&key);
                    summary.pruned += 1;
                }
                Ok(Some(_)) => summary.retained += 1,
                Err(e) => {
                    warn!("Could not verify post {}: {}", entry.post_id, e);
                    summary.retained += 1;
                }
            }
            continue;
        }

        info!(
            "Deleting post for {} vs {} ({:?}): {}",
            entry.home_team, entry.away_team, decision, entry.url
        );
        match publisher.delete_post(&entry.post_id).await {
            Ok(()) => {
                store.remove(&key);
                summary.deleted += 1;
            }
            Err(e) => {
                error!("Failed to delete post {}: {}", entry.post_id, e);
                summary.failed += 1;
            }
        }
    }

    store.save()?;
    info!(
        "Cleanup finished: {} checked, {} deleted, {} retained, {} pruned, {} failed",
        summary.checked, summary.deleted, summary.retained, summary.pruned, summary.failed
    );
    Ok(summary)
}
