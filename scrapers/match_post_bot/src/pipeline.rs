use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use crate::{
    blogger::BlogApi,
    config::BotConfig,
    fetcher::{fetch_days, HtmlFetcher},
    formatter::{post_slug, post_title, render_post},
    iframe_resolver::IframeResolver,
    match_parser::MatchParser,
    publisher::{PublishOutcome, Publisher},
    retry::Sleeper,
    schedule_time::{calendar_date, is_finished, kickoff_utc, source_offset},
    state::{match_key, UrlMappingStore},
    types::{MatchDay, MatchRecord, UrlMappingEntry},
};

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub days: Vec<MatchDay>,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub found: usize,
    pub filtered: usize,
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Scrapes the requested days and publishes one post per upcoming match.
pub async fn run_publish<F, A>(
    config: &BotConfig,
    options: &PublishOptions,
    fetcher: &F,
    publisher: &Publisher<A>,
    store: &mut UrlMappingStore,
    sleeper: &dyn Sleeper,
    now: DateTime<Utc>,
) -> Result<RunSummary>
where
    F: HtmlFetcher + ?Sized,
    A: BlogApi,
{
    let parser = MatchParser::new(&config.source.origin)?;
    let resolver = IframeResolver::new(fetcher, &config.source.root_url())?;
    let offset = source_offset(config.cleanup.source_utc_offset_minutes);
    let grace = Duration::minutes(config.cleanup.grace_minutes);
    let mut summary = RunSummary::default();

    let mut matches: Vec<(MatchRecord, NaiveDate)> = Vec::new();
    for (day, html) in fetch_days(fetcher, &config.source, &options.days).await {
        let date = calendar_date(day, now, offset);
        matches.extend(parser.parse(&html, day).into_iter().map(|record| (record, date)));
    }
    summary.found = matches.len();

    if config.publish.skip_finished {
        matches.retain(|(record, date)| {
            let upcoming = !is_finished(kickoff_utc(&record.kickoff_time, *date, offset), now, grace);
            if !upcoming {
                info!(
                    "Not publishing {} vs {} - kickoff {:?} is past or unknown",
                    record.home_team, record.away_team, record.kickoff_time
                );
            }
            upcoming
        });
        summary.filtered = summary.found - matches.len();
    }

    if let Some(limit) = options.limit {
        matches.truncate(limit);
    }

    if matches.is_empty() {
        info!("No matches to publish");
        return Ok(summary);
    }

    for (index, (record, date)) in matches.iter().enumerate() {
        if index > 0 && !options.dry_run {
            sleeper.sleep(config.publish.inter_request_delay()).await;
        }

        let title = post_title(record);
        info!("Processing: {} vs {}", record.home_team, record.away_team);

        if options.dry_run {
            let player = resolver.resolve(record).await;
            println!("# {} [{}]", title, post_slug(record));
            println!("{}", render_post(record, player.as_ref()));
            continue;
        }

        let content = async {
            let player = resolver.resolve(record).await;
            render_post(record, player.as_ref())
        };
        match publisher.create_post(&title, content).await {
            PublishOutcome::Created(post) => {
                let date = date.format("%Y-%m-%d").to_string();
                store.upsert(
                    match_key(&record.home_team, &record.away_team, &date),
                    UrlMappingEntry {
                        post_id: post.id.clone(),
                        url: post.url.clone(),
                        home_team: record.home_team.clone(),
                        away_team: record.away_team.clone(),
                        league: record.league.clone(),
                        date,
                        published: post.published.unwrap_or(now),
                        last_updated: now,
                    },
                );
                summary.created += 1;
            }
            PublishOutcome::AlreadyExists => summary.existing += 1,
            PublishOutcome::Skipped(_) => summary.skipped += 1,
            PublishOutcome::Failed(_) => summary.failed += 1,
        }
    }

    if !options.dry_run {
        store.save()?;
    }

    info!(
        "Finished! {} found, {} filtered, {} created, {} already existed, {} skipped, {} failed",
        summary.found, summary.filtered, summary.created, summary.existing, summary.skipped, summary.failed
    );
    Ok(summary)
}
