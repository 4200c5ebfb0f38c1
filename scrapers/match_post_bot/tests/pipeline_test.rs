use chrono::{DateTime, Duration, TimeZone, Utc};
use mockito::{Matcher, Server, ServerGuard};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;
use test_log::test;

use match_post_bot::{
    blogger::BloggerClient,
    cleanup::{run_cleanup, CleanupSummary},
    config::{BlogConfig, BotConfig, CleanupConfig, Credentials, PublishConfig, RateLimits, ScrapingConfig, SourceConfig},
    fetcher::RelayFetcher,
    match_parser::MatchParser,
    pipeline::{run_publish, PublishOptions, RunSummary},
    publisher::Publisher,
    retry::{RetryPolicy, Sleeper, TokioSleeper},
    state::{match_key, UrlMappingStore},
    types::{MatchDay, UrlMappingEntry},
};

const ORIGIN: &str = "https://www.kooraliive.com";
const SCHEDULE: &str = include_str!("fixtures/matches_today.html");
const DETAIL: &str = include_str!("fixtures/match_detail.html");

fn config(server: &ServerGuard, state_file: &str) -> BotConfig {
    BotConfig {
        source: SourceConfig {
            origin: ORIGIN.to_string(),
            relay_prefix: format!("{}/raw?url=", server.url()),
            days: vec![MatchDay::Today],
        },
        rate_limits: RateLimits {
            requests_per_second: 50,
        },
        scraping: ScrapingConfig::default(),
        blog: BlogConfig {
            blog_id: "42".to_string(),
            api_base: server.url(),
            token_url: format!("{}/token", server.url()),
            credentials: Credentials::Bearer("test-token".to_string()),
            api_key: None,
        },
        publish: PublishConfig {
            inter_request_delay_secs: 0,
            retry_base_delay_secs: 0,
            ..PublishConfig::default()
        },
        cleanup: CleanupConfig {
            state_file: state_file.to_string(),
            ..CleanupConfig::default()
        },
    }
}

fn publisher(config: &BotConfig, sleeper: Arc<dyn Sleeper>) -> Publisher<BloggerClient> {
    let client = BloggerClient::new(config, sleeper.clone()).unwrap();
    Publisher::new(client, RetryPolicy::from_config(&config.publish), sleeper)
}

async fn mock_relay(server: &mut ServerGuard, target: &str, status: usize, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/raw")
        .match_query(Matcher::UrlEncoded("url".into(), target.into()))
        .with_status(status)
        .with_body(body)
        .create_async()
        .await
}

fn entry(post_id: &str, home: &str, away: &str, published: DateTime<Utc>) -> UrlMappingEntry {
    UrlMappingEntry {
        post_id: post_id.to_string(),
        url: format!("https://blog.example/{}.html", post_id),
        home_team: home.to_string(),
        away_team: away.to_string(),
        league: "Egyptian Premier League".to_string(),
        date: "2025-03-11".to_string(),
        published,
        last_updated: published,
    }
}

#[test]
fn test_schedule_fixture_yields_well_formed_matches_in_order() {
    let matches = MatchParser::new(ORIGIN).unwrap().parse(SCHEDULE, MatchDay::Today);

    let summary: Vec<(&str, &str, &str, &str)> = matches
        .iter()
        .map(|m| (m.id.as_str(), m.home_team.as_str(), m.away_team.as_str(), m.kickoff_time.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("today-0", "Al Ahly", "Zamalek", "21:00"),
            ("today-1", "Pyramids", "Al Masry", "08:00 م"),
            ("today-3", "Ismaily", "Smouha", "10:00"),
        ]
    );

    let ahly = &matches[0];
    assert_eq!(ahly.league, "Egyptian Premier League");
    assert_eq!(ahly.broadcaster, "beIN Sports 1");
    assert_eq!(ahly.home_team_logo.as_deref(), Some("https://img.kooraliive.com/teams/al-ahly.png"));
    assert_eq!(ahly.away_team_logo.as_deref(), Some("https://img.kooraliive.com/teams/zamalek.png"));
    assert_eq!(ahly.detail_link.as_deref(), Some("https://www.kooraliive.com/match/al-ahly-zamalek/"));

    assert_eq!(matches[1].home_team_logo.as_deref(), Some("https://img.kooraliive.com/teams/pyramids.png"));
    assert_eq!(matches[1].league, "Egypt Cup");

    let ismaily = &matches[2];
    assert_eq!(ismaily.league, "Football Match");
    assert_eq!(ismaily.broadcaster, "TBD");
    assert_eq!(ismaily.detail_link, None);
}

#[test(tokio::test)]
async fn test_publish_run_through_relay_and_blogger() {
    let mut server = Server::new_async().await;
    let dir = tempdir().unwrap();
    let state_file = dir.path().join("match_urls.json");
    let cfg = config(&server, state_file.to_str().unwrap());

    let schedule = mock_relay(&mut server, &format!("{}/matches-today/", ORIGIN), 200, SCHEDULE).await;
    let detail = mock_relay(&mut server, &format!("{}/match/al-ahly-zamalek/", ORIGIN), 200, DETAIL).await;

    let new_search = server
        .mock("GET", "/blogs/42/posts/search")
        .match_header("authorization", "Bearer test-token")
        .match_query(Matcher::UrlEncoded("q".into(), "Al Ahly vs Zamalek - Egyptian Premier League".into()))
        .with_status(200)
        .with_body(r#"{"kind":"blogger#postList"}"#)
        .create_async()
        .await;
    let existing_search = server
        .mock("GET", "/blogs/42/posts/search")
        .match_query(Matcher::UrlEncoded("q".into(), "Pyramids vs Al Masry - Egypt Cup".into()))
        .with_status(200)
        .with_body(
            json!({
                "kind": "blogger#postList",
                "items": [{"id": "8001", "title": "Pyramids vs Al Masry - Egypt Cup", "url": "https://blog.example/8001.html"}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let insert = server
        .mock("POST", "/blogs/42/posts/")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "kind": "blogger#post",
                "blog": {"id": "42"},
                "title": "Al Ahly vs Zamalek - Egyptian Premier League",
            })),
            Matcher::Regex(r"https://live\.example\.tv/embed/ahly-zamalek".to_string()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "id": "9001",
                "title": "Al Ahly vs Zamalek - Egyptian Premier League",
                "url": "https://blog.example/9001.html",
                "published": "2025-03-11T12:00:05Z"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let fetcher = RelayFetcher::new(&cfg).unwrap();
    let publisher = publisher(&cfg, sleeper.clone());
    let mut store = UrlMappingStore::load(&state_file).unwrap();
    let options = PublishOptions {
        days: vec![MatchDay::Today],
        limit: None,
        dry_run: false,
    };
    // 15:00 in the site's timezone
    let now = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();

    let summary = run_publish(&cfg, &options, &fetcher, &publisher, &mut store, sleeper.as_ref(), now)
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            found: 3,
            filtered: 1,
            created: 1,
            existing: 1,
            ..RunSummary::default()
        }
    );
    schedule.assert_async().await;
    detail.assert_async().await;
    new_search.assert_async().await;
    existing_search.assert_async().await;
    insert.assert_async().await;

    let reloaded = UrlMappingStore::load(&state_file).unwrap();
    assert_eq!(reloaded.len(), 1);
    let stored = reloaded.get(&match_key("Al Ahly", "Zamalek", "2025-03-11")).unwrap();
    assert_eq!(stored.post_id, "9001");
    assert_eq!(stored.url, "https://blog.example/9001.html");
    assert_eq!(stored.published, Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 5).unwrap());
    assert_eq!(stored.last_updated, now);
}

#[test(tokio::test)]
async fn test_cleanup_run_deletes_finished_and_expired_posts() {
    let mut server = Server::new_async().await;
    let dir = tempdir().unwrap();
    let state_file = dir.path().join("match_urls.json");
    let cfg = config(&server, state_file.to_str().unwrap());
    // 22:00 in the site's timezone; Al Ahly kicked off at 21:00
    let now = Utc.with_ymd_and_hms(2025, 3, 11, 19, 0, 0).unwrap();

    let mut store = UrlMappingStore::load(&state_file).unwrap();
    let finished = match_key("Al Ahly", "Zamalek", "2025-03-11");
    let recent = match_key("Pyramids", "Al Masry", "2025-03-11");
    let expired = match_key("Enppi", "Zed", "2025-03-10");
    let vanished = match_key("Ghazl", "Modern Sport", "2025-03-11");
    store.upsert(finished.clone(), entry("9001", "Al Ahly", "Zamalek", now - Duration::hours(4)));
    store.upsert(recent.clone(), entry("9002", "Pyramids", "Al Masry", now - Duration::hours(1)));
    store.upsert(expired.clone(), entry("9003", "Enppi", "Zed", now - Duration::hours(30)));
    store.upsert(vanished.clone(), entry("9004", "Ghazl", "Modern Sport", now - Duration::hours(5)));
    store.save().unwrap();

    let _yesterday = mock_relay(&mut server, &format!("{}/matches-yesterday/", ORIGIN), 200, "<html><body></body></html>").await;
    let _today = mock_relay(&mut server, &format!("{}/matches-today/", ORIGIN), 200, SCHEDULE).await;

    let delete_finished = server
        .mock("DELETE", "/blogs/42/posts/9001")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let delete_expired = server
        .mock("DELETE", "/blogs/42/posts/9003")
        .with_status(404)
        .with_body(r#"{"error":{"code":404,"message":"Not Found"}}"#)
        .expect(1)
        .create_async()
        .await;
    let still_there = server
        .mock("GET", "/blogs/42/posts/9002")
        .with_status(200)
        .with_body(r#"{"id":"9002","title":"Pyramids vs Al Masry - Egypt Cup"}"#)
        .create_async()
        .await;
    let gone = server
        .mock("GET", "/blogs/42/posts/9004")
        .with_status(404)
        .with_body(r#"{"error":{"code":404,"message":"Not Found"}}"#)
        .create_async()
        .await;

    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let fetcher = RelayFetcher::new(&cfg).unwrap();
    let publisher = publisher(&cfg, sleeper);
    let mut store = UrlMappingStore::load(&state_file).unwrap();

    let summary = run_cleanup(&cfg, &fetcher, &publisher, &mut store, now).await.unwrap();

    assert_eq!(
        summary,
        CleanupSummary {
            checked: 4,
            deleted: 2,
            retained: 1,
            pruned: 1,
            failed: 0,
        }
    );
    delete_finished.assert_async().await;
    delete_expired.assert_async().await;
    still_there.assert_async().await;
    gone.assert_async().await;

    let reloaded = UrlMappingStore::load(&state_file).unwrap();
    let keys: Vec<&String> = reloaded.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![&recent]);
}
