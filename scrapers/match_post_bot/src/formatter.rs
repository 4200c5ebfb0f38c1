use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use regex::Regex;
use std::sync::LazyLock;

use crate::types::{IframeCandidate, MatchRecord};

const PLAYER_PLACEHOLDER: &str = "سيتم إضافة بث المباراة قبل موعد المباراة";
const MATCH_LINK_LABEL: &str = "رابط المباراة";
const IFRAME_ALLOW: &str = "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture";

static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_SLUG_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static HYPHEN_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

pub fn post_title(record: &MatchRecord) -> String {
    format!("{} vs {} - {}", record.home_team, record.away_team, record.league)
}

/// Lowercase, hyphen-separated, restricted to `[a-z0-9-]`. Idempotent.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let hyphenated = WHITESPACE_RUNS.replace_all(&lowered, "-");
    let stripped = NON_SLUG_CHARS.replace_all(&hyphenated, "");
    let collapsed = HYPHEN_RUNS.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

pub fn post_slug(record: &MatchRecord) -> String {
    slugify(&format!("{} vs {}", record.home_team, record.away_team))
}

fn team_block(side: &str, name: &str, logo: Option<&str>) -> String {
    let logo = logo
        .map(|src| format!(r#"<img src="{}" alt="{}">"#, attr(src), attr(name)))
        .unwrap_or_default();
    format!(
        r#"<div class="team {side}">
            {logo}
            <h3>{name}</h3>
          </div>"#,
        side = side,
        logo = logo,
        name = text(name),
    )
}

fn player_section(record: &MatchRecord, player: Option<&IframeCandidate>) -> String {
    let inner = match player {
        Some(candidate) if candidate.is_video_tag => format!(
            r#"<video src="{src}" width="{width}" height="{height}" controls playsinline></video>"#,
            src = attr(&candidate.src),
            width = attr(&candidate.width),
            height = attr(&candidate.height),
        ),
        Some(candidate) => format!(
            r#"<iframe src="{src}" width="{width}" height="{height}" frameborder="{frame_border}" scrolling="{scrolling}"{fullscreen} allow="{allow}"></iframe>"#,
            src = attr(&candidate.src),
            width = attr(&candidate.width),
            height = attr(&candidate.height),
            frame_border = attr(&candidate.frame_border),
            scrolling = attr(&candidate.scrolling),
            fullscreen = if candidate.allow_fullscreen { " allowfullscreen" } else { "" },
            allow = IFRAME_ALLOW,
        ),
        None => {
            let link = record
                .detail_link
                .as_deref()
                .map(|href| {
                    format!(
                        r#"<p><a href="{}" target="_blank">{}</a></p>"#,
                        attr(href),
                        MATCH_LINK_LABEL
                    )
                })
                .unwrap_or_default();
            format!("<p>{}</p>{}", PLAYER_PLACEHOLDER, link)
        }
    };

    format!(
        r#"<div id="match-player">
          <div class="player-container">
            {}
          </div>
        </div>"#,
        inner
    )
}

/// Post body for one match. Pure: same inputs, same HTML.
pub fn render_post(record: &MatchRecord, player: Option<&IframeCandidate>) -> String {
    format!(
        r#"<div class="match-details" id="{slug}">
        <h2>{league}</h2>
        <div class="teams">
          {home}
          <div class="match-time">
            <p>{time}</p>
            <p>{day}</p>
          </div>
          {away}
        </div>
        <div class="match-info">
          <p>📺 {broadcaster}</p>
        </div>
        {player}
      </div>"#,
        slug = attr(&post_slug(record)),
        league = text(&record.league),
        home = team_block("home", &record.home_team, record.home_team_logo.as_deref()),
        time = text(&record.kickoff_time),
        day = record.day.arabic_label(),
        away = team_block("away", &record.away_team, record.away_team_logo.as_deref()),
        broadcaster = text(&record.broadcaster),
        player = player_section(record, player),
    )
}
