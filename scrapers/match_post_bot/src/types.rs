use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which of the site's three schedule pages a match was scraped from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchDay {
    Yesterday,
    Today,
    Tomorrow,
}

impl MatchDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchDay::Yesterday => "yesterday",
            MatchDay::Today => "today",
            MatchDay::Tomorrow => "tomorrow",
        }
    }

    /// Path of the schedule page relative to the site origin.
    pub fn path(&self) -> String {
        format!("/matches-{}/", self.as_str())
    }

    pub fn offset_days(&self) -> i64 {
        match self {
            MatchDay::Yesterday => -1,
            MatchDay::Today => 0,
            MatchDay::Tomorrow => 1,
        }
    }

    /// Label shown under the kickoff time in the post body.
    pub fn arabic_label(&self) -> &'static str {
        match self {
            MatchDay::Yesterday => "أمس",
            MatchDay::Today => "اليوم",
            MatchDay::Tomorrow => "غداً",
        }
    }
}

impl fmt::Display for MatchDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yesterday" => Ok(MatchDay::Yesterday),
            "today" => Ok(MatchDay::Today),
            "tomorrow" => Ok(MatchDay::Tomorrow),
            other => anyhow::bail!("Unknown match day: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_team_logo: Option<String>,
    pub away_team_logo: Option<String>,
    pub kickoff_time: String,
    pub league: String,
    pub broadcaster: String,
    pub day: MatchDay,
    pub detail_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IframeCandidate {
    pub src: String,
    pub width: String,
    pub height: String,
    pub allow_fullscreen: bool,
    pub frame_border: String,
    pub scrolling: String,
    pub is_video_tag: bool,
}

/// A post as returned by the blogging API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
}

/// One row of the persisted match -> post mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlMappingEntry {
    pub post_id: String,
    pub url: String,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub date: String,
    pub published: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}
