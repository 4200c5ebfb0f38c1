use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::types::MatchDay;

static KICKOFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})\s*:\s*(\d{2})\s*(am|pm|ص|م)?").unwrap()
});

/// Parses the site's kickoff text: `21:00`, `09:00 PM`, `9:00 pm` or the
/// Arabic `09:00 م` / `09:00 ص`. Anything else is `None`.
pub fn parse_kickoff(text: &str) -> Option<NaiveTime> {
    let caps = KICKOFF.captures(text.trim())?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;

    if let Some(meridiem) = caps.get(3) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = matches!(meridiem.as_str().to_ascii_lowercase().as_str(), "pm" | "م");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn source_offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Calendar date a schedule page refers to, in the site's timezone.
pub fn calendar_date(day: MatchDay, now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    let local_today = now.with_timezone(&offset).date_naive();
    local_today + Duration::days(day.offset_days())
}

pub fn kickoff_utc(kickoff_text: &str, date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = parse_kickoff(kickoff_text)?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A match counts as finished once `grace` has passed since kickoff.
/// Unknown kickoff times are never treated as current or upcoming.
pub fn is_finished(kickoff: Option<DateTime<Utc>>, now: DateTime<Utc>, grace: Duration) -> bool {
    match kickoff {
        Some(kickoff) => kickoff < now - grace,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn test_parse_kickoff() {
        assert_eq!(parse_kickoff("21:00"), t(21, 0));
        assert_eq!(parse_kickoff(" 7:05 "), t(7, 5));
        assert_eq!(parse_kickoff("09:30 PM"), t(21, 30));
        assert_eq!(parse_kickoff("9:30pm"), t(21, 30));
        assert_eq!(parse_kickoff("12:15 AM"), t(0, 15));
        assert_eq!(parse_kickoff("12:15 PM"), t(12, 15));
        assert_eq!(parse_kickoff("08:00 م"), t(20, 0));
        assert_eq!(parse_kickoff("08:00 ص"), t(8, 0));
        assert_eq!(parse_kickoff("TBD"), None);
        assert_eq!(parse_kickoff("25:00"), None);
        assert_eq!(parse_kickoff("13:00 PM"), None);
        assert_eq!(parse_kickoff(""), None);
    }

    #[test]
    fn test_calendar_date_uses_source_timezone() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 22, 30, 0).unwrap();
        let cairo = source_offset(180);
        assert_eq!(calendar_date(MatchDay::Today, now, cairo), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(calendar_date(MatchDay::Yesterday, now, cairo), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(
            calendar_date(MatchDay::Tomorrow, now, source_offset(0)),
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
        );
    }

    #[test]
    fn test_kickoff_utc_and_finished() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let kickoff = kickoff_utc("08:00 م", date, source_offset(180));
        assert_eq!(kickoff, Some(Utc.with_ymd_and_hms(2025, 3, 11, 17, 0, 0).unwrap()));

        let grace = Duration::minutes(30);
        let during = Utc.with_ymd_and_hms(2025, 3, 11, 17, 20, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 11, 17, 31, 0).unwrap();
        assert!(!is_finished(kickoff, during, grace));
        assert!(is_finished(kickoff, after, grace));
        assert!(is_finished(None, during, grace));
    }
}
