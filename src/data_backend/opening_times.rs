//! Weekday/time-range grammar shared by all sources.
//!
//! Free text rows look like `Mo 09.00-14.00` or `Mo.-Fr., 11:00 - 14:30`; structured
//! records carry full German weekday names and times with an optional `Uhr` suffix.

use chrono::NaiveTime;
use regex_lite::Regex;
use static_init::dynamic;

use crate::data_types::OpeningTimes;
use crate::errors::OpeningTimeError;

const SHORT_WEEKDAYS: [&str; 7] = ["mo", "di", "mi", "do", "fr", "sa", "so"];
const WEEKDAYS: [&str; 7] = [
    "montag",
    "dienstag",
    "mittwoch",
    "donnerstag",
    "freitag",
    "samstag",
    "sonntag",
];

fn short_weekday_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    SHORT_WEEKDAYS
        .iter()
        .position(|d| *d == name)
        .map(|i| i as u32 + 1)
}

/// ISO weekday number of a full German weekday name.
pub fn weekday_number(name: &str) -> Option<u32> {
    let name = name.trim().to_lowercase();
    WEEKDAYS
        .iter()
        .position(|d| *d == name)
        .map(|i| i as u32 + 1)
}

/// Parses `HH.MM` or `HH:MM`, tolerating a trailing `Uhr`.
pub fn parse_time(text: &str) -> Result<NaiveTime, OpeningTimeError> {
    let cleaned = text.trim().trim_end_matches("Uhr").trim().replace(':', ".");
    NaiveTime::parse_from_str(&cleaned, "%H.%M")
        .map_err(|_| OpeningTimeError::InvalidTime(text.to_string()))
}

/// Writes `start..end` for every weekday in `first..=last`.
pub fn insert_range(
    times: &mut OpeningTimes,
    first: u32,
    last: u32,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), OpeningTimeError> {
    if first > last {
        return Err(OpeningTimeError::ReversedRange { first, last });
    }
    for day in first..=last {
        times.insert(day, (start, end));
    }
    Ok(())
}

/// Extracts opening times from free text rows. Malformed entries are skipped;
/// later entries for the same weekday win.
pub fn extract_opening_times<'a, I>(rows: I) -> OpeningTimes
where
    I: IntoIterator<Item = &'a str>,
{
    #[dynamic]
    static ROW_RE: Regex = Regex::new(
        r"(?i)\b(mo|di|mi|do|fr|sa|so)\.?(?:\s*-\s*(mo|di|mi|do|fr|sa|so)\.?)?\s*,?\s*(\d{1,2}[.:]\d{2})\s*-\s*(\d{1,2}[.:]\d{2})",
    )
    .unwrap();

    let mut times = OpeningTimes::new();

    for row in rows {
        let row = row.replace('\u{a0}', " ");
        for caps in ROW_RE.captures_iter(&row) {
            let entry = (|| -> Result<(), OpeningTimeError> {
                let first = short_weekday_number(&caps[1])
                    .ok_or_else(|| OpeningTimeError::UnknownWeekday(caps[1].to_string()))?;
                let last = match caps.get(2) {
                    Some(day) => short_weekday_number(day.as_str())
                        .ok_or_else(|| OpeningTimeError::UnknownWeekday(day.as_str().to_string()))?,
                    None => first,
                };
                let start = parse_time(&caps[3])?;
                let end = parse_time(&caps[4])?;
                insert_range(&mut times, first, last, start, end)
            })();

            if let Err(e) = entry {
                log::debug!("skipping opening time '{}': {}", &caps[0], e);
            }
        }
    }

    times
}

/// A structured day-range record, e.g. from a JSON attribute.
pub struct DayRange<'a> {
    pub day_from: &'a str,
    pub day_to: Option<&'a str>,
    pub time_from: &'a str,
    pub time_to: &'a str,
}

pub fn from_day_ranges<'a, I>(ranges: I) -> OpeningTimes
where
    I: IntoIterator<Item = DayRange<'a>>,
{
    let mut times = OpeningTimes::new();

    for range in ranges {
        if range.day_from.trim().is_empty() {
            continue;
        }
        let entry = (|| -> Result<(), OpeningTimeError> {
            let first = weekday_number(range.day_from)
                .ok_or_else(|| OpeningTimeError::UnknownWeekday(range.day_from.to_string()))?;
            let last = match range.day_to.filter(|d| !d.trim().is_empty()) {
                Some(day) => weekday_number(day)
                    .ok_or_else(|| OpeningTimeError::UnknownWeekday(day.to_string()))?,
                None => first,
            };
            let start = parse_time(range.time_from)?;
            let end = parse_time(range.time_to)?;
            insert_range(&mut times, first, last, start, end)
        })();

        if let Err(e) = entry {
            log::debug!("skipping opening range starting {}: {}", range.day_from, e);
        }
    }

    times
}
