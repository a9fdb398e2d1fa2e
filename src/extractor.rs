//! Event time extraction
//!
//! Finds date/time expressions in free-form mail text and turns them into
//! future instants in a single reference timezone. Dates without a time of
//! day are deliberately dropped: a reminder call needs a moment to fire at.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::{ReminderError, Result};

const MONTH: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const WEEKDAY: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const ZONE: &str = "UTC|GMT|IST|EST|EDT|CST|CDT|MST|MDT|PST|PDT|BST|CET|CEST";

/// Maximum distance, in bytes, between a date and the time that belongs to it
const PAIRING_WINDOW: usize = 40;

#[derive(Debug, Clone, Copy)]
struct DateMention {
    start: usize,
    end: usize,
    date: NaiveDate,
    /// Bare weekday naming today; moves a week ahead if its time has passed
    rolls_weekly: bool,
}

#[derive(Debug, Clone, Copy)]
struct TimeMention {
    start: usize,
    end: usize,
    time: NaiveTime,
    zone: Option<Tz>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    naive: NaiveDateTime,
    zone: Option<Tz>,
    rolls_weekly: bool,
}

/// Converts mail text into future event timestamps
pub struct EventTimeExtractor {
    timezone: Tz,
    horizon_years: i32,
    max_text_length: usize,
    meridiem_regex: Regex,
    iso_datetime_regex: Regex,
    day_month_regex: Regex,
    month_day_regex: Regex,
    date_regex: Regex,
    time_regex: Regex,
}

impl EventTimeExtractor {
    /// Create an extractor normalizing to `timezone`
    pub fn new(timezone: Tz, horizon_years: i32, max_text_length: usize) -> Result<Self> {
        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ReminderError::Other(format!("Failed to compile {name} regex: {e}")))
        };

        let meridiem_regex = compile("meridiem", r"(?i)(?P<lead>\d|\b)(?P<half>[ap])\.?m\b\.?")?;
        let iso_datetime_regex = compile(
            "ISO datetime",
            r"\b(?P<date>\d{4}-\d{1,2}-\d{1,2})T(?P<time>\d{1,2}:\d{2})",
        )?;
        let day_month_regex = compile(
            "day-month",
            &format!(r"(?i)\b(?P<phrase>\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>{MONTH})\b\.?)(?P<year>,?\s+\d{{4}}\b)?"),
        )?;
        let month_day_regex = compile(
            "month-day",
            &format!(r"(?i)\b(?P<phrase>(?:{MONTH})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?\b)(?P<year>,?\s+\d{{4}}\b)?"),
        )?;
        let date_regex = compile(
            "date",
            &format!(
                concat!(
                    r"(?i)\b(?:(?:{weekday}),?\s+)?(?:the\s+)?(?:",
                    r"(?P<dmy_d>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<dmy_m>{month})\b\.?,?\s+(?P<dmy_y>\d{{4}})",
                    r"|(?P<mdy_m>{month})\b\.?\s+(?P<mdy_d>\d{{1,2}})(?:st|nd|rd|th)?,?\s+(?P<mdy_y>\d{{4}})",
                    r"|(?P<iso_y>\d{{4}})-(?P<iso_m>\d{{1,2}})-(?P<iso_d>\d{{1,2}})",
                    r"|(?P<num_d>\d{{1,2}})[/.](?P<num_m>\d{{1,2}})[/.](?P<num_y>\d{{4}})",
                    r")\b",
                    r"|\b(?P<relative>today|tonight|tomorrow)\b",
                    r"|\b(?:(?P<next>next|this)\s+)?(?P<weekday>{weekday})\b",
                ),
                weekday = WEEKDAY,
                month = MONTH,
            ),
        )?;
        let time_regex = compile(
            "time",
            &format!(
                concat!(
                    r"(?i)\b(?:",
                    r"(?P<h12>\d{{1,2}})(?:[:.](?P<m12>\d{{2}}))?(?::\d{{2}})?\s*(?P<meridiem>AM|PM)",
                    r"|(?P<h24>\d{{1,2}}):(?P<m24>\d{{2}})(?::\d{{2}})?",
                    r"|(?P<noon>noon)",
                    r")\b(?:\s*(?P<zone>{zone})\b)?",
                ),
                zone = ZONE,
            ),
        )?;

        Ok(Self {
            timezone,
            horizon_years,
            max_text_length,
            meridiem_regex,
            iso_datetime_regex,
            day_month_regex,
            month_day_regex,
            date_regex,
            time_regex,
        })
    }

    /// Create an extractor from the extraction section of the configuration
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let timezone = config
            .timezone
            .parse::<Tz>()
            .map_err(|e| ReminderError::InvalidConfig(format!("Unknown timezone '{}': {e}", config.timezone)))?;
        Self::new(timezone, config.horizon_years, config.max_text_length)
    }

    /// Reference timezone every result is expressed in
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Current wall-clock time in the reference timezone
    #[must_use]
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Normalize meridiem markers and give yearless day/month phrases `year`
    #[must_use]
    pub fn prepare(&self, text: &str, year: i32) -> String {
        let text = self.meridiem_regex.replace_all(text, |caps: &Captures<'_>| {
            format!("{}{}M", &caps["lead"], caps["half"].to_uppercase())
        });
        let text = self.iso_datetime_regex.replace_all(&text, "$date $time");

        let with_year = |caps: &Captures<'_>| {
            if caps.name("year").is_some() {
                return caps[0].to_string();
            }
            let phrase = &caps["phrase"];
            // "14 March." ends a sentence, "14 Mar." is an abbreviation
            let full_name = caps.name("month").is_some_and(|m| !is_abbreviated_month(m.as_str()));
            match phrase.strip_suffix('.') {
                Some(stem) if full_name => format!("{stem} {year}."),
                _ => format!("{phrase} {year}"),
            }
        };
        let text = self.day_month_regex.replace_all(&text, with_year);
        let text = self.month_day_regex.replace_all(&text, with_year);

        text.into_owned()
    }

    /// Future, time-bearing instants mentioned in `text`, ascending and
    /// without duplicates
    pub fn extract(&self, text: &str, now: DateTime<Tz>) -> Result<Vec<DateTime<Tz>>> {
        if text.len() > self.max_text_length {
            return Err(ReminderError::Extraction(format!(
                "text is {} bytes, limit is {}",
                text.len(),
                self.max_text_length
            )));
        }

        let prepared = self.prepare(text, now.year());
        debug!(text = %prepared, "Parsing text for dates");

        let latest_year = now.year().saturating_add(self.horizon_years);
        let mut found: Vec<DateTime<Tz>> = self
            .search(&prepared, now.date_naive())
            .into_iter()
            .filter_map(|candidate| {
                let instant = self.localize(candidate.naive, candidate.zone)?;
                if candidate.rolls_weekly && instant <= now {
                    return self.localize(candidate.naive + Duration::weeks(1), candidate.zone);
                }
                Some(instant)
            })
            .filter(|instant| *instant > now && !is_midnight(instant) && instant.year() <= latest_year)
            .collect();

        found.sort();
        found.dedup();
        Ok(found)
    }

    /// `naive` read in `zone` (or the reference zone), expressed in the reference zone
    fn localize(&self, naive: NaiveDateTime, zone: Option<Tz>) -> Option<DateTime<Tz>> {
        let zone = zone.unwrap_or(self.timezone);
        let Some(local) = zone.from_local_datetime(&naive).earliest() else {
            debug!(%naive, "Skipping local time that does not exist in its zone");
            return None;
        };
        Some(local.with_timezone(&self.timezone))
    }

    /// Candidate local date-times with the zone named next to them, if any
    fn search(&self, text: &str, today: NaiveDate) -> Vec<Candidate> {
        let dates: Vec<DateMention> = self
            .date_regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let date = resolve_date(&caps, today);
                if date.is_none() {
                    debug!(phrase = whole.as_str(), "Skipping impossible date");
                }
                Some(DateMention {
                    start: whole.start(),
                    end: whole.end(),
                    date: date?,
                    rolls_weekly: is_bare_weekday(&caps) && date == Some(today),
                })
            })
            .collect();

        let times: Vec<TimeMention> = self
            .time_regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let overlaps_date = dates
                    .iter()
                    .any(|d| whole.start() < d.end && d.start < whole.end());
                if overlaps_date {
                    return None;
                }
                Some(TimeMention {
                    start: whole.start(),
                    end: whole.end(),
                    time: resolve_time(&caps)?,
                    zone: caps.name("zone").and_then(|z| zone_for_abbreviation(z.as_str())),
                })
            })
            .collect();

        pair_times(text, &dates, &times)
            .into_iter()
            .zip(&dates)
            .filter_map(|(paired, date)| match paired {
                Some(t) => Some(Candidate {
                    naive: date.date.and_time(times[t].time),
                    zone: times[t].zone,
                    rolls_weekly: date.rolls_weekly,
                }),
                // date-only mention; dropped later as midnight
                None => date.date.and_hms_opt(0, 0, 0).map(|naive| Candidate {
                    naive,
                    zone: None,
                    rolls_weekly: false,
                }),
            })
            .collect()
    }
}

/// Index of the time belonging to each date, if any
///
/// A time pairs with at most one date. Every date first claims the first
/// free time shortly after it in the same sentence; dates left without one
/// then take the closest free time shortly before them.
fn pair_times(text: &str, dates: &[DateMention], times: &[TimeMention]) -> Vec<Option<usize>> {
    let mut taken = vec![false; times.len()];
    let mut paired = vec![None; dates.len()];

    for (i, date) in dates.iter().enumerate() {
        let next_start = dates.get(i + 1).map_or(text.len(), |d| d.start);
        let after = (0..times.len()).find(|&t| {
            let time = &times[t];
            !taken[t]
                && time.start >= date.end
                && time.start < next_start
                && time.start - date.end <= PAIRING_WINDOW
                && same_sentence(&text[date.end..time.start])
        });
        if let Some(t) = after {
            taken[t] = true;
            paired[i] = Some(t);
        }
    }

    for (i, date) in dates.iter().enumerate() {
        if paired[i].is_some() {
            continue;
        }
        let prev_end = if i == 0 { 0 } else { dates[i - 1].end };
        let before = (0..times.len()).rev().find(|&t| {
            let time = &times[t];
            !taken[t]
                && time.end <= date.start
                && time.start >= prev_end
                && date.start - time.end <= PAIRING_WINDOW
                && same_sentence(&text[time.end..date.start])
        });
        if let Some(t) = before {
            taken[t] = true;
            paired[i] = Some(t);
        }
    }

    paired
}

/// True if `between` does not cross a line or sentence break
fn same_sentence(between: &str) -> bool {
    !between.contains(['\n', '!', '?', ';']) && !between.contains(". ")
}

fn resolve_date(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<i32>().ok());

    if caps.name("dmy_d").is_some() {
        let month = month_from_name(caps.name("dmy_m")?.as_str())?;
        return NaiveDate::from_ymd_opt(year("dmy_y")?, month, number("dmy_d")?);
    }
    if caps.name("mdy_d").is_some() {
        let month = month_from_name(caps.name("mdy_m")?.as_str())?;
        return NaiveDate::from_ymd_opt(year("mdy_y")?, month, number("mdy_d")?);
    }
    if caps.name("iso_y").is_some() {
        return NaiveDate::from_ymd_opt(year("iso_y")?, number("iso_m")?, number("iso_d")?);
    }
    if caps.name("num_y").is_some() {
        return NaiveDate::from_ymd_opt(year("num_y")?, number("num_m")?, number("num_d")?);
    }
    if let Some(relative) = caps.name("relative") {
        return match relative.as_str().to_lowercase().as_str() {
            "tomorrow" => today.succ_opt(),
            _ => Some(today),
        };
    }

    let weekday = weekday_from_name(caps.name("weekday")?.as_str())?;
    let mut days_ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    let is_next = caps
        .name("next")
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"));
    if is_next && days_ahead == 0 {
        days_ahead = 7;
    }
    today.checked_add_signed(Duration::days(i64::from(days_ahead)))
}

/// A weekday name without `next`/`this` in front of it
fn is_bare_weekday(caps: &Captures<'_>) -> bool {
    caps.name("weekday").is_some() && caps.name("next").is_none()
}

/// Time of day to the minute; seconds are read past and dropped
fn resolve_time(caps: &Captures<'_>) -> Option<NaiveTime> {
    let number = |name: &str| caps.name(name).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());

    if caps.name("noon").is_some() {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }

    if let Some(meridiem) = caps.name("meridiem") {
        let hour = number("h12")?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (hour, meridiem.as_str().eq_ignore_ascii_case("pm")) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour, number("m12")?, 0);
    }

    NaiveTime::from_hms_opt(number("h24")?, number("m24")?, 0)
}

fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn is_abbreviated_month(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "jan" | "feb" | "mar" | "apr" | "jun" | "jul" | "aug" | "sep" | "sept" | "oct" | "nov" | "dec"
    )
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    name.parse::<Weekday>().ok()
}

/// Zone named by a time-zone abbreviation written after a time
fn zone_for_abbreviation(abbreviation: &str) -> Option<Tz> {
    use chrono_tz::{Asia, Etc};

    let zone = match abbreviation.to_uppercase().as_str() {
        "UTC" | "GMT" => Tz::UTC,
        "IST" => Asia::Kolkata,
        "EST" | "CDT" => Etc::GMTPlus5,
        "EDT" => Etc::GMTPlus4,
        "CST" | "MDT" => Etc::GMTPlus6,
        "MST" | "PDT" => Etc::GMTPlus7,
        "PST" => Etc::GMTPlus8,
        "BST" | "CET" => Etc::GMTMinus1,
        "CEST" => Etc::GMTMinus2,
        _ => return None,
    };
    Some(zone)
}

fn is_midnight<T: Timelike>(instant: &T) -> bool {
    instant.hour() == 0 && instant.minute() == 0 && instant.second() == 0
}
