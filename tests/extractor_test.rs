//! Integration tests for event time extraction

use chrono::{DateTime, TimeZone, Timelike};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;
use proptest::prelude::*;

use inbox_call_reminder::config::ExtractionConfig;
use inbox_call_reminder::error::ReminderError;
use inbox_call_reminder::extractor::EventTimeExtractor;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December",
];

fn extractor() -> EventTimeExtractor {
    EventTimeExtractor::new(Kolkata, 2, 10_000).expect("Failed to create extractor")
}

fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
    Kolkata.with_ymd_and_hms(y, m, d, h, min, 0).single().expect("valid local time")
}

fn now() -> DateTime<Tz> {
    ist(2030, 1, 10, 8, 0)
}

#[test]
fn test_hackathon_announcement() {
    let text = "Hackathon invite\nHackathon kickoff on 14 March at 3:30 PM, register now!";
    let found = extractor().extract(text, now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 30)]);
}

#[test]
fn test_date_without_time_is_dropped() {
    let text = "Team meeting\nThe meeting is on March 14";
    assert!(extractor().extract(text, now()).unwrap().is_empty());
}

#[test]
fn test_past_event_is_dropped() {
    let later = ist(2030, 6, 1, 8, 0);
    let found = extractor().extract("Contest on 14 March at 3:30 PM", later).unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_bare_time_is_ignored() {
    assert!(extractor().extract("Contest starts at 3:30 PM", now()).unwrap().is_empty());
}

#[test]
fn test_time_belongs_to_one_date_only() {
    let ex = extractor();

    let found = ex
        .extract("Round 1 on 14 March at 3 PM, round 2 on 15 March.", now())
        .unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 0)]);

    let found = ex
        .extract("Registration closes 14 March. Meeting at 3 PM on 15 March", now())
        .unwrap();
    assert_eq!(found, vec![ist(2030, 3, 15, 15, 0)]);
}

#[test]
fn test_time_before_date_is_used() {
    let found = extractor().extract("Kickoff at 6 PM on 14 March", now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 18, 0)]);
}

#[test]
fn test_seconds_are_dropped() {
    let text = "Check-in 14 March at 3:30:15 PM, doors 14 March at 3:30:45 PM";
    let found = extractor().extract(text, now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 30)]);
}

#[test]
fn test_same_day_weekday_rolls_to_next_week() {
    let ex = extractor();
    // 2030-01-11 is a Friday
    let friday_late = ist(2030, 1, 11, 11, 0);
    assert_eq!(
        ex.extract("Meeting on Friday at 10 AM", friday_late).unwrap(),
        vec![ist(2030, 1, 18, 10, 0)]
    );

    let friday_early = ist(2030, 1, 11, 8, 0);
    assert_eq!(
        ex.extract("Meeting on Friday at 10 AM", friday_early).unwrap(),
        vec![ist(2030, 1, 11, 10, 0)]
    );

    // "this" pins the date to today
    assert!(ex.extract("Meeting this Friday at 10 AM", friday_late).unwrap().is_empty());
}

#[test]
fn test_multiple_events_sorted() {
    let text = "Round 2 on 15 March at 11 AM.\nRound 1 on 14 March at 3:30 PM.";
    let found = extractor().extract(text, now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 30), ist(2030, 3, 15, 11, 0)]);
}

#[test]
fn test_duplicates_collapse() {
    let text = "Starts 14 March at 3:30 PM (reminder: 14 March at 3:30 PM IST)";
    let found = extractor().extract(text, now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 30)]);
}

#[test]
fn test_meridiem_variants() {
    let found = extractor().extract("Demo on 14 March at 3:30 p.m.", now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 15, 30)]);

    let found = extractor().extract("Demo on 14 March at 9 a.m.", now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 14, 9, 0)]);
}

#[test]
fn test_explicit_year_and_formats() {
    let ex = extractor();
    assert_eq!(
        ex.extract("Final on 20/03/2030 at 18:45", now()).unwrap(),
        vec![ist(2030, 3, 20, 18, 45)]
    );
    assert_eq!(
        ex.extract("Kickoff 2030-03-20T18:45", now()).unwrap(),
        vec![ist(2030, 3, 20, 18, 45)]
    );
    assert_eq!(
        ex.extract("Friday, 15th of March, 2030 at noon", now()).unwrap(),
        vec![ist(2030, 3, 15, 12, 0)]
    );
}

#[test]
fn test_relative_days() {
    let ex = extractor();
    assert_eq!(
        ex.extract("Hackathon tomorrow at 9 AM", now()).unwrap(),
        vec![ist(2030, 1, 11, 9, 0)]
    );
    assert_eq!(
        ex.extract("Coding challenge tonight at 8 PM", now()).unwrap(),
        vec![ist(2030, 1, 10, 20, 0)]
    );
}

#[test]
fn test_impossible_date_does_not_spoil_message() {
    let text = "Demo on 31 February at 10 AM and on 2 March at 9 AM";
    let found = extractor().extract(text, now()).unwrap();
    assert_eq!(found, vec![ist(2030, 3, 2, 9, 0)]);
}

#[test]
fn test_horizon_cap() {
    let ex = extractor();
    assert_eq!(
        ex.extract("Summit on 14 March 2032 at 10:00", now()).unwrap(),
        vec![ist(2032, 3, 14, 10, 0)]
    );
    assert!(ex.extract("Summit on 14 March 2033 at 10:00", now()).unwrap().is_empty());
}

#[test]
fn test_text_too_long() {
    let ex = EventTimeExtractor::new(Kolkata, 2, 16).unwrap();
    let text = "Hackathon on 14 March at 3:30 PM";

    let err = ex.extract(text, now()).unwrap_err();
    assert!(matches!(err, ReminderError::Extraction(_)));
}

#[test]
fn test_from_config() {
    let config = ExtractionConfig {
        timezone: "UTC".to_string(),
        horizon_years: 1,
        max_text_length: 1_000,
    };
    let ex = EventTimeExtractor::from_config(&config).unwrap();
    assert_eq!(ex.timezone(), Tz::UTC);

    let bad = ExtractionConfig {
        timezone: "Nowhere".to_string(),
        ..config
    };
    assert!(EventTimeExtractor::from_config(&bad).is_err());
}

proptest! {
    #[test]
    fn prop_results_are_future_and_not_midnight(
        day in 1u32..=28,
        month in 0usize..12,
        hour in 0u32..24,
        minute in 0u32..60,
        with_year in any::<bool>(),
    ) {
        let year = if with_year { " 2031" } else { "" };
        let text = format!(
            "Event on {day} {}{year} at {hour:02}:{minute:02}",
            MONTHS[month]
        );
        let found = extractor().extract(&text, now()).unwrap();

        for instant in &found {
            prop_assert!(*instant > now());
            prop_assert!(!(instant.hour() == 0 && instant.minute() == 0 && instant.second() == 0));
        }
        prop_assert!(found.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn prop_extraction_is_idempotent(text in "[A-Za-z0-9 :,./-]{0,120}") {
        let ex = extractor();
        let first = ex.extract(&text, now()).unwrap();
        let second = ex.extract(&text, now()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_arbitrary_text_never_errors(text in "\\PC{0,300}") {
        let found = extractor().extract(&text, now()).unwrap();
        for instant in found {
            prop_assert!(instant > now());
        }
    }
}
