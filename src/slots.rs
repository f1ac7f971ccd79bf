//! Slot schema: the ordered list of required slots per intent.
//!
//! Each slot carries a validator (text -> normalized value) and the prompt used
//! to ask for it. Validators are idempotent: feeding a normalized value back in
//! yields the same value. Dates normalize to `YYYY-MM-DD`, time windows to
//! `10am to 11:30am`.

use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use regex::Regex;

use crate::types::{Intent, SlotMap, SlotName};

/// Reference point for resolving relative dates ("tomorrow", "friday").
#[derive(Debug, Clone, Copy)]
pub struct SlotContext {
    pub today: NaiveDate,
}

impl SlotContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Context anchored on the local calendar date.
    pub fn current() -> Self {
        Self::new(Local::now().date_naive())
    }
}

pub type Validator = fn(&str, &SlotContext) -> Option<String>;

/// One entry of an intent's schema.
#[derive(Clone, Copy)]
pub struct SlotSpec {
    pub name: SlotName,
    pub validator: Validator,
    pub prompt: &'static str,
    /// Prefix used when a reply fails validation
    pub retry: &'static str,
}

impl SlotSpec {
    pub fn validate(&self, text: &str, ctx: &SlotContext) -> Option<String> {
        (self.validator)(text, ctx)
    }

    /// The re-prompt issued after a failed answer.
    pub fn reprompt(&self) -> String {
        format!("{} {}", self.retry, self.prompt)
    }
}

impl fmt::Debug for SlotSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotSpec")
            .field("name", &self.name)
            .field("prompt", &self.prompt)
            .finish()
    }
}

// ============================================================================
// Schemas
// ============================================================================

const SCHEDULE_SCHEMA: &[SlotSpec] = &[
    SlotSpec {
        name: SlotName::ParticipantAddress,
        validator: validate_address,
        prompt: "What is the participant's email?",
        retry: "Invalid or missing email address, please try again.",
    },
    SlotSpec {
        name: SlotName::EventName,
        validator: validate_event_name,
        prompt: "What should be the event name?",
        retry: "Event name cannot be empty.",
    },
    SlotSpec {
        name: SlotName::EventDate,
        validator: validate_date,
        prompt: "When is the meeting? (e.g. tomorrow or April 8)",
        retry: "Couldn't parse the date. Try again.",
    },
    SlotSpec {
        name: SlotName::EventTime,
        validator: validate_time_range,
        prompt: "What time is the meeting? (e.g. 10am to 11am)",
        retry: "Couldn't parse the time. Try again.",
    },
];

const UPDATE_SCHEMA: &[SlotSpec] = &[
    SlotSpec {
        name: SlotName::EventName,
        validator: validate_event_name,
        prompt: "What is the event name to update?",
        retry: "Event name cannot be empty.",
    },
    SlotSpec {
        name: SlotName::NewDate,
        validator: validate_date,
        prompt: "New date (e.g. April 21):",
        retry: "Couldn't parse the date. Try again.",
    },
    SlotSpec {
        name: SlotName::NewTime,
        validator: validate_time_range,
        prompt: "New time (e.g. 10am to 11am):",
        retry: "Couldn't parse the time. Try again.",
    },
];

const DELETE_SCHEMA: &[SlotSpec] = &[SlotSpec {
    name: SlotName::EventName,
    validator: validate_event_name,
    prompt: "What is the name of the event you want to delete?",
    retry: "Event name cannot be empty. Please enter it.",
}];

/// Ordered required slots for an intent. `Intent::None` has no schema.
pub fn schema(intent: Intent) -> &'static [SlotSpec] {
    match intent {
        Intent::Schedule => SCHEDULE_SCHEMA,
        Intent::Update => UPDATE_SCHEMA,
        Intent::Delete => DELETE_SCHEMA,
        Intent::None => &[],
    }
}

/// Required slot names in schema order, for clients rendering prompts ahead of time.
pub fn required_slots(intent: Intent) -> Vec<SlotName> {
    schema(intent).iter().map(|s| s.name).collect()
}

pub fn slot_spec(intent: Intent, name: SlotName) -> Option<&'static SlotSpec> {
    schema(intent).iter().find(|s| s.name == name)
}

/// First required slot, in schema order, that is not yet filled.
pub fn first_missing(intent: Intent, slots: &SlotMap) -> Option<&'static SlotSpec> {
    schema(intent).iter().find(|s| !slots.contains_key(&s.name))
}

/// Keep only the extracted values that belong to the intent's schema and
/// pass their validators, normalized.
pub fn accept_extracted(intent: Intent, extracted: &SlotMap, ctx: &SlotContext) -> SlotMap {
    let mut accepted = SlotMap::new();
    for (name, raw) in extracted {
        let Some(spec) = slot_spec(intent, *name) else {
            log::debug!("Dropping extracted slot {} outside the {} schema", name, intent);
            continue;
        };
        match spec.validate(raw, ctx) {
            Some(value) => {
                accepted.insert(*name, value);
            }
            None => log::debug!("Dropping unparseable extracted {}: {:?}", name, raw),
        }
    }
    accepted
}

// ============================================================================
// Validators
// ============================================================================

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)+").unwrap()
    })
}

/// First address-shaped token in the text.
pub fn validate_address(text: &str, _ctx: &SlotContext) -> Option<String> {
    address_regex().find(text).map(|m| m.as_str().to_string())
}

/// Any non-empty text once surrounding whitespace and quotes are removed.
pub fn validate_event_name(text: &str, _ctx: &SlotContext) -> Option<String> {
    let name = text.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn validate_date(text: &str, ctx: &SlotContext) -> Option<String> {
    resolve_date(text, ctx.today).map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn validate_time_range(text: &str, _ctx: &SlotContext) -> Option<String> {
    parse_time_range(text).map(|(start, end)| format!("{} to {}", format_clock(start), format_clock(end)))
}

// ============================================================================
// Date resolution
// ============================================================================

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap())
}

/// Month spellings accepted in dates, including common misspellings.
#[rustfmt::skip]
const MONTH_NAMES: &[(&str, u32)] = &[
    ("january", 1), ("janury", 1), ("januar", 1), ("jan", 1),
    ("february", 2), ("febuary", 2), ("feburary", 2), ("feb", 2),
    ("march", 3), ("marchh", 3), ("mrch", 3), ("mar", 3),
    ("april", 4), ("aprill", 4), ("aprl", 4), ("aplr", 4), ("apr", 4), ("apl", 4),
    ("may", 5), ("maay", 5),
    ("june", 6), ("junee", 6), ("juin", 6), ("jun", 6),
    ("july", 7), ("juuly", 7), ("jull", 7), ("jly", 7), ("jul", 7),
    ("august", 8), ("augst", 8), ("agust", 8), ("aug", 8), ("agu", 8),
    ("september", 9), ("septmbr", 9), ("setember", 9), ("sept", 9), ("sep", 9),
    ("october", 10), ("ocober", 10), ("octbr", 10), ("octr", 10), ("octb", 10), ("oct", 10),
    ("november", 11), ("novembr", 11), ("novmbr", 11), ("novbr", 11), ("nov", 11),
    ("december", 12), ("decembr", 12), ("decmbr", 12), ("decbr", 12), ("dec", 12),
];

/// Capturing alternation over `MONTH_NAMES`, longest first, with an optional period.
fn month_pattern() -> String {
    let mut names: Vec<&str> = MONTH_NAMES.iter().map(|(name, _)| *name).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    format!(r"({})\.?", names.join("|"))
}

fn month_day_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\b{}\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?\b",
            month_pattern()
        ))
        .unwrap()
    })
}

fn day_month_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{}(?:,?\s+(\d{{4}}))?\b",
            month_pattern()
        ))
        .unwrap()
    })
}

fn weekday_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(next\s+)?(monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thu|friday|fri|saturday|sat|sunday|sun)\b",
        )
        .unwrap()
    })
}

fn in_days_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bin\s+(\d{1,3})\s+days?\b").unwrap())
}

fn month_number(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .find(|(spelling, _)| *spelling == name)
        .map(|(_, month)| *month)
}

fn weekday_from(token: &str) -> Option<Weekday> {
    let day = match &token[..3] {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// Month/day with no year resolves to the nearest occurrence on or after today.
fn nearest_future(month: u32, day: u32, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

/// Resolve free text to a calendar date, preferring future dates when ambiguous.
pub fn resolve_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if let Some(caps) = iso_date_regex().captures(&lowered) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if lowered.contains("day after tomorrow") {
        return Some(today + Duration::days(2));
    }
    if lowered.contains("tomorrow") {
        return Some(today + Duration::days(1));
    }
    if lowered.contains("today") || lowered.contains("tonight") {
        return Some(today);
    }

    if let Some(caps) = in_days_regex().captures(&lowered) {
        let days: i64 = caps[1].parse().ok()?;
        return Some(today + Duration::days(days));
    }

    if let Some(caps) = month_day_regex().captures(&lowered) {
        let month = month_number(&caps[1])?;
        let day = caps[2].parse().ok()?;
        let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
        return nearest_future(month, day, year, today);
    }

    if let Some(caps) = day_month_regex().captures(&lowered) {
        let day = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = caps.get(3).and_then(|y| y.as_str().parse().ok());
        return nearest_future(month, day, year, today);
    }

    if let Some(caps) = weekday_regex().captures(&lowered) {
        let target = weekday_from(&caps[2])?;
        let current = today.weekday().num_days_from_monday() as i64;
        let wanted = target.num_days_from_monday() as i64;
        let mut ahead = (wanted - current + 7) % 7;
        if ahead == 0 && caps.get(1).is_some() {
            ahead = 7;
        }
        return Some(today + Duration::days(ahead));
    }

    None
}

// ============================================================================
// Time window resolution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn parse(token: &str) -> Option<Meridiem> {
        match token.replace('.', "").as_str() {
            "am" => Some(Meridiem::Am),
            "pm" => Some(Meridiem::Pm),
            _ => None,
        }
    }

    fn flip(self) -> Meridiem {
        match self {
            Meridiem::Am => Meridiem::Pm,
            Meridiem::Pm => Meridiem::Am,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockToken {
    hour: u32,
    minute: u32,
    explicit_minute: bool,
    meridiem: Option<Meridiem>,
}

impl ClockToken {
    fn at(&self, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
        let hour = match meridiem {
            Some(m) => {
                if !(1..=12).contains(&self.hour) {
                    return None;
                }
                let base = self.hour % 12;
                if m == Meridiem::Pm {
                    base + 12
                } else {
                    base
                }
            }
            None => self.hour,
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }

    /// Candidate times, borrowing the other side's meridiem when this side has none.
    fn candidates(&self, fallback: Option<Meridiem>) -> Vec<NaiveTime> {
        match (self.meridiem, fallback) {
            (Some(m), _) => self.at(Some(m)).into_iter().collect(),
            (None, Some(m)) => [self.at(Some(m)), self.at(Some(m.flip())), self.at(None)]
                .into_iter()
                .flatten()
                .collect(),
            (None, None) => self.at(None).into_iter().collect(),
        }
    }
}

fn time_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?\s*(to|too|till|til|until|-|–)\s*(\d{1,2})(?::(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?",
        )
        .unwrap()
    })
}

fn clock_token(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<ClockToken> {
    Some(ClockToken {
        hour: hour.parse().ok()?,
        minute: minute.map(|m| m.parse()).transpose().ok()?.unwrap_or(0),
        explicit_minute: minute.is_some(),
        meridiem: meridiem.and_then(|m| Meridiem::parse(&m.to_lowercase())),
    })
}

/// Parse a start/end pair such as "10am to 11am", "3 - 4:30pm" or "14:00 until 15:00".
///
/// End must be strictly after start.
pub fn parse_time_range(text: &str) -> Option<(NaiveTime, NaiveTime)> {
    for caps in time_range_regex().captures_iter(text) {
        let start = clock_token(&caps[1], caps.get(2).map(|m| m.as_str()), caps.get(3).map(|m| m.as_str()));
        let end = clock_token(&caps[5], caps.get(6).map(|m| m.as_str()), caps.get(7).map(|m| m.as_str()));
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        // A bare "4-8" is more likely part of a date than a time window.
        let dash = matches!(&caps[4], "-" | "–");
        let qualified = start.meridiem.is_some()
            || end.meridiem.is_some()
            || start.explicit_minute
            || end.explicit_minute;
        if dash && !qualified {
            continue;
        }

        for s in start.candidates(end.meridiem) {
            for e in end.candidates(start.meridiem) {
                if e > s {
                    return Some((s, e));
                }
            }
        }
    }
    None
}

/// Render a time as "10am" or "10:30pm".
pub fn format_clock(time: NaiveTime) -> String {
    let suffix = if time.hour() < 12 { "am" } else { "pm" };
    let hour = match time.hour() % 12 {
        0 => 12,
        h => h,
    };
    if time.minute() == 0 {
        format!("{}{}", hour, suffix)
    } else {
        format!("{}:{:02}{}", hour, time.minute(), suffix)
    }
}

/// Combine a date slot and a time slot into a local start/end pair.
pub fn resolve_window(
    date: &str,
    time: &str,
    ctx: &SlotContext,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let day = resolve_date(date, ctx.today)?;
    let (start, end) = parse_time_range(time)?;
    Some((day.and_time(start), day.and_time(end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SlotContext {
        // A Wednesday
        SlotContext::new(NaiveDate::from_ymd_opt(2026, 4, 15).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schema_order() {
        assert_eq!(
            required_slots(Intent::Schedule),
            vec![
                SlotName::ParticipantAddress,
                SlotName::EventName,
                SlotName::EventDate,
                SlotName::EventTime
            ]
        );
        assert_eq!(
            required_slots(Intent::Update),
            vec![SlotName::EventName, SlotName::NewDate, SlotName::NewTime]
        );
        assert_eq!(required_slots(Intent::Delete), vec![SlotName::EventName]);
        assert!(required_slots(Intent::None).is_empty());
    }

    #[test]
    fn test_first_missing_follows_schema_order() {
        let mut slots = SlotMap::new();
        slots.insert(SlotName::EventTime, "10am to 11am".to_string());
        slots.insert(SlotName::EventName, "Demo".to_string());
        let missing = first_missing(Intent::Schedule, &slots).unwrap();
        assert_eq!(missing.name, SlotName::ParticipantAddress);

        slots.insert(SlotName::ParticipantAddress, "a@b.com".to_string());
        let missing = first_missing(Intent::Schedule, &slots).unwrap();
        assert_eq!(missing.name, SlotName::EventDate);

        slots.insert(SlotName::EventDate, "2026-04-16".to_string());
        assert!(first_missing(Intent::Schedule, &slots).is_none());
    }

    #[test]
    fn test_accept_extracted_filters_schema_and_validates() {
        let mut raw = SlotMap::new();
        raw.insert(SlotName::EventName, "  Standup ".to_string());
        raw.insert(SlotName::ParticipantAddress, "a@b.com".to_string());
        raw.insert(SlotName::NewTime, "whenever".to_string());
        raw.insert(SlotName::NewDate, "tomorrow".to_string());

        let accepted = accept_extracted(Intent::Update, &raw, &ctx());
        assert_eq!(accepted.get(&SlotName::EventName).unwrap(), "Standup");
        assert_eq!(accepted.get(&SlotName::NewDate).unwrap(), "2026-04-16");
        assert!(!accepted.contains_key(&SlotName::ParticipantAddress));
        assert!(!accepted.contains_key(&SlotName::NewTime));
    }

    #[test]
    fn test_validate_address() {
        let c = ctx();
        assert_eq!(validate_address("a@b.com", &c).as_deref(), Some("a@b.com"));
        assert_eq!(
            validate_address("invite jane.doe+x@example.co.uk please", &c).as_deref(),
            Some("jane.doe+x@example.co.uk")
        );
        assert!(validate_address("jane at example dot com", &c).is_none());
        assert!(validate_address("jane@localhost", &c).is_none());
    }

    #[test]
    fn test_validate_event_name_rejects_blank() {
        let c = ctx();
        assert!(validate_event_name("", &c).is_none());
        assert!(validate_event_name("   \t ", &c).is_none());
        assert!(validate_event_name("\"\"", &c).is_none());
        assert_eq!(validate_event_name("  'Standup' ", &c).as_deref(), Some("Standup"));
    }

    #[test]
    fn test_resolve_relative_dates() {
        let today = ctx().today;
        assert_eq!(resolve_date("tomorrow", today), Some(date(2026, 4, 16)));
        assert_eq!(resolve_date("today", today), Some(today));
        assert_eq!(resolve_date("the day after tomorrow", today), Some(date(2026, 4, 17)));
        assert_eq!(resolve_date("in 3 days", today), Some(date(2026, 4, 18)));
    }

    #[test]
    fn test_resolve_month_day_prefers_future() {
        let today = ctx().today;
        assert_eq!(resolve_date("April 21", today), Some(date(2026, 4, 21)));
        assert_eq!(resolve_date("on aprl 8th", today), Some(date(2027, 4, 8)));
        assert_eq!(resolve_date("8 April", today), Some(date(2027, 4, 8)));
        assert_eq!(resolve_date("April 15", today), Some(today));
        assert_eq!(resolve_date("March 3, 2026", today), Some(date(2026, 3, 3)));
        assert_eq!(resolve_date("Sept 1", today), Some(date(2026, 9, 1)));
    }

    #[test]
    fn test_resolve_weekdays() {
        let today = ctx().today;
        assert_eq!(resolve_date("friday", today), Some(date(2026, 4, 17)));
        assert_eq!(resolve_date("on mon", today), Some(date(2026, 4, 20)));
        assert_eq!(resolve_date("wednesday", today), Some(today));
        assert_eq!(resolve_date("next wednesday", today), Some(date(2026, 4, 22)));
    }

    #[test]
    fn test_resolve_date_rejects_garbage() {
        let today = ctx().today;
        assert!(resolve_date("", today).is_none());
        assert!(resolve_date("whenever works", today).is_none());
        assert!(resolve_date("2026-02-30", today).is_none());
        assert!(resolve_date("decided 5", today).is_none());
        assert!(resolve_date("market 3", today).is_none());
        assert!(resolve_date("4 marbles", today).is_none());
    }

    #[test]
    fn test_resolve_misspelled_months() {
        let today = ctx().today;
        assert_eq!(resolve_date("janury 9", today), Some(date(2027, 1, 9)));
        assert_eq!(resolve_date("12 setember", today), Some(date(2026, 9, 12)));
        assert_eq!(resolve_date("Dec. 24", today), Some(date(2026, 12, 24)));
    }

    #[test]
    fn test_parse_time_ranges() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(parse_time_range("10am to 11am"), Some((t(10, 0), t(11, 0))));
        assert_eq!(parse_time_range("3pm to 4pm"), Some((t(15, 0), t(16, 0))));
        assert_eq!(parse_time_range("from 10 to 11am"), Some((t(10, 0), t(11, 0))));
        assert_eq!(parse_time_range("11 to 1pm"), Some((t(11, 0), t(13, 0))));
        assert_eq!(parse_time_range("2:30 PM - 3:15 PM"), Some((t(14, 30), t(15, 15))));
        assert_eq!(parse_time_range("14:00 until 15:30"), Some((t(14, 0), t(15, 30))));
        assert_eq!(parse_time_range("12pm till 1pm"), Some((t(12, 0), t(13, 0))));
    }

    #[test]
    fn test_parse_time_range_rejects_invalid() {
        assert!(parse_time_range("noon").is_none());
        assert!(parse_time_range("4pm to 3pm").is_none());
        assert!(parse_time_range("2026-04-08").is_none());
        assert!(parse_time_range("").is_none());
    }

    #[test]
    fn test_format_clock() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(format_clock(t(0, 0)), "12am");
        assert_eq!(format_clock(t(12, 0)), "12pm");
        assert_eq!(format_clock(t(9, 5)), "9:05am");
        assert_eq!(format_clock(t(23, 30)), "11:30pm");
    }

    fn assert_idempotent(validator: Validator, input: &str) {
        let c = ctx();
        let once = validator(input, &c).unwrap();
        let twice = validator(&once, &c).unwrap();
        assert_eq!(once, twice, "not idempotent for {:?}", input);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        assert_idempotent(validate_date, "tomorrow");
        assert_idempotent(validate_date, "April 8");
        assert_idempotent(validate_date, "next friday");
        assert_idempotent(validate_time_range, "10 to 11am");
        assert_idempotent(validate_time_range, "2:30 PM - 3:15 PM");
        assert_idempotent(validate_time_range, "14:00 until 15:00");
        assert_idempotent(validate_address, "mail a@b.com now");
        assert_idempotent(validate_event_name, " \"Quarterly review\" ");
    }

    #[test]
    fn test_resolve_window() {
        let (start, end) = resolve_window("2026-04-16", "3pm to 4pm", &ctx()).unwrap();
        assert_eq!(start.to_string(), "2026-04-16 15:00:00");
        assert_eq!(end.to_string(), "2026-04-16 16:00:00");
        assert!(resolve_window("soon", "3pm to 4pm", &ctx()).is_none());
    }

    #[test]
    fn test_reprompt_repeats_prompt() {
        let spec = slot_spec(Intent::Update, SlotName::NewDate).unwrap();
        assert_eq!(spec.reprompt(), "Couldn't parse the date. Try again. New date (e.g. April 21):");
    }
}
