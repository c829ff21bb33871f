use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// User-facing date format used by the source site and in all rendered text.
pub const DATE_FMT: &str = "%d.%m.%Y";

/// One class slot within a day. Lesson payloads are pre-formatted
/// "subject | room | teacher" strings and are compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Explicitly no class (used by operator overlays to blank a pair).
    Empty,
    /// One lesson shared by the whole group.
    Merged(String),
    /// Subgroup 1 / subgroup 2 lessons; either side may be empty when only
    /// one subgroup has a class.
    Split(String, String),
}

impl Slot {
    /// Canonical single-line text for diffing: non-empty parts joined by
    /// " | ". Empty slots yield an empty string.
    pub fn canonical_text(&self) -> String {
        match self {
            Slot::Empty => String::new(),
            Slot::Merged(lesson) => lesson.clone(),
            Slot::Split(first, second) => {
                let parts: Vec<&str> = [first.as_str(), second.as_str()]
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect();
                parts.join(" | ")
            }
        }
    }
}

/// One calendar day's classes. Only populated pairs appear in the map;
/// pair numbers run 1 through 8.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day_name: String,
    pub pairs: BTreeMap<u8, Slot>,
}

/// Parsed schedule keyed by calendar date. A parse of one source page may
/// span more than one week; the cache windows it per week on save.
pub type DayMap = BTreeMap<NaiveDate, DaySchedule>;

pub const MAX_PAIRS: u8 = 8;

/// Monday and Sunday of the week containing `d`.
pub fn week_bounds(d: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = d - Duration::days(d.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

/// The week window used for display and cache keys. A Saturday or Sunday
/// anchor rolls forward into the following week.
pub fn display_week(d: NaiveDate) -> (NaiveDate, NaiveDate) {
    let wd = d.weekday().num_days_from_monday();
    let base = if wd >= 5 {
        d + Duration::days((7 - wd) as i64)
    } else {
        d
    };
    week_bounds(base)
}

pub fn day_name_ru(d: NaiveDate) -> &'static str {
    [
        "Понедельник",
        "Вторник",
        "Среда",
        "Четверг",
        "Пятница",
        "Суббота",
        "Воскресенье",
    ][d.weekday().num_days_from_monday() as usize]
}
