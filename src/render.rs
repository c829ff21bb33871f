//! Renders structured schedule data into the canonical human-readable
//! lines. Both the user-facing text builders and the watchdog diff operate
//! on these canonical forms, never on raw markup.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};

use crate::timetable::{
    day_name_ru, display_week, DayMap, DaySchedule, Slot, DATE_FMT, MAX_PAIRS,
};

const NO_PAIR: &str = "НЕТ";
const NO_PAIRS_DAY: &str = "Пар нету🤗";

pub fn day_header(date: NaiveDate) -> String {
    format!("{} • {}", day_name_ru(date), date.format(DATE_FMT))
}

/// Canonical per-pair lines for one day: "N пара: …" with ①/② sub-lines for
/// split pairs and "НЕТ" for empty ones. A day with no classes at all
/// renders as a single placeholder line.
pub fn day_lines(day: Option<&DaySchedule>) -> Vec<String> {
    let Some(day) = day.filter(|d| !d.pairs.is_empty()) else {
        return vec![NO_PAIRS_DAY.to_string()];
    };

    let mut lines = Vec::new();
    for n in 1..=MAX_PAIRS {
        match day.pairs.get(&n) {
            None | Some(Slot::Empty) => lines.push(format!("{n} пара: {NO_PAIR}")),
            Some(Slot::Merged(lesson)) => lines.push(format!("{n} пара: {lesson}")),
            Some(Slot::Split(first, second)) => {
                match (first.is_empty(), second.is_empty()) {
                    (false, false) => {
                        lines.push(format!("{n} пара:"));
                        lines.push(format!("① {first}"));
                        lines.push(format!("② {second}"));
                    }
                    (false, true) => lines.push(format!("{n} пара: ① {first}")),
                    (true, false) => lines.push(format!("{n} пара: ② {second}")),
                    (true, true) => lines.push(format!("{n} пара: {NO_PAIR}")),
                }
            }
        }
    }
    lines
}

/// Canonical diff view of a day: pair number to non-empty slot text. Pairs
/// with no content are absent, so string comparison is all the diff needs.
pub fn pair_texts(day: Option<&DaySchedule>) -> BTreeMap<u8, String> {
    let mut out = BTreeMap::new();
    if let Some(day) = day {
        for (&num, slot) in &day.pairs {
            let text = slot.canonical_text();
            if !text.is_empty() {
                out.insert(num, text);
            }
        }
    }
    out
}

pub fn build_day_text(days: &DayMap, group_code: &str, date: NaiveDate) -> String {
    if days.is_empty() {
        return unavailable_text(group_code);
    }
    let header = day_header(date);
    let lines = day_lines(days.get(&date)).join("\n");
    format!("<b>{header}</b>\n<blockquote>{lines}</blockquote>")
}

/// Monday through Saturday of the display week, one block per day.
pub fn build_week_text(days: &DayMap, group_code: &str, anchor: NaiveDate) -> String {
    if days.is_empty() {
        return unavailable_text(group_code);
    }
    let (monday, _) = display_week(anchor);
    let mut parts = Vec::new();
    let mut current = monday;
    while current <= monday + Duration::days(5) {
        let header = day_header(current);
        let lines = day_lines(days.get(&current)).join("\n");
        parts.push(format!("<b>{header}</b>\n<blockquote>{lines}</blockquote>"));
        current += Duration::days(1);
    }
    parts.join("\n\n")
}

fn unavailable_text(group_code: &str) -> String {
    format!("Не удалось получить расписание для группы <b>{group_code}</b>.")
}

/// Distinct subject tokens (text before the first "|") across all lessons
/// of the map, sorted.
pub fn unique_subjects(days: &DayMap) -> Vec<String> {
    let mut subjects = BTreeSet::new();
    for day in days.values() {
        for slot in day.pairs.values() {
            let lessons: Vec<&str> = match slot {
                Slot::Empty => Vec::new(),
                Slot::Merged(lesson) => vec![lesson.as_str()],
                Slot::Split(first, second) => vec![first.as_str(), second.as_str()],
            };
            for lesson in lessons {
                if let Some(subject) = lesson.split('|').next() {
                    let subject = subject.trim();
                    if !subject.is_empty() {
                        subjects.insert(subject.to_string());
                    }
                }
            }
        }
    }
    subjects.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_day() -> DaySchedule {
        DaySchedule {
            day_name: "Понедельник".into(),
            pairs: BTreeMap::from([
                (1, Slot::Merged("Math | Room 1 | Dr X".into())),
                (2, Slot::Split("Prog | Lab 2".into(), "DB | Lab 3".into())),
                (4, Slot::Split("Eng".into(), String::new())),
            ]),
        }
    }

    #[test]
    fn day_lines_cover_all_pair_shapes() {
        let lines = day_lines(Some(&sample_day()));
        assert_eq!(
            lines,
            vec![
                "1 пара: Math | Room 1 | Dr X",
                "2 пара:",
                "① Prog | Lab 2",
                "② DB | Lab 3",
                "3 пара: НЕТ",
                "4 пара: ① Eng",
                "5 пара: НЕТ",
                "6 пара: НЕТ",
                "7 пара: НЕТ",
                "8 пара: НЕТ",
            ]
        );
    }

    #[test]
    fn absent_day_renders_placeholder() {
        assert_eq!(day_lines(None), vec![NO_PAIRS_DAY]);
        let empty = DaySchedule::default();
        assert_eq!(day_lines(Some(&empty)), vec![NO_PAIRS_DAY]);
    }

    #[test]
    fn pair_texts_skip_empty_slots() {
        let mut day = sample_day();
        day.pairs.insert(5, Slot::Empty);
        day.pairs.insert(6, Slot::Split(String::new(), String::new()));
        let texts = pair_texts(Some(&day));
        assert_eq!(
            texts,
            BTreeMap::from([
                (1, "Math | Room 1 | Dr X".to_string()),
                (2, "Prog | Lab 2 | DB | Lab 3".to_string()),
                (4, "Eng".to_string()),
            ])
        );
        assert!(pair_texts(None).is_empty());
    }

    #[test]
    fn day_text_wraps_header_and_blockquote() {
        let days = DayMap::from([(date(2024, 5, 6), sample_day())]);
        let text = build_day_text(&days, "CS-101", date(2024, 5, 6));
        assert!(text.starts_with("<b>Понедельник • 06.05.2024</b>"));
        assert!(text.contains("<blockquote>1 пара: Math | Room 1 | Dr X"));
    }

    #[test]
    fn empty_map_renders_unavailable() {
        let days = DayMap::new();
        let text = build_day_text(&days, "CS-101", date(2024, 5, 6));
        assert_eq!(
            text,
            "Не удалось получить расписание для группы <b>CS-101</b>."
        );
    }

    #[test]
    fn week_text_spans_monday_to_saturday() {
        let days = DayMap::from([(date(2024, 5, 6), sample_day())]);
        let text = build_week_text(&days, "CS-101", date(2024, 5, 8));
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 6);
        assert!(blocks[0].contains("Понедельник • 06.05.2024"));
        assert!(blocks[5].contains("Суббота • 11.05.2024"));
        // Days missing from the map show the placeholder
        assert!(blocks[1].contains(NO_PAIRS_DAY));
    }

    #[test]
    fn unique_subjects_are_sorted_and_deduped() {
        let days = DayMap::from([
            (date(2024, 5, 6), sample_day()),
            (
                date(2024, 5, 7),
                DaySchedule {
                    day_name: "Вторник".into(),
                    pairs: BTreeMap::from([(1, Slot::Merged("Math | Room 7".into()))]),
                },
            ),
        ]);
        assert_eq!(unique_subjects(&days), vec!["DB", "Eng", "Math", "Prog"]);
    }
}
