use chrono::NaiveDate;
use rusqlite::{named_params, OptionalExtension};

use crate::database::Database;
use crate::error::TtPulseError;
use crate::timetable::{display_week, week_bounds, DayMap, DaySchedule};

/// Per-(group, week) cache of parsed schedules. Rows are keyed by the
/// week's Monday and overwritten wholesale on every successful re-fetch.
pub struct WeekCache;

impl WeekCache {
    /// The cached day map whose Monday-Sunday window contains `date`.
    pub fn load(
        db: &Database,
        group_code: &str,
        date: NaiveDate,
    ) -> Result<Option<DayMap>, TtPulseError> {
        let payload: Option<String> = db
            .conn()
            .query_row(
                "SELECT payload FROM week_cache
                 WHERE group_code = :group AND week_start <= :date AND week_end >= :date",
                named_params! {
                    ":group": group_code,
                    ":date": date.to_string(),
                },
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Writes the entry for the display week of `anchor`. A Saturday or
    /// Sunday anchor lands in the following week's window.
    pub fn save(
        db: &Database,
        group_code: &str,
        anchor: NaiveDate,
        days: &DayMap,
    ) -> Result<(), TtPulseError> {
        let (monday, sunday) = display_week(anchor);
        let payload = serde_json::to_string(days)?;

        db.conn().execute(
            "INSERT OR REPLACE INTO week_cache
                 (group_code, week_start, week_end, fetched_at, payload)
             VALUES (:group, :start, :end, strftime('%s', 'now', 'utc'), :payload)",
            named_params! {
                ":group": group_code,
                ":start": monday.to_string(),
                ":end": sunday.to_string(),
                ":payload": payload,
            },
        )?;
        Ok(())
    }

    /// Deletes every entry whose week fully precedes the week of `today`.
    /// Runs before each cache read, bounding storage to the current and
    /// immediately preceding week per group.
    pub fn sweep(db: &Database, today: NaiveDate) -> Result<usize, TtPulseError> {
        let (monday, _) = week_bounds(today);
        let deleted = db.conn().execute(
            "DELETE FROM week_cache WHERE week_end < :monday",
            named_params! { ":monday": monday.to_string() },
        )?;
        Ok(deleted)
    }
}

/// The watchdog's private last-notified day state per (group, date),
/// independent of WeekCache so an interactive refetch cannot mask a change.
pub struct Snapshots;

impl Snapshots {
    pub fn load(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
    ) -> Result<Option<DaySchedule>, TtPulseError> {
        let payload: Option<String> = db
            .conn()
            .query_row(
                "SELECT payload FROM watch_snapshots WHERE group_code = :group AND day = :day",
                named_params! { ":group": group_code, ":day": day.to_string() },
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
        schedule: &DaySchedule,
    ) -> Result<(), TtPulseError> {
        let payload = serde_json::to_string(schedule)?;
        db.conn().execute(
            "INSERT OR REPLACE INTO watch_snapshots (group_code, day, payload, updated_at)
             VALUES (:group, :day, :payload, strftime('%s', 'now', 'utc'))",
            named_params! {
                ":group": group_code,
                ":day": day.to_string(),
                ":payload": payload,
            },
        )?;
        Ok(())
    }
}

/// Fingerprint of the last notified diff per (group, date). Never pruned.
pub struct Marks;

impl Marks {
    pub fn load(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
    ) -> Result<Option<String>, TtPulseError> {
        let fingerprint = db
            .conn()
            .query_row(
                "SELECT fingerprint FROM watch_marks WHERE group_code = :group AND day = :day",
                named_params! { ":group": group_code, ":day": day.to_string() },
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }

    pub fn save(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
        fingerprint: &str,
    ) -> Result<(), TtPulseError> {
        db.conn().execute(
            "INSERT OR REPLACE INTO watch_marks (group_code, day, fingerprint, updated_at)
             VALUES (:group, :day, :fingerprint, strftime('%s', 'now', 'utc'))",
            named_params! {
                ":group": group_code,
                ":day": day.to_string(),
                ":fingerprint": fingerprint,
            },
        )?;
        Ok(())
    }
}

/// Operator corrections per (group, date), applied on top of fetched data
/// before the watchdog diffs it.
pub struct Overlays;

impl Overlays {
    pub fn set(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
        schedule: &DaySchedule,
    ) -> Result<(), TtPulseError> {
        let payload = serde_json::to_string(schedule)?;
        db.conn().execute(
            "INSERT OR REPLACE INTO overlays (group_code, day, payload)
             VALUES (:group, :day, :payload)",
            named_params! {
                ":group": group_code,
                ":day": day.to_string(),
                ":payload": payload,
            },
        )?;
        Ok(())
    }

    pub fn get(
        db: &Database,
        group_code: &str,
        day: NaiveDate,
    ) -> Result<Option<DaySchedule>, TtPulseError> {
        let payload: Option<String> = db
            .conn()
            .query_row(
                "SELECT payload FROM overlays WHERE group_code = :group AND day = :day",
                named_params! { ":group": group_code, ":day": day.to_string() },
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn clear(db: &Database, group_code: &str, day: NaiveDate) -> Result<bool, TtPulseError> {
        let deleted = db.conn().execute(
            "DELETE FROM overlays WHERE group_code = :group AND day = :day",
            named_params! { ":group": group_code, ":day": day.to_string() },
        )?;
        Ok(deleted > 0)
    }

    /// Overlay entries for the group whose date falls inside the given
    /// week window, in date order.
    pub fn for_week(
        db: &Database,
        group_code: &str,
        monday: NaiveDate,
        sunday: NaiveDate,
    ) -> Result<Vec<(NaiveDate, DaySchedule)>, TtPulseError> {
        let conn = db.conn();
        let mut stmt = conn.prepare(
            "SELECT day, payload FROM overlays
             WHERE group_code = :group AND day >= :monday AND day <= :sunday
             ORDER BY day",
        )?;
        let mut rows = stmt.query(named_params! {
            ":group": group_code,
            ":monday": monday.to_string(),
            ":sunday": sunday.to_string(),
        })?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let day: String = row.get(0)?;
            let payload: String = row.get(1)?;
            let date = day
                .parse::<NaiveDate>()
                .map_err(|e| TtPulseError::Error(format!("Invalid overlay date '{day}': {e}")))?;
            out.push((date, serde_json::from_str(&payload)?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::Slot;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn day(name: &str, lesson: &str) -> DaySchedule {
        DaySchedule {
            day_name: name.into(),
            pairs: BTreeMap::from([(1, Slot::Merged(lesson.into()))]),
        }
    }

    fn sample_week(d: NaiveDate) -> DayMap {
        DayMap::from([(d, day("Понедельник", "Math | Room 1"))])
    }

    #[test]
    fn save_then_load_covers_whole_window() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let monday = date(2024, 5, 6);

        WeekCache::save(&db, "CS-101", monday, &sample_week(monday)).unwrap();

        // Every day of the Monday-Sunday window resolves to the entry
        for offset in 0..7 {
            let probe = monday + chrono::Duration::days(offset);
            let loaded = WeekCache::load(&db, "CS-101", probe).unwrap();
            assert_eq!(loaded, Some(sample_week(monday)), "day offset {offset}");
        }
        // Other groups and other weeks miss
        assert_eq!(WeekCache::load(&db, "CS-102", monday).unwrap(), None);
        assert_eq!(
            WeekCache::load(&db, "CS-101", date(2024, 5, 13)).unwrap(),
            None
        );
    }

    #[test]
    fn save_overwrites_wholesale() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let monday = date(2024, 5, 6);

        WeekCache::save(&db, "CS-101", monday, &sample_week(monday)).unwrap();
        let replacement = DayMap::from([(
            date(2024, 5, 7),
            day("Вторник", "Physics | Room 2"),
        )]);
        WeekCache::save(&db, "CS-101", monday, &replacement).unwrap();

        let loaded = WeekCache::load(&db, "CS-101", monday).unwrap().unwrap();
        assert_eq!(loaded, replacement);
        // The old Monday entry is gone, not merged
        assert!(!loaded.contains_key(&monday));
    }

    #[test]
    fn weekend_anchor_saves_into_next_week() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let saturday = date(2024, 5, 11);
        let next_monday = date(2024, 5, 13);

        WeekCache::save(&db, "CS-101", saturday, &sample_week(next_monday)).unwrap();

        assert_eq!(WeekCache::load(&db, "CS-101", saturday).unwrap(), None);
        assert!(WeekCache::load(&db, "CS-101", next_monday)
            .unwrap()
            .is_some());
    }

    #[test]
    fn sweep_deletes_only_fully_elapsed_weeks() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        WeekCache::save(&db, "CS-101", date(2024, 4, 22), &DayMap::new()).unwrap();
        WeekCache::save(&db, "CS-101", date(2024, 4, 29), &DayMap::new()).unwrap();
        WeekCache::save(&db, "CS-101", date(2024, 5, 6), &DayMap::new()).unwrap();
        WeekCache::save(&db, "CS-101", date(2024, 5, 13), &DayMap::new()).unwrap();

        // Current date Wednesday 2024-05-08: weeks ending before Monday
        // 2024-05-06 go away, the current and future weeks stay.
        let deleted = WeekCache::sweep(&db, date(2024, 5, 8)).unwrap();
        assert_eq!(deleted, 2);

        assert_eq!(WeekCache::load(&db, "CS-101", date(2024, 4, 24)).unwrap(), None);
        assert!(WeekCache::load(&db, "CS-101", date(2024, 5, 6)).unwrap().is_some());
        assert!(WeekCache::load(&db, "CS-101", date(2024, 5, 13)).unwrap().is_some());
    }

    #[test]
    fn snapshots_round_trip_per_group_and_day() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let d = date(2024, 5, 6);

        assert_eq!(Snapshots::load(&db, "CS-101", d).unwrap(), None);
        Snapshots::save(&db, "CS-101", d, &day("Понедельник", "Math")).unwrap();
        Snapshots::save(&db, "CS-101", d, &day("Понедельник", "Physics")).unwrap();

        let loaded = Snapshots::load(&db, "CS-101", d).unwrap().unwrap();
        assert_eq!(loaded.pairs[&1], Slot::Merged("Physics".into()));
        assert_eq!(Snapshots::load(&db, "CS-102", d).unwrap(), None);
    }

    #[test]
    fn marks_round_trip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let d = date(2024, 5, 6);

        assert_eq!(Marks::load(&db, "CS-101", d).unwrap(), None);
        Marks::save(&db, "CS-101", d, "abc123").unwrap();
        assert_eq!(Marks::load(&db, "CS-101", d).unwrap().as_deref(), Some("abc123"));
        Marks::save(&db, "CS-101", d, "def456").unwrap();
        assert_eq!(Marks::load(&db, "CS-101", d).unwrap().as_deref(), Some("def456"));
    }

    #[test]
    fn overlays_filter_by_week_window() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        Overlays::set(&db, "CS-101", date(2024, 5, 6), &day("Понедельник", "A")).unwrap();
        Overlays::set(&db, "CS-101", date(2024, 5, 14), &day("Вторник", "B")).unwrap();

        let in_week =
            Overlays::for_week(&db, "CS-101", date(2024, 5, 6), date(2024, 5, 12)).unwrap();
        assert_eq!(in_week.len(), 1);
        assert_eq!(in_week[0].0, date(2024, 5, 6));

        assert!(Overlays::clear(&db, "CS-101", date(2024, 5, 6)).unwrap());
        assert!(!Overlays::clear(&db, "CS-101", date(2024, 5, 6)).unwrap());
        assert_eq!(Overlays::get(&db, "CS-101", date(2024, 5, 6)).unwrap(), None);
    }
}
