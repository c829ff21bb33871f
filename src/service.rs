use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::warn;

use crate::cache::WeekCache;
use crate::database::Database;
use crate::parser::TableSource;
use crate::render;
use crate::timetable::DayMap;

/// Group-to-URL lookup consumed by the service and the watchdog. The real
/// alias storage lives outside this crate; the shipped implementation is
/// config-backed.
pub trait GroupDirectory: Send + Sync {
    fn url_for(&self, group_code: &str) -> Option<String>;

    /// All tracked (group, url) pairs, in stable order.
    fn tracked(&self) -> Vec<(String, String)>;
}

pub struct ConfigGroups {
    groups: BTreeMap<String, String>,
}

impl ConfigGroups {
    pub fn new(groups: BTreeMap<String, String>) -> Self {
        Self { groups }
    }
}

impl GroupDirectory for ConfigGroups {
    fn url_for(&self, group_code: &str) -> Option<String> {
        self.groups.get(group_code).cloned()
    }

    fn tracked(&self) -> Vec<(String, String)> {
        self.groups
            .iter()
            .map(|(g, u)| (g.clone(), u.clone()))
            .collect()
    }
}

/// Read-side orchestration: cache-or-fetch plus the text renderings the
/// conversational layer consumes. Never returns errors to callers; every
/// failure degrades to an empty schedule.
pub struct ScheduleService {
    db: Arc<Database>,
    source: Arc<dyn TableSource>,
    directory: Arc<dyn GroupDirectory>,
}

impl ScheduleService {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn TableSource>,
        directory: Arc<dyn GroupDirectory>,
    ) -> Self {
        Self {
            db,
            source,
            directory,
        }
    }

    /// The parsed schedule covering `date` for the group: cached if a week
    /// entry covers the date, otherwise freshly fetched and cached. Empty
    /// means "unknown, retry later", not "no classes".
    pub fn get_schedule_data(&self, group_code: &str, date: NaiveDate) -> DayMap {
        if let Err(e) = WeekCache::sweep(&self.db, date) {
            warn!("cache sweep failed: {e}");
        }

        match WeekCache::load(&self.db, group_code, date) {
            Ok(Some(days)) => return days,
            Ok(None) => {}
            Err(e) => warn!("cache read for {group_code} failed, treating as miss: {e}"),
        }

        let Some(url) = self.directory.url_for(group_code) else {
            warn!("no timetable URL configured for group {group_code}");
            return DayMap::new();
        };

        match self.source.fetch(&url) {
            Ok(days) => {
                if !days.is_empty() {
                    if let Err(e) = WeekCache::save(&self.db, group_code, date, &days) {
                        warn!("cache write for {group_code} failed: {e}");
                    }
                }
                days
            }
            Err(e) => {
                warn!("fetch for {group_code} failed: {e}");
                DayMap::new()
            }
        }
    }

    pub fn get_day_text(&self, group_code: &str, date: NaiveDate) -> String {
        let days = self.get_schedule_data(group_code, date);
        render::build_day_text(&days, group_code, date)
    }

    pub fn get_week_text(&self, group_code: &str, anchor: NaiveDate) -> String {
        let days = self.get_schedule_data(group_code, anchor);
        render::build_week_text(&days, group_code, anchor)
    }

    pub fn get_unique_subjects(&self, group_code: &str, anchor: NaiveDate) -> Vec<String> {
        let days = self.get_schedule_data(group_code, anchor);
        render::unique_subjects(&days)
    }
}
