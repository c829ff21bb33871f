//! Background watchdog: re-fetches the near-term schedule for every tracked
//! group, diffs it against its own last-notified snapshot and dispatches
//! deduplicated update messages.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use hex::encode;
use log::{debug, error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};

use crate::cache::{Marks, Overlays, Snapshots};
use crate::config::WatchConfig;
use crate::database::Database;
use crate::error::TtPulseError;
use crate::notify::{RecipientDirectory, Transport};
use crate::parser::TableSource;
use crate::render::pair_texts;
use crate::service::GroupDirectory;
use crate::timetable::{day_name_ru, week_bounds, DATE_FMT};

#[derive(AsRefStr, EnumString, Display, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub enum ChangeKind {
    #[strum(serialize = "R")]
    Removed,
    #[strum(serialize = "A")]
    Added,
    #[strum(serialize = "C")]
    Changed,
}

/// One pair-level difference between the old and the new day state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChangeEntry {
    pub pair: u8,
    pub kind: ChangeKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Per-pair diff over the canonical slot texts. Pairs empty on both sides
/// are ignored; the result is ordered by pair number.
pub fn diff_pairs(
    old: &BTreeMap<u8, String>,
    new: &BTreeMap<u8, String>,
) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();
    let pairs: std::collections::BTreeSet<u8> =
        old.keys().chain(new.keys()).copied().collect();

    for pair in pairs {
        let o = old.get(&pair).map(String::as_str).unwrap_or("");
        let n = new.get(&pair).map(String::as_str).unwrap_or("");
        match (o.is_empty(), n.is_empty()) {
            (true, true) => {}
            (false, true) => entries.push(ChangeEntry {
                pair,
                kind: ChangeKind::Removed,
                old: Some(o.to_string()),
                new: None,
            }),
            (true, false) => entries.push(ChangeEntry {
                pair,
                kind: ChangeKind::Added,
                old: None,
                new: Some(n.to_string()),
            }),
            (false, false) if o != n => entries.push(ChangeEntry {
                pair,
                kind: ChangeKind::Changed,
                old: Some(o.to_string()),
                new: Some(n.to_string()),
            }),
            (false, false) => {}
        }
    }
    entries
}

/// Every previously populated pair went empty and nothing was added. The
/// likeliest cause is a transient source failure, so such a diff is
/// suppressed rather than broadcast as "all classes cancelled".
pub fn is_total_removal(old: &BTreeMap<u8, String>, new: &BTreeMap<u8, String>) -> bool {
    !old.is_empty() && new.is_empty()
}

/// Deterministic fingerprint of a change set. The entries are canonically
/// ordered before hashing, so logically identical diffs always map to the
/// same fingerprint regardless of how they were assembled.
pub fn fingerprint(entries: &[ChangeEntry]) -> String {
    let mut sorted: Vec<&ChangeEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| (e.pair, e.kind));

    let mut hasher = Sha256::new();
    for entry in sorted {
        hasher.update(entry.kind.as_ref().as_bytes());
        hasher.update(b"|");
        hasher.update(entry.pair.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(entry.old.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(entry.new.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\n");
    }
    encode(hasher.finalize())
}

/// The notification text: a header naming the group and the day, then one
/// bullet per removal/addition/change.
pub fn format_update_message(
    group_code: &str,
    now: NaiveDateTime,
    date: NaiveDate,
    entries: &[ChangeEntry],
) -> String {
    let mut lines = vec![
        format!("Группа: {group_code}"),
        String::new(),
        "🗓️ Обновление расписания".to_string(),
        format!("⏰ {}", now.format("%d.%m.%Y %H:%M")),
        String::new(),
        format!("{} • {}", day_name_ru(date), date.format(DATE_FMT)),
    ];
    for entry in entries {
        let line = match entry.kind {
            ChangeKind::Removed => format!(
                "• {} пара: отменена «{}»",
                entry.pair,
                entry.old.as_deref().unwrap_or("")
            ),
            ChangeKind::Added => format!(
                "• {} пара: добавлена «{}»",
                entry.pair,
                entry.new.as_deref().unwrap_or("")
            ),
            ChangeKind::Changed => format!(
                "• {} пара: изменена «{}» → «{}»",
                entry.pair,
                entry.old.as_deref().unwrap_or(""),
                entry.new.as_deref().unwrap_or("")
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

pub struct Watchdog {
    db: Arc<Database>,
    source: Arc<dyn TableSource>,
    directory: Arc<dyn GroupDirectory>,
    recipients: Arc<dyn RecipientDirectory>,
    transport: Arc<dyn Transport>,
    interval: Duration,
    horizon_days: u32,
}

impl Watchdog {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn TableSource>,
        directory: Arc<dyn GroupDirectory>,
        recipients: Arc<dyn RecipientDirectory>,
        transport: Arc<dyn Transport>,
        watch: &WatchConfig,
    ) -> Self {
        Self {
            db,
            source,
            directory,
            recipients,
            transport,
            interval: Duration::from_secs(watch.interval_secs()),
            horizon_days: watch.horizon_days(),
        }
    }

    /// Repeats cycles with a fixed inter-cycle sleep until the shutdown
    /// channel fires or disconnects. No backoff on repeated failures.
    pub fn run_loop(&self, shutdown: Receiver<()>) {
        info!(
            "watchdog started: {} groups, interval {}s",
            self.directory.tracked().len(),
            self.interval.as_secs()
        );
        loop {
            self.run_cycle(chrono::Local::now().naive_local());
            match shutdown.recv_timeout(self.interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("watchdog stopping");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// One full pass over all tracked groups and the next `horizon_days`
    /// calendar dates. Errors inside a single (group, date) check are
    /// logged and never abort the rest of the cycle.
    pub fn run_cycle(&self, now: NaiveDateTime) {
        for (group_code, url) in self.directory.tracked() {
            for offset in 0..self.horizon_days {
                let target = now.date() + chrono::Duration::days(offset as i64);
                if let Err(e) = self.check_group_date(&group_code, &url, now, target) {
                    error!("watchdog: {group_code} {target}: {e}");
                }
            }
        }
    }

    fn check_group_date(
        &self,
        group_code: &str,
        url: &str,
        now: NaiveDateTime,
        target: NaiveDate,
    ) -> Result<(), TtPulseError> {
        let (monday, sunday) = week_bounds(target);

        // Always fetch fresh; the interactive cache must not mask changes.
        // Fetch and parse failures degrade to an empty map here, which the
        // total-removal heuristic below keeps from looking like mass
        // cancellation.
        let mut fresh = self.source.fetch(url).unwrap_or_else(|e| {
            warn!("watchdog fetch for {group_code} failed: {e}");
            BTreeMap::new()
        });

        for (day, schedule) in Overlays::for_week(&self.db, group_code, monday, sunday)? {
            fresh.insert(day, schedule);
        }

        let Some(new_info) = fresh.get(&target) else {
            return Ok(());
        };

        // Storage failures on the read side count as "nothing seen yet".
        let old_info = match Snapshots::load(&self.db, group_code, target) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("snapshot read for {group_code} failed, treating as empty: {e}");
                None
            }
        };

        let old_map = pair_texts(old_info.as_ref());
        let new_map = pair_texts(Some(new_info));

        let entries = diff_pairs(&old_map, &new_map);
        if entries.is_empty() {
            return Ok(());
        }
        if is_total_removal(&old_map, &new_map) {
            debug!("watchdog: {group_code} {target}: total removal suppressed");
            return Ok(());
        }

        let fp = fingerprint(&entries);
        if Marks::load(&self.db, group_code, target)?.as_deref() == Some(fp.as_str()) {
            return Ok(());
        }

        let message = format_update_message(group_code, now, target, &entries);
        info!(
            "watchdog: {group_code} {target}: {} change(s), notifying",
            entries.len()
        );
        self.dispatch(group_code, &message);

        Snapshots::save(&self.db, group_code, target, new_info)?;
        Marks::save(&self.db, group_code, target, &fp)?;

        Ok(())
    }

    fn dispatch(&self, group_code: &str, message: &str) {
        for recipient in self.recipients.eligible_for(group_code) {
            if recipient.blocked || self.recipients.is_banned(recipient.id) {
                continue;
            }
            if let Err(e) = self.transport.send_text(recipient.id, message) {
                warn!(
                    "delivery to {} failed, marking blocked: {e}",
                    recipient.id
                );
                self.recipients.mark_blocked(recipient.id);
            }
        }
    }
}
