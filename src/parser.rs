use std::time::Duration;

use chrono::NaiveDate;

use crate::config::FetchConfig;
use crate::error::TtPulseError;
use crate::html::{
    class_has, inner_after_open_tag, marked_text, next_tag_block_ci, open_tag, strip_tags,
    tag_attr,
};
use crate::timetable::{DayMap, DaySchedule, Slot, DATE_FMT};

/// Rows per date block: one row for each pair number 1-8.
const DATE_BLOCK_ROWS: usize = 8;

/// Logical subgroup columns per pair row. Columns 0-1 are subgroup 1 and 2,
/// columns 2-4 are whole-stream alternatives.
const LOGICAL_COLUMNS: usize = 5;

/// Source of parsed timetable data. The watchdog and the schedule service
/// consume this seam; tests substitute a stub.
pub trait TableSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<DayMap, TtPulseError>;
}

/// Fetches timetable pages over HTTP with a fixed timeout and a browser
/// user agent (the source site rejects generic clients).
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(fetch: &FetchConfig) -> Result<Self, TtPulseError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs()))
            .user_agent(fetch.user_agent())
            .build()?;
        Ok(Self { client })
    }
}

impl TableSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<DayMap, TtPulseError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TtPulseError::HttpStatus(status.as_u16()));
        }
        let body = response.text()?;
        extract_schedule(&body)
    }
}

/// Parses the timetable document into a per-date map. Failures surface as an
/// explicit error here; the "empty schedule on failure" contract is applied
/// by the callers at the service and watchdog boundaries.
pub fn extract_schedule(doc: &str) -> Result<DayMap, TtPulseError> {
    let table = locate_table(doc)
        .ok_or_else(|| TtPulseError::MarkupError("no timetable table in document".to_string()))?;

    let rows = tag_blocks(table, "<tr", "</tr>");
    let mut schedule = DayMap::new();

    let mut i = 0;
    while i < rows.len() {
        let Some(date_cell) = find_date_cell(rows[i]) else {
            i += 1;
            continue;
        };
        let Some((date, day_name)) = parse_date_cell(&strip_tags(inner_after_open_tag(date_cell)))
        else {
            // Malformed date cell: step past this row only so the block
            // scan stays aligned with the remaining rows.
            i += 1;
            continue;
        };

        let block_end = (i + DATE_BLOCK_ROWS).min(rows.len());
        // Duplicate blocks for one date merge their pairs into the existing
        // day; the first block's day name wins.
        let day = schedule.entry(date).or_insert_with(|| DaySchedule {
            day_name,
            ..DaySchedule::default()
        });
        for row in &rows[i..block_end] {
            if let Some((pair_num, slot)) = parse_pair_row(row) {
                day.pairs.insert(pair_num, slot);
            }
        }
        i = block_end;
    }

    Ok(schedule)
}

/// The single data table: prefer the `output-table` class, fall back to the
/// first table in the document.
fn locate_table(doc: &str) -> Option<&str> {
    let tables = tag_blocks(doc, "<table", "</table>");
    tables
        .iter()
        .find(|t| class_has(open_tag(t), "output-table"))
        .or_else(|| tables.first())
        .copied()
}

fn tag_blocks<'a>(s: &'a str, open: &str, close: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((start, end)) = next_tag_block_ci(s, open, close, pos) {
        out.push(&s[start..end]);
        pos = end;
    }
    out
}

/// A date block starts at the row carrying a row-spanned date cell.
fn find_date_cell(row: &str) -> Option<&str> {
    tag_blocks(row, "<td", "</td>")
        .into_iter()
        .find(|td| tag_attr(open_tag(td), "rowspan").is_some())
}

/// Splits "06.05.2024 Понедельник" into the date and the day name. The date
/// token may sit anywhere in the cell text.
fn parse_date_cell(text: &str) -> Option<(NaiveDate, String)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let at = tokens
        .iter()
        .position(|t| NaiveDate::parse_from_str(t, DATE_FMT).is_ok())?;
    let date = NaiveDate::parse_from_str(tokens[at], DATE_FMT).ok()?;
    let day_name = tokens[at + 1..].join(" ");
    Some((date, day_name))
}

/// Parses one row of a date block into its pair number and slot. Returns
/// None for rows without a pair header or with no populated columns.
fn parse_pair_row(row: &str) -> Option<(u8, Slot)> {
    let tds = tag_blocks(row, "<td", "</td>");

    let mut pair_num = 0u8;
    let mut pair_idx = None;
    for (idx, td) in tds.iter().enumerate() {
        if class_has(open_tag(td), "hd") {
            let text = strip_tags(inner_after_open_tag(td));
            if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
                pair_num = text.parse().ok()?;
                pair_idx = Some(idx);
                break;
            }
        }
    }
    let pair_idx = pair_idx?;

    // Expand cells into the 5 logical columns, replicating content across
    // column spans.
    let mut cols: [Option<String>; LOGICAL_COLUMNS] = Default::default();
    let mut col = 0usize;
    for td in &tds[pair_idx + 1..] {
        let tag = open_tag(td);
        let span = tag_attr(tag, "colspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let content = if class_has(tag, "ur") {
            Some(lesson_text(td)).filter(|s| !s.is_empty())
        } else {
            None
        };
        for k in 0..span {
            if col + k < LOGICAL_COLUMNS {
                cols[col + k] = content.clone();
            }
        }
        col += span;
    }

    let common = cols[2..].iter().flatten().next().cloned();
    let first = cols[0].take();
    let second = cols[1].take();

    // A populated whole-stream column wins; the subgroup columns are
    // disregarded for that pair.
    match (common, first, second) {
        (Some(c), _, _) => Some((pair_num, Slot::Merged(c))),
        (None, Some(a), Some(b)) if a == b => Some((pair_num, Slot::Merged(a))),
        (None, Some(a), Some(b)) => Some((pair_num, Slot::Split(a, b))),
        (None, Some(a), None) => Some((pair_num, Slot::Split(a, String::new()))),
        (None, None, Some(b)) => Some((pair_num, Slot::Split(String::new(), b))),
        (None, None, None) => None,
    }
}

/// Builds the "subject | room | teacher" lesson string from the marker
/// classes used by the source markup (z1/z2/z3), omitting absent parts.
fn lesson_text(cell: &str) -> String {
    let subject_raw = marked_text(cell, "z1")
        .unwrap_or_else(|| strip_tags(inner_after_open_tag(cell)));
    let subject = strip_empty_parens(&subject_raw);
    let room = marked_text(cell, "z2").unwrap_or_default();
    let teacher = marked_text(cell, "z3").unwrap_or_default();

    let parts: Vec<&str> = [subject.as_str(), room.as_str(), teacher.as_str()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    parts.join(" | ")
}

/// Removes stray "()" artifacts the source leaves in subject names.
fn strip_empty_parens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] == '(' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j] == ')' {
                i = j + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    crate::html::normalize_ws(&out)
}
