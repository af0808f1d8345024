//! Publication calendar listing.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use ssb_api::models::{CalendarResponse, CalendarSection, PublicationEntry};

use crate::error::{Result, StatbankError};
use crate::model::{PublicationRecord, TableId};

/// Inclusive range of release dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Range ending at `date` and reaching `range_days` days back.
    pub fn trailing(date: &str, range_days: Option<u32>) -> Result<Self> {
        let to = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
            StatbankError::invalid_argument(format!(
                "date {date:?} is not a calendar date (expected YYYY-MM-DD)"
            ))
        })?;
        let days = range_days.unwrap_or(0);
        let from = to.checked_sub_days(Days::new(days.into())).ok_or_else(|| {
            StatbankError::invalid_argument(format!("rangeDays {days} is out of range"))
        })?;
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Normalise calendar entries into records inside `range`, sorted by
/// release date and then title.
pub(crate) fn list_records(
    response: CalendarResponse,
    range: DateRange,
) -> Result<Vec<PublicationRecord>> {
    let mut records = Vec::with_capacity(response.publications.len());
    for entry in response.publications {
        let release_date = NaiveDate::parse_from_str(entry.release_date.trim(), "%Y-%m-%d")
            .map_err(|_| {
                StatbankError::format_error(format!(
                    "publication {:?} has unparseable release date {:?}",
                    entry.title, entry.release_date
                ))
            })?;
        if !range.contains(release_date) {
            continue;
        }
        records.push(PublicationRecord {
            table_ids: collect_table_ids(&entry)?,
            title: entry.title,
            release_date,
        });
    }

    records.sort_by(|a, b| {
        a.release_date
            .cmp(&b.release_date)
            .then_with(|| a.title.cmp(&b.title))
    });
    Ok(records)
}

/// Depth-first, first occurrence wins.
fn collect_table_ids(entry: &PublicationEntry) -> Result<Vec<TableId>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    push_unique(&entry.tables, &mut seen, &mut ids)?;
    for section in &entry.sections {
        collect_section(section, &mut seen, &mut ids)?;
    }
    Ok(ids)
}

fn collect_section(
    section: &CalendarSection,
    seen: &mut HashSet<TableId>,
    ids: &mut Vec<TableId>,
) -> Result<()> {
    push_unique(&section.tables, seen, ids)?;
    for child in &section.sections {
        collect_section(child, seen, ids)?;
    }
    Ok(())
}

fn push_unique(
    raw_ids: &[String],
    seen: &mut HashSet<TableId>,
    ids: &mut Vec<TableId>,
) -> Result<()> {
    for raw in raw_ids {
        let id = TableId::new(raw.as_str()).map_err(|_| {
            StatbankError::format_error(format!("publication references invalid table id {raw:?}"))
        })?;
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn trailing_range() {
        let range = DateRange::trailing("2025-05-02", Some(4)).unwrap();
        assert_eq!(range.from, date(2025, 4, 28));
        assert_eq!(range.to, date(2025, 5, 2));

        let single = DateRange::trailing("2025-05-02", None).unwrap();
        assert_eq!(single.from, single.to);
    }

    #[test]
    fn unparseable_dates_are_invalid_arguments() {
        for raw in ["", "02.05.2025", "2025-13-01", "tomorrow", "2025-02-30"] {
            assert_eq!(
                DateRange::trailing(raw, None).unwrap_err().kind(),
                ErrorKind::InvalidArgument,
                "{raw}"
            );
        }
    }

    #[test]
    fn records_are_sorted_filtered_and_deduplicated() {
        let response: CalendarResponse = serde_json::from_value(json!({
            "publications": [
                {"title": "Konsumprisindeksen", "releaseDate": "2025-05-02", "tables": ["03013"]},
                {"title": "Arbeidskraftundersøkelsen", "releaseDate": "2025-05-02",
                 "sections": [
                    {"name": "Sysselsetting", "tables": ["13760", "05111"],
                     "sections": [{"tables": ["13760", "08931"]}]},
                    {"name": "Ledighet", "tables": ["05111"]}
                 ]},
                {"title": "Befolkning", "releaseDate": "2025-04-30", "tables": ["07459"]},
                {"title": "Too old", "releaseDate": "2025-01-01", "tables": ["00000"]}
            ]
        }))
        .unwrap();

        let range = DateRange::trailing("2025-05-02", Some(3)).unwrap();
        let records = list_records(response, range).unwrap();

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Befolkning", "Arbeidskraftundersøkelsen", "Konsumprisindeksen"]
        );
        let aku: Vec<_> = records[1].table_ids.iter().map(TableId::as_str).collect();
        assert_eq!(aku, vec!["13760", "05111", "08931"]);
    }

    #[test]
    fn bad_release_date_fails_the_listing() {
        let response: CalendarResponse = serde_json::from_value(json!({
            "publications": [{"title": "Broken", "releaseDate": "soon"}]
        }))
        .unwrap();
        let range = DateRange::trailing("2025-05-02", None).unwrap();
        assert_eq!(
            list_records(response, range).unwrap_err().kind(),
            ErrorKind::UpstreamFormatError
        );
    }
}
