use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::aggregate::normalize_issue_name;
use crate::error::{PrioritizerError, Result};
use crate::models::{
    IssueCategory, IssueMetadata, IssueOccurrence, IssuePriority, IssueTable, TrafficRecord,
};

pub const ISSUES_TABLE: &str = "issues";
pub const OVERVIEW_TABLE: &str = "overview";
pub const TRAFFIC_TABLE: &str = "traffic";

/// Issue tables that loaded, plus the per-file failures that were recovered.
#[derive(Debug, Default)]
pub struct IssueLoad {
    pub tables: Vec<IssueTable>,
    pub errors: Vec<PrioritizerError>,
    pub skipped_files: usize,
    pub dropped_rows: usize,
}

impl IssueLoad {
    pub fn occurrence_count(&self) -> usize {
        self.tables.iter().map(|table| table.rows.len()).sum()
    }
}

/// Header positions for one table, resolved once at load time.
struct Columns<'a> {
    table: &'a str,
    headers: Vec<String>,
}

impl<'a> Columns<'a> {
    fn new(table: &'a str, record: &csv::StringRecord) -> Self {
        let headers = record
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        Self { table, headers }
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.optional(name)
            .ok_or_else(|| PrioritizerError::schema(self.table, name))
    }
}

/// Reads a file as UTF-8, falling back to Latin-1 when it is not valid UTF-8.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(file = %path.display(), "invalid UTF-8, decoding as Latin-1");
            Ok(err.into_bytes().iter().map(|&byte| char::from(byte)).collect())
        }
    }
}

fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn is_artifact(name: &str) -> bool {
    name.starts_with('.')
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// The issue type key is the file name up to its first dot.
pub fn issue_type_key(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Loads every per-issue-type export in `dir`.
///
/// Unreadable files are recorded in [`IssueLoad::errors`] and skipped. A file
/// that parses but has no `Address` column aborts the run. Fails with
/// `MissingInput` when no table loads at all.
pub fn load_issue_tables(dir: &Path) -> Result<IssueLoad> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    entries.sort();

    let mut load = IssueLoad::default();

    for path in entries {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            load.skipped_files += 1;
            continue;
        };
        if is_artifact(name) || !path.is_file() || !is_csv(&path) {
            debug!(file = name, "skipping non-data file");
            load.skipped_files += 1;
            continue;
        }

        let key = issue_type_key(name).to_string();
        match load_issue_table(&path, &key) {
            Ok((table, dropped)) => {
                info!(file = name, rows = table.rows.len(), dropped, "loaded issue table");
                load.dropped_rows += dropped;
                load.tables.push(table);
            }
            Err(err @ PrioritizerError::Schema { .. }) => return Err(err),
            Err(err) => {
                warn!(file = name, error = %err, "skipping unreadable issue file");
                let err = match err {
                    err @ PrioritizerError::Load { .. } => err,
                    other => PrioritizerError::load(&path, other),
                };
                load.errors.push(err);
            }
        }
    }

    if load.tables.is_empty() {
        return Err(PrioritizerError::MissingInput(format!(
            "no issue files could be loaded from {}",
            dir.display()
        )));
    }

    Ok(load)
}

/// Loads one issue export, returning the table and the number of rows dropped
/// for lacking an address.
fn load_issue_table(path: &Path, key: &str) -> Result<(IssueTable, usize)> {
    let text = read_text(path)?;
    let mut reader = csv_reader(&text);
    let columns = Columns::new(ISSUES_TABLE, reader.headers()?);
    if columns.headers.iter().all(|header| header.is_empty()) {
        return Err(PrioritizerError::load(path, "empty file"));
    }
    let address_idx = columns.require("Address")?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > columns.headers.len() {
            return Err(PrioritizerError::load(
                path,
                format!(
                    "row {} has {} fields, expected {}",
                    index + 1,
                    record.len(),
                    columns.headers.len()
                ),
            ));
        }
        let address = record.get(address_idx).unwrap_or("").trim();
        if address.is_empty() {
            dropped += 1;
            continue;
        }

        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
        fields.resize(columns.headers.len(), String::new());

        rows.push(IssueOccurrence {
            address: address.to_string(),
            issue_type_key: key.to_string(),
            fields,
        });
    }

    Ok((
        IssueTable {
            issue_type_key: key.to_string(),
            headers: columns.headers,
            rows,
        },
        dropped,
    ))
}

fn parse_number(
    table: &str,
    row: usize,
    column: &str,
    raw: &str,
) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let (digits, scale) = match trimmed.strip_suffix('%') {
        Some(stripped) => (stripped.trim(), 100.0),
        None => (trimmed, 1.0),
    };
    digits
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| Some(value / scale))
        .ok_or_else(|| PrioritizerError::InvalidValue {
            table: table.to_string(),
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_count(table: &str, row: usize, column: &str, raw: &str) -> Result<u64> {
    match parse_number(table, row, column, raw)? {
        None => Ok(0),
        Some(value) if value >= 0.0 => Ok(value.round() as u64),
        Some(_) => Err(PrioritizerError::InvalidValue {
            table: table.to_string(),
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

pub fn load_overview(path: &Path) -> Result<Vec<IssueMetadata>> {
    let text = read_text(path)?;
    parse_overview(&text)
}

pub fn parse_overview(text: &str) -> Result<Vec<IssueMetadata>> {
    let mut reader = csv_reader(text);
    let columns = Columns::new(OVERVIEW_TABLE, reader.headers()?);
    let name_idx = columns.require("Issue Name")?;
    let type_idx = columns.require("Issue Type")?;
    let priority_idx = columns.require("Issue Priority")?;
    let pct_idx = columns.require("% of Total")?;

    let mut metadata = Vec::new();
    let mut seen = HashSet::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let issue_name = cell(name_idx).trim();
        if issue_name.is_empty() {
            continue;
        }

        let invalid = |column: &str, value: &str| PrioritizerError::InvalidValue {
            table: OVERVIEW_TABLE.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
        };
        let issue_category: IssueCategory = cell(type_idx)
            .parse()
            .map_err(|_| invalid("Issue Type", cell(type_idx)))?;
        let issue_priority: IssuePriority = cell(priority_idx)
            .parse()
            .map_err(|_| invalid("Issue Priority", cell(priority_idx)))?;
        let pct_of_total = parse_number(OVERVIEW_TABLE, row, "% of Total", cell(pct_idx))?;

        let issue_type_normalized = normalize_issue_name(issue_name);
        if !seen.insert(issue_type_normalized.clone()) {
            warn!(issue = issue_name, "duplicate overview entry, keeping the first");
            continue;
        }

        metadata.push(IssueMetadata {
            issue_name: issue_name.to_string(),
            issue_type_normalized,
            issue_category,
            issue_priority,
            pct_of_total,
        });
    }

    Ok(metadata)
}

pub fn load_traffic(path: &Path) -> Result<Vec<TrafficRecord>> {
    let text = read_text(path)?;
    parse_traffic(&text)
}

pub fn parse_traffic(text: &str) -> Result<Vec<TrafficRecord>> {
    let mut reader = csv_reader(text);
    let columns = Columns::new(TRAFFIC_TABLE, reader.headers()?);
    let address_idx = columns.require("Address")?;
    let clicks_idx = columns.require("Clicks")?;
    let impressions_idx = columns.optional("Impressions");
    let ctr_idx = columns.optional("CTR");
    let position_idx = columns.optional("Position");

    let mut records = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let cell = |idx: Option<usize>| idx.and_then(|idx| record.get(idx)).unwrap_or("");

        let address = cell(Some(address_idx)).trim();
        if address.is_empty() {
            continue;
        }

        records.push(TrafficRecord {
            address: address.to_string(),
            clicks: parse_count(TRAFFIC_TABLE, row, "Clicks", cell(Some(clicks_idx)))?,
            impressions: parse_count(TRAFFIC_TABLE, row, "Impressions", cell(impressions_idx))?,
            ctr: parse_number(TRAFFIC_TABLE, row, "CTR", cell(ctr_idx))?,
            position: parse_number(TRAFFIC_TABLE, row, "Position", cell(position_idx))?,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, contents: &[u8]) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn keys_come_from_file_names() {
        assert_eq!(issue_type_key("missing_title.csv"), "missing_title");
        assert_eq!(issue_type_key("h1_multiple.v2.csv"), "h1_multiple");
    }

    #[test]
    fn drops_rows_without_address() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "missing_title.csv",
            b"Address,Indexability\nhttps://a.test/,Indexable\n,Indexable\n  ,x\nhttps://b.test/,Non-Indexable\n",
        );

        let load = load_issue_tables(dir.path()).unwrap();
        assert_eq!(load.tables.len(), 1);
        assert_eq!(load.dropped_rows, 2);
        let table = &load.tables[0];
        assert_eq!(table.issue_type_key, "missing_title");
        assert_eq!(table.headers, vec!["Address", "Indexability"]);
        let addresses: Vec<&str> = table.rows.iter().map(|row| row.address.as_str()).collect();
        assert_eq!(addresses, vec!["https://a.test/", "https://b.test/"]);
    }

    #[test]
    fn skips_artifacts_and_non_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "._missing_title.csv", b"\x00\x05\x16\x07");
        write(dir.path(), ".DS_Store", b"\x00");
        write(dir.path(), "notes.txt", b"hello");
        write(dir.path(), "missing_title.csv", b"Address\nhttps://a.test/\n");

        let load = load_issue_tables(dir.path()).unwrap();
        assert_eq!(load.tables.len(), 1);
        assert_eq!(load.skipped_files, 3);
        assert!(load.errors.is_empty());
    }

    #[test]
    fn falls_back_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "missing_h1.csv",
            b"Address,Title 1\nhttps://a.test/caf\xe9,Caf\xe9\n",
        );

        let load = load_issue_tables(dir.path()).unwrap();
        let row = &load.tables[0].rows[0];
        assert_eq!(row.address, "https://a.test/café");
        assert_eq!(row.fields[1], "Café");
    }

    #[test]
    fn recovers_from_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.csv", b"Address\nhttps://a.test/\n");
        write(dir.path(), "broken.csv", b"Address\nhttps://b.test/,extra\n");

        let load = load_issue_tables(dir.path()).unwrap();
        assert_eq!(load.tables.len(), 1);
        assert_eq!(load.tables[0].issue_type_key, "good");
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(load.errors[0], PrioritizerError::Load { .. }));
    }

    #[test]
    fn empty_issue_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.csv", b"Address\nhttps://a.test/\n");
        write(dir.path(), "empty.csv", b"");

        let load = load_issue_tables(dir.path()).unwrap();
        assert_eq!(load.tables.len(), 1);
        assert_eq!(load.errors.len(), 1);
        assert!(load.errors[0].to_string().contains("empty file"));
    }

    #[test]
    fn empty_directory_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "._ignored.csv", b"x");
        let err = load_issue_tables(dir.path()).unwrap_err();
        assert!(matches!(err, PrioritizerError::MissingInput(_)));
    }

    #[test]
    fn issue_file_without_address_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "missing_title.csv", b"URL\nhttps://a.test/\n");
        let err = load_issue_tables(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            PrioritizerError::Schema { ref table, ref column } if table == "issues" && column == "Address"
        ));
    }

    #[test]
    fn parses_overview_rows() {
        let text = "\u{feff}Issue Name,Issue Type,Issue Priority,URLs,% of Total\n\
                    Security: Missing HSTS Header,Warning,Low,10,12.5\n\
                    Page Titles: Missing,Issue,High,4,5\n";
        let metadata = parse_overview(text).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].issue_type_normalized, "security_missing_hsts_header");
        assert_eq!(metadata[0].issue_category, IssueCategory::Warning);
        assert_eq!(metadata[1].issue_priority, IssuePriority::High);
        assert_eq!(metadata[1].pct_of_total, Some(5.0));
    }

    #[test]
    fn overview_rejects_unknown_priority() {
        let text = "Issue Name,Issue Type,Issue Priority,% of Total\nX,Issue,Urgent,1\n";
        let err = parse_overview(text).unwrap_err();
        assert!(matches!(
            err,
            PrioritizerError::InvalidValue { ref column, row: 1, .. } if column == "Issue Priority"
        ));
    }

    #[test]
    fn overview_requires_columns() {
        let err = parse_overview("Issue Name,Issue Type\nX,Issue\n").unwrap_err();
        assert!(matches!(err, PrioritizerError::Schema { ref column, .. } if column == "Issue Priority"));
    }

    #[test]
    fn parses_traffic_rows() {
        let text = "Address,Clicks,Impressions,CTR,Position\n\
                    https://a.test/,1200,30000,0.04,3.2\n\
                    https://b.test/,,,,\n\
                    https://c.test/,\"1,024\",5000,2.5%,8\n";
        let traffic = parse_traffic(text).unwrap();
        assert_eq!(traffic.len(), 3);
        assert_eq!(traffic[0].clicks, 1200);
        assert_eq!(traffic[0].ctr, Some(0.04));
        assert_eq!(traffic[1].clicks, 0);
        assert_eq!(traffic[1].position, None);
        assert_eq!(traffic[2].clicks, 1024);
        assert_eq!(traffic[2].ctr, Some(0.025));
    }

    #[test]
    fn traffic_requires_clicks() {
        let err = parse_traffic("Address,Impressions\nhttps://a.test/,4\n").unwrap_err();
        assert!(matches!(
            err,
            PrioritizerError::Schema { ref table, ref column } if table == "traffic" && column == "Clicks"
        ));
    }

    #[test]
    fn traffic_rejects_negative_clicks() {
        let err = parse_traffic("Address,Clicks\nhttps://a.test/,-3\n").unwrap_err();
        assert!(matches!(err, PrioritizerError::InvalidValue { .. }));
    }
}
