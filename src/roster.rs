use crate::error::{ExportError, Result};
use crate::models::RosterEntry;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use std::fs::File;
use std::path::Path;

/// Lazily reads company entries from a roster CSV.
///
/// The first row is always discarded as a header. Malformed rows come out as
/// `MalformedInput` and iteration carries on; an IO failure comes out once as
/// `InputReadFailure` and ends the sequence.
pub struct RosterReader<R> {
    records: StringRecordsIntoIter<R>,
    header_rows_left: usize,
    finished: bool,
}

impl RosterReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ExportError::InputUnavailable(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self::from_reader(file))
    }
}

impl<R: std::io::Read> RosterReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader)
            .into_records();

        Self {
            records,
            header_rows_left: 1,
            finished: false,
        }
    }
}

impl<R: std::io::Read> Iterator for RosterReader<R> {
    type Item = Result<RosterEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.finished = true;
                    return Some(Err(ExportError::InputReadFailure(e)));
                }
                Err(e) => {
                    if self.header_rows_left > 0 {
                        self.header_rows_left -= 1;
                        continue;
                    }
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    return Some(Err(ExportError::MalformedInput {
                        line,
                        reason: e.to_string(),
                    }));
                }
            };

            if self.header_rows_left > 0 {
                self.header_rows_left -= 1;
                continue;
            }

            return Some(parse_entry(&record));
        }
    }
}

fn parse_entry(record: &StringRecord) -> Result<RosterEntry> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let malformed = |reason: String| ExportError::MalformedInput { line, reason };

    if record.len() < 2 {
        return Err(malformed(format!(
            "expected at least 2 fields, found {} in '{}'",
            record.len(),
            record.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let display_name = record[0].to_string();
    let api_credential = record[1].to_string();
    if api_credential.is_empty() {
        return Err(malformed(format!("missing API key for '{}'", display_name)));
    }

    let output_folder = match record.get(2) {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => display_name.clone(),
    };
    if !is_safe_segment(&output_folder) {
        return Err(malformed(format!(
            "unusable output folder '{}' for '{}'",
            output_folder, display_name
        )));
    }

    Ok(RosterEntry {
        line,
        display_name,
        api_credential,
        output_folder,
    })
}

/// A folder name that stays directly under the output root
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}
