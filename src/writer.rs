use crate::error::Result;
use crate::models::{OutputRow, OUTPUT_HEADER};
use csv::{Writer, WriterBuilder};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const PARTIAL_SUFFIX: &str = ".part";

/// Writes one company's export file.
///
/// Rows go to a `.part` file next to the target, which replaces the target
/// only on `finish`. A writer dropped before `finish` removes its `.part`
/// file and leaves any earlier export untouched.
pub struct ExportWriter {
    writer: Option<Writer<File>>,
    path: PathBuf,
    partial_path: PathBuf,
    rows: usize,
}

impl ExportWriter {
    /// Start `root/segment/file_name` with its header row
    pub fn create(root: &Path, segment: &str, file_name: &str) -> Result<Self> {
        let dir = root.join(segment);
        fs::create_dir_all(&dir)?;

        let path = dir.join(file_name);
        let partial_path = dir.join(format!("{}{}", file_name, PARTIAL_SUFFIX));

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&partial_path)?;
        writer.write_record(OUTPUT_HEADER)?;

        Ok(Self {
            writer: Some(writer),
            path,
            partial_path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a transaction's amount row followed by its fee row
    pub fn write_pair(&mut self, amount: &OutputRow, fee: &OutputRow) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.serialize(amount)?;
            writer.serialize(fee)?;
            self.rows += 2;
        }
        Ok(())
    }

    /// Flush and close the file, move it over the target and return the
    /// number of data rows written
    pub fn finish(mut self) -> Result<usize> {
        let Some(writer) = self.writer.take() else {
            return Ok(self.rows);
        };

        let committed = commit(writer, &self.partial_path, &self.path);
        if committed.is_err() {
            let _ = fs::remove_file(&self.partial_path);
        }
        committed.map(|_| self.rows)
    }
}

fn commit(writer: Writer<File>, partial_path: &Path, path: &Path) -> Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(partial_path, path)?;
    Ok(())
}

impl Drop for ExportWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}
