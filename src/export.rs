//! CSV export of the version enumeration.
//!
//! The export is written while versions are being listed and is complete on
//! disk before any lock is touched, so an interrupted or failed run still
//! leaves a record of what the bucket contained.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::types::error::S3WipeError;
use crate::types::{EnumerationRecord, S3Object};

const EXPORT_HEADER: [&str; 3] = ["key", "version_id", "is_delete_marker"];

fn export_error(path: &Path, e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!(S3WipeError::Export(format!("{}: {e}", path.display())))
}

/// Streaming writer for the version export.
pub struct VersionExporter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl VersionExporter {
    /// Create (or truncate) the export file and write the header row.
    ///
    /// The header is written even when the bucket turns out to be empty.
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| export_error(path, e))?;
        writer
            .write_record(EXPORT_HEADER)
            .map_err(|e| export_error(path, e))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write(&mut self, object: &S3Object) -> Result<()> {
        self.writer
            .serialize(object.to_record())
            .map_err(|e| export_error(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush the export to disk and return the number of rows written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| export_error(&self.path, e))?;
        Ok(self.rows)
    }
}

/// Read an export back into records, in file order.
pub fn read_export(path: &Path) -> Result<Vec<EnumerationRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| export_error(path, e))?;
    reader
        .deserialize()
        .map(|record| record.map_err(|e| export_error(path, e)))
        .collect()
}
