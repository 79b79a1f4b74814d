// Latest export of the SDS token launches, kept as a single JSON file that
// the dashboard reads as its static data source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jiff::Zoned;
use log::info;

use crate::bigquery::client::{QueryError, Row, Warehouse};
use crate::document::{display_field, Document, SyncMetadata, SYNC_SOURCE};
use crate::error::{PersistAction, SyncError};
use crate::freshness::verify_data_freshness;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLaunchesArchive {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub json_path: PathBuf,
}

impl TokenLaunchesArchive {
    /// Fully qualified table name, `project.dataset.table`.
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }

    pub fn latest_export_query(&self) -> String {
        format!(
            r#"
SELECT
    json_data,
    record_count,
    last_updated,
    export_timestamp
FROM `{}`
ORDER BY export_timestamp DESC
LIMIT 1
"#,
            self.table_ref()
        )
    }

    /// Where the previous version of the json file goes, `<json_path>.backup`.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.json_path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Get the most recent export from the warehouse, stamped with the sync metadata.
    pub fn get_latest_data(&self, warehouse: &impl Warehouse) -> Result<Document, SyncError> {
        info!("Querying BigQuery: {}", self.table_ref());
        let rows = warehouse.query(&self.latest_export_query())?;
        let Some(row) = rows.first() else {
            return Err(SyncError::EmptyResult(self.table_ref()));
        };
        let doc = document_from_row(row, &Zoned::now())?;
        Ok(doc)
    }

    /// Move the current json file out of the way and write the new one.
    /// Returns the backup path if there was a file to back up.
    ///
    /// The rename and the write are separate steps.  If the write fails,
    /// only the backup is left.
    pub fn update_local_file(&self, doc: &Document) -> Result<Option<PathBuf>, SyncError> {
        let path = self.json_path.as_path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(persist_error(PersistAction::CreateDir, dir))?;
        }

        let json = doc
            .to_pretty_json()
            .map_err(|e| persist_error(PersistAction::Serialize, path)(io::Error::from(e)))?;

        let mut backup = None;
        if path.exists() {
            let backup_path = self.backup_path();
            fs::rename(path, &backup_path).map_err(persist_error(PersistAction::Backup, path))?;
            info!("Backed up existing file to: {}", backup_path.display());
            backup = Some(backup_path);
        }

        fs::write(path, json).map_err(persist_error(PersistAction::Write, path))?;
        info!("Updated local file: {}", path.display());
        info!("Records: {}", display_field(doc.record_count(), "Unknown"));

        Ok(backup)
    }

    /// Fetch, optionally check freshness, then persist.
    pub fn sync(&self, warehouse: &impl Warehouse, verify: bool) -> Result<Document, SyncError> {
        let doc = self.get_latest_data(warehouse)?;
        if verify {
            verify_data_freshness(&doc);
        }
        self.update_local_file(&doc)?;
        Ok(doc)
    }
}

/// Decode the `json_data` column and attach the sync provenance.
pub fn document_from_row(row: &Row, synced_at: &Zoned) -> Result<Document, SyncError> {
    let record_count = row.get_string("record_count")?;
    let last_updated = row.get_iso_datetime("last_updated")?;
    let export_timestamp = row.get_iso_datetime("export_timestamp")?;
    info!(
        "Found data: {} records, updated: {}",
        record_count.as_deref().unwrap_or("unknown"),
        last_updated.as_deref().unwrap_or("unknown")
    );

    let json_data = row
        .get_string("json_data")?
        .ok_or(QueryError::PayloadNotObject("null"))?;
    let mut doc = Document::from_json_str(&json_data)?;
    doc.stamp(&SyncMetadata {
        synced_at: synced_at
            .timestamp()
            .display_with_offset(synced_at.offset())
            .to_string(),
        source: SYNC_SOURCE.to_string(),
        bigquery_updated: last_updated,
        export_timestamp,
    });
    Ok(doc)
}

fn persist_error(action: PersistAction, path: &Path) -> impl FnOnce(io::Error) -> SyncError {
    let path = path.to_path_buf();
    move |source| SyncError::Persist {
        action,
        path,
        source,
    }
}
