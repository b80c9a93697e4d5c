//! Results export.
//!
//! A run leaves two files side by side in the output directory:
//! - `readout_{YYYY-MM-DD-HHMM}.csv`: one row per (project, URL) with every
//!   reported field merged across templates.
//! - `readout_{YYYY-MM-DD-HHMM}.json`: the raw result table, answer text
//!   included.
//!
//! A second export within the same minute replaces the first.

use std::path::{Path, PathBuf};

use pagewise_core::{ConsolidatedRow, ContentCache, Error, ResultTable};

/// Paths of the files written by [`write_results`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Output file stem for a run finished at `stamp`.
pub fn readout_stem(stamp: chrono::DateTime<chrono::Local>) -> String {
    format!("readout_{}", stamp.format("%Y-%m-%d-%H%M"))
}

/// Render consolidated rows as CSV with a `name,url,<fields...>` header.
///
/// Field columns are the sorted union of every row's fields; multiple values
/// share one cell, joined with `", "`.
pub fn render_readout_csv(rows: &[ConsolidatedRow]) -> Result<String, Error> {
    let fields = ResultTable::field_names(rows);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header = ["name", "url"].into_iter().chain(fields.iter().map(String::as_str));
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        let mut record = vec![row.project.clone(), row.url.clone()];
        record.extend(fields.iter().map(|f| row.joined(f)));
        writer.write_record(&record).map_err(csv_error)?;
    }

    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidInput(format!("readout is not UTF-8: {e}")))
}

/// Write the consolidated CSV readout and the raw JSON table to `output_dir`.
pub async fn write_results(writer: &ContentCache, output_dir: &Path, table: &ResultTable) -> Result<Readout, Error> {
    let stem = readout_stem(chrono::Local::now());
    let rows = table.consolidate();

    let csv = output_dir.join(format!("{stem}.csv"));
    writer.write_atomic(&csv, &render_readout_csv(&rows)?).await?;

    let json = output_dir.join(format!("{stem}.json"));
    writer.write_atomic(&json, &serde_json::to_string_pretty(table)?).await?;

    tracing::info!(csv = %csv.display(), json = %json.display(), rows = rows.len(), "results written");
    Ok(Readout { csv, json })
}

fn csv_error(err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::InvalidInput(format!("readout row could not be written: {other:?}")),
    }
}
