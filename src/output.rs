use crate::error::Result;
use crate::model::OutputType;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Day-partitioned data handed to a sink: `day -> key -> value`.
pub type Dated<T> = BTreeMap<NaiveDate, BTreeMap<String, T>>;

pub trait OutputSink {
    fn process_output<T: Serialize>(
        &self,
        output_type: OutputType,
        output_file: &Path,
        data: &Dated<T>,
    ) -> Result<()>;
}

/// Writes values as pretty JSON arrays, either all in `output_file` or one
/// file per day next to it (`<stem>_<yyyy-mm-dd>.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOutputProcessor;

impl OutputSink for JsonOutputProcessor {
    fn process_output<T: Serialize>(
        &self,
        output_type: OutputType,
        output_file: &Path,
        data: &Dated<T>,
    ) -> Result<()> {
        match output_type {
            OutputType::SingleFile => {
                let values: Vec<&T> = data.values().flat_map(|by_key| by_key.values()).collect();
                write_json(output_file, &values)
            }
            OutputType::MultipleFile => {
                for (day, by_key) in data {
                    let values: Vec<&T> = by_key.values().collect();
                    write_json(&per_day_path(output_file, *day), &values)?;
                }
                Ok(())
            }
        }
    }
}

pub fn per_day_path(output_file: &Path, day: NaiveDate) -> PathBuf {
    let stem = output_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = output_file
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("json");
    output_file.with_file_name(format!("{stem}_{}.{ext}", day.format("%Y-%m-%d")))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    tracing::info!(path = %path.display(), "wrote output");
    Ok(())
}
