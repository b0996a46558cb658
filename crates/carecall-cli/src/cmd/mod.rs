pub mod config;
pub mod init;
pub mod queue;
pub mod records;
pub mod report;
pub mod serve;
pub mod status;
pub mod validate;

use anyhow::Context;
use carecall_core::record::RecordDraft;
use serde::Deserialize;
use std::path::Path;

/// A batch file is either a bare list of rows or `{ records: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    List(Vec<RecordDraft>),
    Wrapped { records: Vec<RecordDraft> },
}

/// Read a YAML or JSON batch of normalized rows. The format follows the
/// file extension; anything but `.json` is parsed as YAML.
pub fn load_batch(path: &Path) -> anyhow::Result<Vec<RecordDraft>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let batch: BatchFile = if is_json {
        serde_json::from_str(&data).with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&data).with_context(|| format!("invalid YAML in {}", path.display()))?
    };
    Ok(match batch {
        BatchFile::List(records) | BatchFile::Wrapped { records } => records,
    })
}
