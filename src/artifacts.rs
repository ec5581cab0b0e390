//! File-based intermediate artifacts
//!
//! Stages hand work to each other only through these files: line-delimited
//! JSON for record streams, pretty JSON for the manifest and reports, and
//! CSV for ledgers that operators review by hand.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading or writing artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path} at line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize record for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

// ============================================================================
// Artifact locations
// ============================================================================

pub const EXPORT_FILE: &str = "wp_export.ndjson";
pub const SLUG_COLLISION_FILE: &str = "slug_collision_report.csv";
pub const IMAGE_MANIFEST_FILE: &str = "image_manifest.json";
pub const IMAGE_FAILURES_FILE: &str = "image_failures.csv";
pub const IMPORT_FILE: &str = "sanity_import.ndjson";
pub const IMPORT_FAILURES_FILE: &str = "import_failures.csv";
pub const PARITY_REPORT_FILE: &str = "parity_report.md";
pub const MIGRATION_REPORT_FILE: &str = "migration_report.json";

/// Where every stage reads and writes its artifacts
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
    redirects: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>, redirects: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            redirects: redirects.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn export(&self) -> PathBuf {
        self.dir.join(EXPORT_FILE)
    }

    pub fn slug_collisions(&self) -> PathBuf {
        self.dir.join(SLUG_COLLISION_FILE)
    }

    pub fn image_manifest(&self) -> PathBuf {
        self.dir.join(IMAGE_MANIFEST_FILE)
    }

    pub fn image_failures(&self) -> PathBuf {
        self.dir.join(IMAGE_FAILURES_FILE)
    }

    pub fn import(&self) -> PathBuf {
        self.dir.join(IMPORT_FILE)
    }

    pub fn import_failures(&self) -> PathBuf {
        self.dir.join(IMPORT_FAILURES_FILE)
    }

    pub fn parity_report(&self) -> PathBuf {
        self.dir.join(PARITY_REPORT_FILE)
    }

    pub fn migration_report(&self) -> PathBuf {
        self.dir.join(MIGRATION_REPORT_FILE)
    }

    pub fn redirects(&self) -> &Path {
        &self.redirects
    }
}

// ============================================================================
// NDJSON / JSON
// ============================================================================

fn ensure_parent(path: &Path) -> ArtifactResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write records as line-delimited JSON, replacing the file
pub fn write_ndjson<T: Serialize>(path: &Path, records: &[T]) -> ArtifactResult<()> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|e| ArtifactError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record).map_err(|source| ArtifactError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(writer, "{}", line).map_err(|e| ArtifactError::io(path, e))?;
    }
    writer.flush().map_err(|e| ArtifactError::io(path, e))
}

/// Read line-delimited JSON. A missing file reads as empty; blank lines are
/// ignored.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> ArtifactResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).map_err(|e| ArtifactError::io(path, e))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ArtifactError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write pretty JSON with a trailing newline.
///
/// The content goes to a sibling temp file first and is renamed into place,
/// so an interrupted flush never leaves a truncated manifest behind.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<()> {
    ensure_parent(path)?;
    let mut json = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| ArtifactError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ArtifactError::io(path, e))
}

/// Read a JSON file; `None` when it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> ArtifactResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })
}

/// Write plain text, creating parent directories
pub fn write_text(path: &Path, contents: &str) -> ArtifactResult<()> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|e| ArtifactError::io(path, e))
}

/// Read plain text; `None` when it does not exist
pub fn read_text(path: &Path) -> ArtifactResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| ArtifactError::io(path, e))
}

// ============================================================================
// CSV ledgers
// ============================================================================

/// A fixed-column CSV ledger.
///
/// Ledgers are always written, even with zero rows, so an empty file is
/// positive evidence that nothing failed.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    columns: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

impl CsvLedger {
    pub fn new(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; missing trailing cells are written empty
    pub fn push<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Render header plus rows
    pub fn render(&self) -> String {
        let mut out = self.columns.join(",");
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|c| csv_escape(c)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> ArtifactResult<()> {
        write_text(path, &self.render())
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parse CSV data rows (header skipped). Quoted cells may contain commas,
/// doubled quotes and newlines.
pub fn parse_csv_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if cell.is_empty() => in_quotes = true,
            (',', false) => row.push(std::mem::take(&mut cell)),
            ('\n', false) => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            ('\r', false) => {}
            _ => cell.push(c),
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    rows.into_iter()
        .skip(1)
        .filter(|r| !(r.len() == 1 && r[0].trim().is_empty()))
        .collect()
}

/// Read a CSV ledger's data rows; a missing file has none
pub fn read_csv_rows(path: &Path) -> ArtifactResult<Vec<Vec<String>>> {
    Ok(read_text(path)?
        .map(|text| parse_csv_rows(&text))
        .unwrap_or_default())
}

// ============================================================================
// Inventory
// ============================================================================

/// How an artifact's entries are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Ndjson,
    JsonMap,
    Csv,
    Text,
    Rules,
}

/// What is on disk for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub name: String,
    pub path: PathBuf,
    /// Stage that writes it
    pub produced_by: &'static str,
    pub exists: bool,
    pub bytes: u64,
    /// Records, manifest entries, ledger rows, rules or lines
    pub entries: usize,
}

fn count_entries(path: &Path, kind: ArtifactKind) -> ArtifactResult<usize> {
    let Some(text) = read_text(path)? else {
        return Ok(0);
    };
    let count = match kind {
        ArtifactKind::Ndjson | ArtifactKind::Text => {
            text.lines().filter(|l| !l.trim().is_empty()).count()
        }
        ArtifactKind::JsonMap => serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.as_object().map(|m| m.len()))
            .unwrap_or(0),
        ArtifactKind::Csv => parse_csv_rows(&text).len(),
        ArtifactKind::Rules => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .count(),
    };
    Ok(count)
}

/// Inspect every artifact, in pipeline order
pub fn inventory(paths: &ArtifactPaths) -> ArtifactResult<Vec<ArtifactStatus>> {
    let entries = [
        (paths.export(), "export", ArtifactKind::Ndjson),
        (paths.slug_collisions(), "export", ArtifactKind::Csv),
        (paths.image_manifest(), "images", ArtifactKind::JsonMap),
        (paths.image_failures(), "images", ArtifactKind::Csv),
        (paths.import(), "transform", ArtifactKind::Ndjson),
        (paths.import_failures(), "import", ArtifactKind::Csv),
        (paths.redirects().to_path_buf(), "redirects", ArtifactKind::Rules),
        (paths.parity_report(), "parity", ArtifactKind::Text),
        (paths.migration_report(), "parity", ArtifactKind::Text),
    ];

    entries
        .into_iter()
        .map(|(path, produced_by, kind)| {
            let meta = fs::metadata(&path).ok();
            Ok(ArtifactStatus {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                produced_by,
                exists: meta.is_some(),
                bytes: meta.map(|m| m.len()).unwrap_or(0),
                entries: count_entries(&path, kind)?,
                path,
            })
        })
        .collect()
}

/// First stage whose main output is missing; `None` once parity has run
pub fn next_stage(paths: &ArtifactPaths) -> Option<&'static str> {
    [
        (paths.export(), "export"),
        (paths.image_manifest(), "images"),
        (paths.import(), "transform"),
        (paths.import_failures(), "import"),
        (paths.redirects().to_path_buf(), "redirects"),
        (paths.migration_report(), "parity"),
    ]
    .into_iter()
    .find(|(path, _)| !path.exists())
    .map(|(_, stage)| stage)
}
