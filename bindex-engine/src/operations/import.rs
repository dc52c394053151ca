//! Bulk import from dump files
//!
//! Two input formats are accepted:
//! - text: one `key,value` pair per line, unsigned decimal, blank lines skipped
//! - binary: consecutive 16-byte records, `key(u64) | value(u64)`, in the
//!   same little-endian byte order as the index file itself
//!
//! A `(0,0)` pair is a sentinel and is never inserted. Input is parsed in
//! full before the first insert, so a rejected file leaves the index as it was.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult};
use crate::file_manager::IndexFile;
use crate::operations::insert::InsertOutcome;
use crate::storage::block::Backend;

/// Consecutive `(0,0)` text lines tolerated before the load is aborted
pub const MAX_CONSECUTIVE_SENTINELS: usize = 10;

/// Size of one binary dump record
pub const BINARY_RECORD_SIZE: usize = 16;

/// Dump file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// Decide from the content, see [`detect_format`]
    Auto,
    Text,
    Binary,
}

impl FromStr for ImportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ImportFormat::Auto),
            "text" | "csv" => Ok(ImportFormat::Text),
            "binary" | "bin" => Ok(ImportFormat::Binary),
            other => Err(format!("unknown import format '{}'", other)),
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportFormat::Auto => "auto",
            ImportFormat::Text => "text",
            ImportFormat::Binary => "binary",
        })
    }
}

/// Pairs parsed from a dump, sentinels already removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDump {
    pub pairs: Vec<(u64, u64)>,
    pub skipped: usize,
}

/// Result of a completed import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    /// Format actually used
    pub format: ImportFormat,
    pub inserted: usize,
    pub updated: usize,
    /// Sentinel pairs dropped
    pub skipped: usize,
}

/// Pick the dump format of `data`.
///
/// Empty input and UTF-8 input free of control bytes other than tab, CR and
/// LF is text, so a typo in a text dump fails at its line. Anything else is
/// binary when its length is a whole number of records, and rejected
/// otherwise.
pub fn detect_format(data: &[u8]) -> IndexResult<ImportFormat> {
    if looks_like_text(data) {
        return Ok(ImportFormat::Text);
    }
    if data.len() % BINARY_RECORD_SIZE == 0 {
        return Ok(ImportFormat::Binary);
    }
    Err(IndexError::InvalidImport {
        line: 0,
        reason: format!(
            "neither text nor binary: {} bytes is not a multiple of {}",
            data.len(),
            BINARY_RECORD_SIZE
        ),
    })
}

fn looks_like_text(data: &[u8]) -> bool {
    std::str::from_utf8(data).map_or(false, |text| {
        text.chars()
            .all(|c| !c.is_control() || matches!(c, '\t' | '\r' | '\n'))
    })
}

/// Parse a text dump. Line numbers in errors are 1-based.
pub fn parse_text(text: &str) -> IndexResult<ParsedDump> {
    let mut dump = ParsedDump::default();
    let mut consecutive = 0usize;

    for (number, line) in text.lines().enumerate() {
        let line_no = number + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let pair = parse_line(line).map_err(|reason| IndexError::InvalidImport {
            line: line_no,
            reason,
        })?;

        if pair == (0, 0) {
            consecutive += 1;
            if consecutive > MAX_CONSECUTIVE_SENTINELS {
                return Err(IndexError::ImportAborted {
                    line: line_no,
                    count: consecutive,
                });
            }
            dump.skipped += 1;
            continue;
        }

        consecutive = 0;
        dump.pairs.push(pair);
    }

    Ok(dump)
}

fn parse_line(line: &str) -> Result<(u64, u64), String> {
    let (key, value) = line
        .split_once(',')
        .ok_or_else(|| format!("expected 'key,value', found '{}'", line))?;
    let key = key
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("bad key '{}': {}", key.trim(), e))?;
    let value = value
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("bad value '{}': {}", value.trim(), e))?;
    Ok((key, value))
}

/// Parse a binary dump. Record numbers in errors are 1-based.
pub fn parse_binary(data: &[u8]) -> IndexResult<ParsedDump> {
    if data.len() % BINARY_RECORD_SIZE != 0 {
        return Err(IndexError::InvalidImport {
            line: data.len() / BINARY_RECORD_SIZE + 1,
            reason: format!(
                "trailing partial record of {} bytes",
                data.len() % BINARY_RECORD_SIZE
            ),
        });
    }

    let mut dump = ParsedDump::default();
    for record in data.chunks_exact(BINARY_RECORD_SIZE) {
        let key = LittleEndian::read_u64(&record[..8]);
        let value = LittleEndian::read_u64(&record[8..]);
        if (key, value) == (0, 0) {
            dump.skipped += 1;
        } else {
            dump.pairs.push((key, value));
        }
    }
    Ok(dump)
}

/// Parse a dump in the given (or detected) format
pub fn parse_dump(data: &[u8], format: ImportFormat) -> IndexResult<(ImportFormat, ParsedDump)> {
    let format = match format {
        ImportFormat::Auto => detect_format(data)?,
        explicit => explicit,
    };

    let dump = match format {
        ImportFormat::Binary => parse_binary(data)?,
        _ => {
            let text = std::str::from_utf8(data).map_err(|e| IndexError::InvalidImport {
                line: 0,
                reason: format!("text input is not UTF-8: {}", e),
            })?;
            parse_text(text)?
        }
    };
    Ok((format, dump))
}

impl<F: Backend> IndexFile<F> {
    /// Load every pair from a dump stream
    pub fn import_from<R: Read>(
        &mut self,
        reader: &mut R,
        format: ImportFormat,
    ) -> IndexResult<ImportReport> {
        self.ensure_usable()?;

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let (format, dump) = parse_dump(&data, format)?;
        debug!(
            "Parsed {} dump: {} pairs, {} sentinels",
            format,
            dump.pairs.len(),
            dump.skipped
        );

        let mut report = ImportReport {
            format,
            inserted: 0,
            updated: 0,
            skipped: dump.skipped,
        };
        for (key, value) in dump.pairs {
            match self.insert(key, value)? {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::Updated { .. } => report.updated += 1,
            }
        }
        Ok(report)
    }

    /// Load every pair from a dump file
    pub fn import_file(&mut self, path: &Path, format: ImportFormat) -> IndexResult<ImportReport> {
        let mut file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::NotFound(path.to_path_buf())
            } else {
                IndexError::Io(e)
            }
        })?;
        let report = self.import_from(&mut file, format)?;
        info!(
            "Loaded {}: {} inserted, {} updated, {} skipped",
            path.display(),
            report.inserted,
            report.updated,
            report.skipped
        );
        Ok(report)
    }
}
