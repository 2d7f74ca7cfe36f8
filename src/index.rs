//! Full-text index (`form.idx`) reader.
//!
//! The index is a fixed-width manifest: a ten-line preamble, then one
//! filing per line with columns at fixed byte offsets and no delimiters.
//! Only 10-K and 10-Q rows are kept; every other row is skipped without
//! error.

use crate::{AccessionNumber, Cik, Error, FormType, IndexEntry, Result};
use chrono::NaiveDate;
use log::debug;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Preamble length of the archive's index files.
pub const HEADER_LINES: usize = 10;

/// A named byte range within one index line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    pub name: &'static str,
    pub start: usize,
    /// `None` runs to the end of the line.
    pub end: Option<usize>,
    pub trim: bool,
}

impl FieldRange {
    pub const fn new(name: &'static str, start: usize, end: usize) -> Self {
        Self {
            name,
            start,
            end: Some(end),
            trim: true,
        }
    }

    pub const fn to_end(name: &'static str, start: usize) -> Self {
        Self {
            name,
            start,
            end: None,
            trim: true,
        }
    }

    /// Keep the slice exactly as it appears, padding included.
    pub const fn raw(mut self) -> Self {
        self.trim = false;
        self
    }

    fn required_len(&self) -> usize {
        self.end.unwrap_or(self.start)
    }

    fn slice<'a>(&self, line: &'a [u8]) -> Option<&'a [u8]> {
        match self.end {
            Some(end) => line.get(self.start..end),
            None => line.get(self.start..),
        }
    }

    /// Like `slice` but clamps to the line; never fails.
    fn slice_clamped<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        let end = self.end.unwrap_or(line.len()).min(line.len());
        line.get(self.start.min(end)..end).unwrap_or_default()
    }
}

/// Column layout of an index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLayout {
    pub form_type: FieldRange,
    pub company_name: FieldRange,
    pub cik: FieldRange,
    pub date_filed: FieldRange,
    pub filename: FieldRange,
}

impl IndexLayout {
    /// Layout of the form-sorted index (`form.idx`).
    pub const FORM_IDX: IndexLayout = IndexLayout {
        form_type: FieldRange::new("form type", 0, 12),
        company_name: FieldRange::new("company name", 12, 74).raw(),
        cik: FieldRange::new("cik", 74, 86),
        date_filed: FieldRange::new("date filed", 86, 96),
        filename: FieldRange::to_end("file name", 98),
    };

    /// Decodes one data line. `Ok(None)` means the line was filtered out.
    pub fn decode(&self, line: &[u8], number: usize) -> Result<Option<IndexEntry>> {
        let fields = LineFields { line, number };

        let form_type = decode_field(self.form_type.slice_clamped(line));
        let Some(form_type) = FormType::from_index_field(form_type.trim()) else {
            return Ok(None);
        };

        let company_name = fields.get(&self.company_name)?.into_owned();

        let cik_field = fields.get(&self.cik)?;
        let cik = cik_field
            .parse::<Cik>()
            .map_err(|e| fields.error(format!("invalid cik {:?}: {}", cik_field, e)))?;

        let date_field = fields.get(&self.date_filed)?;
        let date_filed = parse_date(&date_field)
            .ok_or_else(|| fields.error(format!("invalid filing date {:?}", date_field)))?;

        let filename = fields.get(&self.filename)?;
        let accession_number =
            AccessionNumber::from_path(&filename).map_err(|e| fields.error(e.to_string()))?;

        Ok(Some(IndexEntry {
            form_type,
            company_name,
            cik,
            date_filed,
            accession_number,
        }))
    }
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self::FORM_IDX
    }
}

struct LineFields<'a> {
    line: &'a [u8],
    number: usize,
}

impl<'a> LineFields<'a> {
    fn get(&self, range: &FieldRange) -> Result<Cow<'a, str>> {
        let bytes = range.slice(self.line).ok_or_else(|| {
            self.error(format!(
                "line is {} bytes, {} needs at least {}",
                self.line.len(),
                range.name,
                range.required_len()
            ))
        })?;

        let text = decode_field(bytes);
        if !range.trim {
            return Ok(text);
        }
        Ok(match text {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
            Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
        })
    }

    fn error(&self, reason: String) -> Error {
        Error::Index {
            line: self.number,
            reason,
        }
    }
}

/// UTF-8 when valid, otherwise Latin-1 so every byte keeps one character.
fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Strict `yyyy-mm-dd`.
fn parse_date(field: &str) -> Option<NaiveDate> {
    let b = field.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(field, "%Y-%m-%d").ok()
}

/// Lazy pass over an index stream.
///
/// The header is skipped relative to the stream position at construction.
/// The stream is never closed or rewound; pass `&mut reader` to keep it.
/// A bad retained line yields one `Err` and iteration may continue.
pub struct IndexEntries<R> {
    reader: R,
    layout: IndexLayout,
    buf: Vec<u8>,
    line: usize,
    kept: usize,
    filtered: usize,
    done: bool,
}

impl<R: BufRead> IndexEntries<R> {
    pub fn new(reader: R) -> Self {
        Self::with_layout(reader, IndexLayout::FORM_IDX)
    }

    pub fn with_layout(reader: R, layout: IndexLayout) -> Self {
        Self {
            reader,
            layout,
            buf: Vec::with_capacity(160),
            line: 0,
            kept: 0,
            filtered: 0,
            done: false,
        }
    }

    /// 1-based number of the last line read.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for IndexEntries<R> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    debug!(
                        "index scan finished after {} lines: {} kept, {} filtered",
                        self.line, self.kept, self.filtered
                    );
                    return None;
                }
                Ok(_) => self.line += 1,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }

            if self.line <= HEADER_LINES {
                continue;
            }

            let line = strip_line_ending(&self.buf);
            match self.layout.decode(line, self.line) {
                Ok(Some(entry)) => {
                    self.kept += 1;
                    return Some(Ok(entry));
                }
                Ok(None) => self.filtered += 1,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Reads every entry from the stream's current position, failing on the
/// first malformed retained line.
pub fn parse_index<R: BufRead>(reader: R) -> Result<Vec<IndexEntry>> {
    IndexEntries::new(reader).collect()
}

pub fn parse_index_file<P: AsRef<Path>>(path: P) -> Result<Vec<IndexEntry>> {
    let file = File::open(path)?;
    parse_index(BufReader::new(file))
}

/// Parses several index files concurrently, one result per path.
#[cfg(feature = "parallel")]
pub fn parse_index_files<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Result<Vec<IndexEntry>>> {
    use rayon::prelude::*;

    paths.par_iter().map(parse_index_file).collect()
}
