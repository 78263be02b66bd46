//! Minimal comma-separated text reader shared by the point table and the
//! color map: one record per line, double-quoted fields with `""` escapes.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// Case-insensitive check of the final extension of `path`.
pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Open a text file, transparently gunzipping `.gz` files.
pub(crate) fn open_text(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if has_extension(path, "gz") {
        Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

/// Split one line into fields.
pub(crate) fn split_record(line: &str) -> Result<Vec<String>, &'static str> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field");
    }

    fields.push(field);
    Ok(fields)
}

/// Header row plus an iterator of `(line_number, fields)` for every
/// non-blank data line. Line numbers are 1-based.
pub(crate) struct CsvText<R> {
    pub header: Vec<String>,
    lines: std::iter::Enumerate<std::io::Lines<BufReader<R>>>,
}

impl<R: Read> CsvText<R> {
    /// Returns `Ok(None)` for an input with no header line.
    pub fn open(reader: R) -> std::io::Result<Option<Result<Self, (usize, &'static str)>>> {
        let mut lines = BufReader::new(reader).lines().enumerate();

        while let Some((index, line)) = lines.next() {
            let line = line?;
            let trimmed = line.trim_start_matches('\u{feff}');
            if trimmed.trim().is_empty() {
                continue;
            }

            let header = match split_record(trimmed) {
                Ok(fields) => fields.into_iter().map(|f| f.trim().to_owned()).collect(),
                Err(msg) => return Ok(Some(Err((index + 1, msg)))),
            };

            return Ok(Some(Ok(Self { header, lines })));
        }

        Ok(None)
    }

    /// Index of the first header column matching any of `names`.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|name| self.header.iter().position(|h| h == name))
    }
}

impl<R: Read> Iterator for CsvText<R> {
    type Item = std::io::Result<(usize, Result<Vec<String>, &'static str>)>;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, line) in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };

            if line.trim().is_empty() {
                continue;
            }

            return Some(Ok((index + 1, split_record(&line))));
        }

        None
    }
}
