// SPDX-License-Identifier: Apache-2.0

//! Delimited-text parsing shared by every CSV/TSV style dataset.

use crate::payload::{Payload, RawRecord};
use awardref_core::ProcessError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMode {
    /// The first row after the skipped lines names the columns.
    FirstRow,
    /// The source has no header row; columns are named here in order.
    Explicit(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedFormat {
    pub delimiter: char,
    pub quote: char,
    pub header: HeaderMode,
    /// Leading physical lines dropped before the header or first row.
    pub skip_lines: usize,
    /// Index of a skipped line whose trimmed text is the payload version.
    pub version_line: Option<usize>,
    /// Source column name to field name. Unmapped columns keep their name.
    pub field_map: BTreeMap<String, String>,
    pub trim_fields: bool,
}

impl Default for DelimitedFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            header: HeaderMode::FirstRow,
            skip_lines: 0,
            version_line: None,
            field_map: BTreeMap::new(),
            trim_fields: true,
        }
    }
}

impl DelimitedFormat {
    #[must_use]
    pub fn tsv() -> Self {
        Self {
            delimiter: '\t',
            ..Self::default()
        }
    }

    #[must_use]
    pub fn map_field(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_map.insert(column.into(), field.into());
        self
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Payload, ProcessError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProcessError(format!("payload is not valid utf-8: {e}")))?;
        self.parse(text)
    }

    pub fn parse(&self, text: &str) -> Result<Payload, ProcessError> {
        if let Some(idx) = self.version_line {
            if idx >= self.skip_lines {
                return Err(ProcessError(format!(
                    "version line {idx} must be one of the {} skipped lines",
                    self.skip_lines
                )));
            }
        }
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut rest = text;
        let mut version = None;
        for idx in 0..self.skip_lines {
            let (line, tail) = match rest.split_once('\n') {
                Some((line, tail)) => (line, tail),
                None => (rest, ""),
            };
            if Some(idx) == self.version_line {
                let v = line.trim();
                if !v.is_empty() {
                    version = Some(v.to_string());
                }
            }
            rest = tail;
        }

        let mut rows = split_rows(rest, self.delimiter, self.quote)?.into_iter();
        let headers: Vec<String> = match &self.header {
            HeaderMode::Explicit(names) => names.clone(),
            HeaderMode::FirstRow => match rows.next() {
                Some((_, header)) => header.into_iter().map(|h| h.trim().to_string()).collect(),
                None => Vec::new(),
            },
        };
        let fields: Vec<String> = headers
            .iter()
            .map(|h| self.field_map.get(h).cloned().unwrap_or_else(|| h.clone()))
            .collect();

        let mut records = Vec::new();
        for (line_no, row) in rows {
            if row.len() > fields.len() {
                return Err(ProcessError(format!(
                    "line {line_no}: {} fields, expected at most {}",
                    row.len(),
                    fields.len()
                )));
            }
            records.push(RawRecord::from_pairs(fields.iter().zip(row).map(
                |(field, value)| {
                    let value = if self.trim_fields {
                        value.trim().to_string()
                    } else {
                        value
                    };
                    (field.clone(), value)
                },
            )));
        }
        Ok(Payload { version, records })
    }
}

/// Splits `text` into rows of fields with RFC 4180 quoting: quoted fields may
/// contain delimiters, newlines and doubled quotes. Blank rows are dropped.
/// Each row carries the 1-based line it started on, relative to `text`.
fn split_rows(
    text: &str,
    delimiter: char,
    quote: char,
) -> Result<Vec<(usize, Vec<String>)>, ProcessError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1_usize;
    let mut row_line = 1_usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    field.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
            continue;
        }
        match c {
            c if c == quote && !field_started => {
                in_quotes = true;
                field_started = true;
            }
            c if c == delimiter => {
                row.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_row(&mut rows, &mut row, &mut field, row_line);
                field_started = false;
                line += 1;
                row_line = line;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }
    if in_quotes {
        return Err(ProcessError(format!(
            "line {row_line}: unterminated quoted field"
        )));
    }
    finish_row(&mut rows, &mut row, &mut field, row_line);
    Ok(rows)
}

fn finish_row(
    rows: &mut Vec<(usize, Vec<String>)>,
    row: &mut Vec<String>,
    field: &mut String,
    line: usize,
) {
    row.push(std::mem::take(field));
    let done = std::mem::take(row);
    let blank = done.len() == 1 && done[0].trim().is_empty();
    if !blank {
        rows.push((line, done));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_quotes_and_crlf() {
        let text = "ref,name,lat\r\nK-0001,\"Acadia, NP\",44.35\r\nK-0002,\"The \"\"Big\"\" Park\",\r\n";
        let payload = DelimitedFormat::default().parse(text).expect("parse");
        assert_eq!(payload.records.len(), 2);
        assert_eq!(payload.records[0].get("name"), Some("Acadia, NP"));
        assert_eq!(payload.records[1].get("name"), Some("The \"Big\" Park"));
        assert_eq!(payload.records[1].get("lat"), None);
    }

    #[test]
    fn quoted_fields_may_span_lines() {
        let text = "ref,notes\nA,\"line one\nline two\"\nB,plain\n";
        let payload = DelimitedFormat::default().parse(text).expect("parse");
        assert_eq!(payload.records.len(), 2);
        assert_eq!(payload.records[0].get("notes"), Some("line one\nline two"));
        assert_eq!(payload.records[1].get("ref"), Some("B"));
    }

    #[test]
    fn skipped_line_supplies_version_and_fields_are_renamed() {
        let text = "SOTA Summits List (Date=01/05/2024)\nSummitCode,SummitName\nG/LD-001,Scafell Pike\n";
        let format = DelimitedFormat {
            skip_lines: 1,
            version_line: Some(0),
            ..DelimitedFormat::default()
        }
        .map_field("SummitCode", "ref")
        .map_field("SummitName", "name");
        let payload = format.parse(text).expect("parse");
        assert_eq!(
            payload.version.as_deref(),
            Some("SOTA Summits List (Date=01/05/2024)")
        );
        assert_eq!(payload.records[0].get("ref"), Some("G/LD-001"));
        assert_eq!(payload.records[0].get("name"), Some("Scafell Pike"));
    }

    #[test]
    fn explicit_headers_and_tabs() {
        let format = DelimitedFormat {
            header: HeaderMode::Explicit(vec!["ref".to_string(), "name".to_string()]),
            ..DelimitedFormat::tsv()
        };
        let payload = format.parse("LH-0001\tPortland Bill\n\nLH-0002\tNeedles\n").expect("parse");
        assert_eq!(payload.records.len(), 2);
        assert_eq!(payload.records[1].get("name"), Some("Needles"));
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_rejected() {
        let payload = DelimitedFormat::default()
            .parse("a,b,c\n1\n")
            .expect("short row");
        assert_eq!(payload.records[0].get("a"), Some("1"));
        assert_eq!(payload.records[0].get("c"), None);

        let err = DelimitedFormat::default()
            .parse("a,b\n1,2\n1,2,3\n")
            .expect_err("long row");
        assert!(err.0.contains("line 3"), "unexpected: {err}");
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = DelimitedFormat::default()
            .parse("a,b\n1,\"open\n")
            .expect_err("unterminated");
        assert!(err.0.contains("unterminated"));
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let payload = DelimitedFormat::default()
            .parse("\u{feff}ref\nX\n")
            .expect("parse");
        assert_eq!(payload.records[0].get("ref"), Some("X"));
    }
}
