// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of raw object bytes into record contents.

use std::borrow::Cow;
use std::io::Read;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProcessingError;
use crate::rules::processing::{LogFormat, ProcessingRule};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Record contents of one object, in source order.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedEntries {
    pub entries: Vec<String>,
    /// Lines of a `json_stream` object that were not valid JSON.
    pub malformed: usize,
}

/// Transparently decodes gzip and zstd content, detected by magic bytes.
pub fn decompress(data: &[u8]) -> Result<Cow<'_, [u8]>, ProcessingError> {
    if data.starts_with(GZIP_MAGIC) {
        debug!("Decompressing gzip content");
        let mut decoded = Vec::new();
        flate2::read::MultiGzDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(ProcessingError::Decompress)?;
        return Ok(Cow::Owned(decoded));
    }
    if data.starts_with(ZSTD_MAGIC) {
        debug!("Decompressing zstd content");
        let decoded = zstd::decode_all(data).map_err(ProcessingError::Decompress)?;
        return Ok(Cow::Owned(decoded));
    }
    Ok(Cow::Borrowed(data))
}

/// Splits decompressed content into records as described by `rule`.
pub fn parse_entries(rule: &ProcessingRule, data: &[u8]) -> Result<ParsedEntries, ProcessingError> {
    match rule.log_format {
        LogFormat::Text => Ok(parse_text(data, rule.skip_header_lines)),
        LogFormat::JsonStream => Ok(parse_json_stream(data, rule.skip_header_lines)),
        LogFormat::Json => parse_json(data, rule.log_entries_key.as_deref()),
    }
}

fn lines(text: &str, skip_header_lines: usize) -> impl Iterator<Item = &str> {
    text.lines()
        .skip(skip_header_lines)
        .filter(|line| !line.trim().is_empty())
}

fn parse_text(data: &[u8], skip_header_lines: usize) -> ParsedEntries {
    let text = String::from_utf8_lossy(data);
    ParsedEntries {
        entries: lines(&text, skip_header_lines)
            .map(ToString::to_string)
            .collect(),
        malformed: 0,
    }
}

fn parse_json_stream(data: &[u8], skip_header_lines: usize) -> ParsedEntries {
    let text = String::from_utf8_lossy(data);
    let mut parsed = ParsedEntries::default();
    for (index, line) in lines(&text, skip_header_lines).enumerate() {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.entries.push(value_content(value)),
            Err(e) => {
                warn!("Skipping malformed JSON record #{}: {}", index + 1, e);
                parsed.malformed += 1;
            }
        }
    }
    parsed
}

fn parse_json(data: &[u8], log_entries_key: Option<&str>) -> Result<ParsedEntries, ProcessingError> {
    let document: Value = serde_json::from_slice(data).map_err(ProcessingError::Json)?;

    let entries = match log_entries_key {
        Some(pointer) => match document.pointer(pointer) {
            None => {
                debug!("Log entries key {} not found in document", pointer);
                Vec::new()
            }
            Some(Value::Array(entries)) => entries.iter().cloned().map(value_content).collect(),
            Some(_) => {
                return Err(ProcessingError::LogEntriesNotArray {
                    pointer: pointer.to_string(),
                })
            }
        },
        None => match document {
            Value::Array(entries) => entries.into_iter().map(value_content).collect(),
            other => vec![value_content(other)],
        },
    };

    Ok(ParsedEntries {
        entries,
        malformed: 0,
    })
}

/// Strings are forwarded verbatim, anything else as compact JSON.
fn value_content(value: Value) -> String {
    match value {
        Value::String(content) => content,
        other => other.to_string(),
    }
}
