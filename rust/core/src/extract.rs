// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming component extraction.
//!
//! Reads an IFC file line by line, never holding more than one line (of at
//! most [`ExtractOptions::max_line_bytes`]) in memory, and collects every string literal that parses as a component tag.
//! Output is deduplicated by full tag (first occurrence wins) and kept in
//! first-seen order.

use memchr::memchr;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::scan::{has_quote, scan_line};
use crate::tag::parse_tag;

/// Default cap on extracted components per file.
pub const DEFAULT_MAX_COMPONENTS: usize = 50_000;

/// Literals shorter than this are never tag candidates.
pub const MIN_LITERAL_LEN: usize = 4;

/// Provenance marker recorded on every extracted component.
pub const PROVENANCE: &str = "ifc-text-scan";

/// Default bound on a single line. Longer lines are skipped unscanned.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Progress callback interval, in lines.
const PROGRESS_INTERVAL_LINES: u64 = 10_000;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Extraction settings.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Stop once this many components have been collected.
    pub max_components: usize,
    /// Lines longer than this are skipped and counted as oversized.
    pub max_line_bytes: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_components: DEFAULT_MAX_COMPONENTS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// A component found in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractedComponent {
    pub system_code: String,
    pub component_tag: String,
    pub full_tag: String,
    /// Identifier of the entity the tag was found on (GlobalId).
    pub source_guid: Option<String>,
    /// Uppercased IFC entity type (e.g. `IFCFLOWSEGMENT`).
    pub source_type: Option<String>,
    /// The literal the tag was parsed from.
    pub name: String,
    pub provenance: String,
}

/// Counters gathered during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractStats {
    pub lines_read: u64,
    pub bytes_read: u64,
    pub entity_lines: u64,
    pub literals_seen: u64,
    pub duplicates_dropped: u64,
    /// Lines over `max_line_bytes`, skipped without scanning.
    pub oversized_lines: u64,
    /// The component cap was reached before the end of the file.
    pub truncated: bool,
}

/// Components in first-seen order plus pass statistics.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub components: Vec<ExtractedComponent>,
    pub stats: ExtractStats,
}

/// Extract components from the IFC file at `path`.
pub fn extract_components(path: impl AsRef<Path>, options: &ExtractOptions) -> Result<Extraction> {
    extract_components_with_progress(path, options, |_| {})
}

/// Like [`extract_components`], calling `on_progress` with the number of
/// bytes consumed so far every few thousand lines.
pub fn extract_components_with_progress<F>(
    path: impl AsRef<Path>,
    options: &ExtractOptions,
    on_progress: F,
) -> Result<Extraction>
where
    F: FnMut(u64),
{
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    extract_from_reader_with_progress(reader, options, on_progress)
}

/// Extract components from any buffered reader.
pub fn extract_from_reader<R: BufRead>(reader: R, options: &ExtractOptions) -> Result<Extraction> {
    extract_from_reader_with_progress(reader, options, |_| {})
}

fn extract_from_reader_with_progress<R, F>(
    mut reader: R,
    options: &ExtractOptions,
    mut on_progress: F,
) -> Result<Extraction>
where
    R: BufRead,
    F: FnMut(u64),
{
    let mut extraction = Extraction::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut buf = Vec::with_capacity(4096);

    if options.max_components == 0 {
        extraction.stats.truncated = true;
        return Ok(extraction);
    }

    let limit = options.max_line_bytes as u64;

    'lines: loop {
        buf.clear();
        let n = reader.by_ref().take(limit.saturating_add(1)).read_until(b'\n', &mut buf)? as u64;
        if n == 0 {
            break;
        }
        let oversized = n > limit && buf.last() != Some(&b'\n');
        let skipped = if oversized { skip_line(&mut reader)? } else { 0 };

        let stats = &mut extraction.stats;
        stats.lines_read += 1;
        stats.bytes_read += n + skipped;
        if stats.lines_read % PROGRESS_INTERVAL_LINES == 0 {
            on_progress(stats.bytes_read);
        }

        if oversized {
            stats.oversized_lines += 1;
            continue;
        }

        if !has_quote(&buf) {
            continue;
        }

        // Non-UTF-8 bytes (legacy encoded names) become U+FFFD and simply
        // fail the grammar.
        let text = String::from_utf8_lossy(&buf);
        let scanned = scan_line(text.trim_end_matches(&['\r', '\n'][..]));
        if scanned.entity.is_some() {
            stats.entity_lines += 1;
        }

        for literal in &scanned.literals {
            stats.literals_seen += 1;
            if literal.chars().count() < MIN_LITERAL_LEN {
                continue;
            }
            let Some(parts) = parse_tag(literal) else {
                continue;
            };
            if seen.contains(&parts.full_tag) {
                stats.duplicates_dropped += 1;
                continue;
            }
            seen.insert(parts.full_tag.clone());

            let entity = scanned.entity.as_ref();
            extraction.components.push(ExtractedComponent {
                system_code: parts.system_code,
                component_tag: parts.component_tag,
                full_tag: parts.full_tag,
                source_guid: entity.and_then(|e| e.identifier.as_ref().map(|id| id.to_string())),
                source_type: entity.map(|e| e.type_name.clone()),
                name: literal.to_string(),
                provenance: PROVENANCE.to_string(),
            });

            if extraction.components.len() >= options.max_components {
                stats.truncated = true;
                break 'lines;
            }
        }
    }

    on_progress(extraction.stats.bytes_read);
    Ok(extraction)
}

/// Discard the rest of the current line, including its newline.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<u64> {
    let mut skipped = 0u64;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(skipped);
        }
        match memchr(b'\n', available) {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(skipped + i as u64 + 1);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len as u64;
            }
        }
    }
}
