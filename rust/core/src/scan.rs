// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line-level STEP scanning.
//!
//! Works on one physical line at a time: recognizes entity headers
//! (`#10=IFCFLOWSEGMENT(...`) and pulls out single-quoted string literals.
//! Nothing here allocates unless a literal contains an escaped quote.

use memchr::memchr;
use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use smallvec::SmallVec;
use std::borrow::Cow;

/// Upper bound on literals collected from a single line.
pub const MAX_LITERALS_PER_LINE: usize = 64;

/// STEP marker for an unset attribute.
pub const UNSET_MARKER: char = '$';

const QUOTE: u8 = b'\'';

/// Literals found on one line, usually only a handful.
pub type Literals<'a> = SmallVec<[Cow<'a, str>; 8]>;

/// Entity header: `#<id>=<TYPE>(` plus the first attribute when it is quoted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHeader<'a> {
    pub id: u32,
    /// Uppercased entity type name, e.g. `IFCFLOWSEGMENT`.
    pub type_name: String,
    /// First attribute if it is a non-empty string (GlobalId for rooted entities).
    pub identifier: Option<Cow<'a, str>>,
}

/// Result of scanning one line.
#[derive(Debug, Clone, Default)]
pub struct ScannedLine<'a> {
    pub entity: Option<EntityHeader<'a>>,
    pub literals: Literals<'a>,
}

/// Quick reject: does the line contain a quote at all?
#[inline]
pub fn has_quote(line: &[u8]) -> bool {
    memchr(QUOTE, line).is_some()
}

/// Skip whitespace
fn ws(input: &str) -> IResult<&str, ()> {
    map(take_while(|c: char| c.is_whitespace()), |_| ())(input)
}

/// `#123 = IFCWALL (` -> (123, "IFCWALL"), leaving the input after `(`
fn header(input: &str) -> IResult<&str, (u32, &str)> {
    map(
        tuple((
            delimited(
                ws,
                preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u32>())),
                ws,
            ),
            preceded(
                char('='),
                delimited(
                    ws,
                    take_while1(|c: char| c.is_alphanumeric() || c == '_'),
                    ws,
                ),
            ),
            char('('),
        )),
        |(id, type_name, _)| (id, type_name),
    )(input)
}

/// Find the end of a quoted literal body, honoring `''` escapes.
///
/// `body` starts just after the opening quote. Returns the byte offset of the
/// closing quote, or `None` if the literal is not terminated on this line.
fn literal_end(body: &[u8]) -> Option<usize> {
    let mut i = 0;
    while let Some(offset) = memchr(QUOTE, &body[i..]) {
        let q = i + offset;
        if body.get(q + 1) == Some(&QUOTE) {
            // Escaped quote, keep going
            i = q + 2;
            continue;
        }
        return Some(q);
    }
    None
}

#[inline]
fn unescape(raw: &str) -> Cow<'_, str> {
    if raw.contains("''") {
        Cow::Owned(raw.replace("''", "'"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Parse an entity header and its first quoted attribute.
pub fn entity_header(line: &str) -> Option<EntityHeader<'_>> {
    let (rest, (id, type_name)) = header(line).ok()?;

    let rest = rest.trim_start();
    let identifier = if rest.starts_with(UNSET_MARKER) {
        None
    } else if rest.as_bytes().first() == Some(&QUOTE) {
        let body = &rest[1..];
        literal_end(body.as_bytes())
            .map(|end| unescape(&body[..end]))
            .filter(|value| !value.is_empty())
    } else {
        None
    };

    Some(EntityHeader {
        id,
        type_name: type_name.to_ascii_uppercase(),
        identifier,
    })
}

/// Collect up to `cap` single-quoted literals from a line.
///
/// An unterminated literal ends the scan for that line.
pub fn quoted_literals(line: &str, cap: usize) -> Literals<'_> {
    let bytes = line.as_bytes();
    let mut literals = Literals::new();
    let mut pos = 0;

    while literals.len() < cap {
        let Some(offset) = memchr(QUOTE, &bytes[pos..]) else {
            break;
        };
        let start = pos + offset + 1;
        let Some(len) = literal_end(&bytes[start..]) else {
            break;
        };
        let end = start + len;
        literals.push(unescape(&line[start..end]));
        pos = end + 1;
    }

    literals
}

/// Scan one line for an entity header and quoted literals.
pub fn scan_line(line: &str) -> ScannedLine<'_> {
    ScannedLine {
        entity: entity_header(line),
        literals: quoted_literals(line, MAX_LITERALS_PER_LINE),
    }
}
