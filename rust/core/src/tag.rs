// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Component tag grammar.
//!
//! Project tags have the shape `<SYSTEM>-<COMPONENT>`:
//!
//! - system code: 1-4 uppercase letters followed by 1-3 digits (`P1`, `HVAC12`)
//! - component tag: 1-3 uppercase letters, 2-4 digits, then any number of
//!   `.<1-3 digits>` hierarchy segments (`A01`, `PU101.2`)
//!
//! System codes are trimmed only; component tags are trimmed and uppercased.

use nom::{
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::{all_consuming, recognize},
    multi::many0,
    sequence::{pair, tuple},
    IResult,
};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between system code and component tag.
pub const TAG_SEPARATOR: char = '-';

/// A validated, normalized component tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagParts {
    pub system_code: String,
    pub component_tag: String,
    pub full_tag: String,
}

#[inline]
fn is_upper(c: char) -> bool {
    c.is_ascii_uppercase()
}

#[inline]
fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// System code: `P1`, `S2`, `HVAC12`
fn system_code(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while_m_n(1, 4, is_upper),
        take_while_m_n(1, 3, is_digit),
    ))(input)
}

/// Hierarchy segment: `.2`
fn segment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('.'), take_while_m_n(1, 3, is_digit)))(input)
}

/// Component tag: `A01`, `B99`, `PU101.2.10`
fn component_tag(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while_m_n(1, 3, is_upper),
        take_while_m_n(2, 4, is_digit),
        many0(segment),
    )))(input)
}

/// Trim a raw system code.
#[inline]
pub fn normalize_system_code(raw: &str) -> &str {
    raw.trim()
}

/// Trim and uppercase a raw component tag.
#[inline]
pub fn normalize_component_tag(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Check an already-normalized system code against the grammar.
pub fn is_valid_system_code(code: &str) -> bool {
    all_consuming(system_code)(code).is_ok()
}

/// Check an already-normalized component tag against the grammar.
pub fn is_valid_component_tag(tag: &str) -> bool {
    all_consuming(component_tag)(tag).is_ok()
}

/// Normalize and validate a system code, e.g. from a query filter.
pub fn validate_system_code(raw: &str) -> Result<&str> {
    let code = normalize_system_code(raw);
    if is_valid_system_code(code) {
        Ok(code)
    } else {
        Err(Error::InvalidTag(raw.to_string()))
    }
}

/// Compose the full tag from normalized halves.
#[inline]
pub fn compose_full_tag(system_code: &str, component_tag: &str) -> String {
    format!("{}{}{}", system_code, TAG_SEPARATOR, component_tag)
}

/// Split a candidate on the first separator, normalize and validate both halves.
///
/// Returns `None` if either half fails the grammar; partial matches are never
/// returned.
pub fn parse_tag(candidate: &str) -> Option<TagParts> {
    let (raw_system, raw_component) = candidate.split_once(TAG_SEPARATOR)?;

    let system = normalize_system_code(raw_system);
    if !is_valid_system_code(system) {
        return None;
    }

    let component = normalize_component_tag(raw_component);
    if !is_valid_component_tag(&component) {
        return None;
    }

    Some(TagParts {
        full_tag: compose_full_tag(system, &component),
        system_code: system.to_string(),
        component_tag: component,
    })
}

impl FromStr for TagParts {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_tag(s).ok_or_else(|| Error::InvalidTag(s.to_string()))
    }
}

impl fmt::Display for TagParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_code() {
        assert!(is_valid_system_code("P1"));
        assert!(is_valid_system_code("S2"));
        assert!(is_valid_system_code("HVAC12"));
        assert!(!is_valid_system_code("p1"));
        assert!(!is_valid_system_code("P"));
        assert!(!is_valid_system_code("12"));
        assert!(!is_valid_system_code("ABCDE1"));
        assert!(!is_valid_system_code("P1234"));
        assert!(!is_valid_system_code(""));
    }

    #[test]
    fn test_component_tag() {
        assert!(is_valid_component_tag("A01"));
        assert!(is_valid_component_tag("B99"));
        assert!(is_valid_component_tag("PU101.2"));
        assert!(is_valid_component_tag("V0001.10.3"));
        assert!(!is_valid_component_tag("A1"));
        assert!(!is_valid_component_tag("A12345"));
        assert!(!is_valid_component_tag("A01."));
        assert!(!is_valid_component_tag("ABCD01"));
        assert!(!is_valid_component_tag("a01"));
    }

    #[test]
    fn test_parse_tag() {
        let parts = parse_tag("P1-A01").unwrap();
        assert_eq!(parts.system_code, "P1");
        assert_eq!(parts.component_tag, "A01");
        assert_eq!(parts.full_tag, "P1-A01");
    }

    #[test]
    fn test_parse_tag_normalizes() {
        let parts = parse_tag(" S2 - b99 ").unwrap();
        assert_eq!(parts.system_code, "S2");
        assert_eq!(parts.component_tag, "B99");
        assert_eq!(parts.full_tag, "S2-B99");
    }

    #[test]
    fn test_parse_tag_rejects() {
        // System codes are not uppercased
        assert!(parse_tag("p1-A01").is_none());
        assert!(parse_tag("P1A01").is_none());
        assert!(parse_tag("P1-").is_none());
        assert!(parse_tag("-A01").is_none());
        assert!(parse_tag("Basic Wall").is_none());
        assert!(parse_tag("P1-A01-X").is_none());
    }

    #[test]
    fn test_from_str() {
        let parts: TagParts = "HVAC12-PU101.2".parse().unwrap();
        assert_eq!(parts.to_string(), "HVAC12-PU101.2");
        assert!(matches!("nope".parse::<TagParts>(), Err(Error::InvalidTag(_))));
    }

    #[test]
    fn test_validate_system_code() {
        assert_eq!(validate_system_code(" P1 ").unwrap(), "P1");
        assert!(validate_system_code("x").is_err());
    }
}
