// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC Catalog Core
//!
//! Streaming extraction of project component tags from IFC/STEP files.
//!
//! ## Overview
//!
//! - **Tag grammar**: [`parse_tag`] validates and normalizes `<SYSTEM>-<COMPONENT>`
//!   identifiers, built with [nom](https://docs.rs/nom)
//! - **Line scanning**: entity headers and quoted literals, using
//!   [memchr](https://docs.rs/memchr) for quote search
//! - **Streaming extraction**: bounded-memory, line-by-line pass with
//!   deduplication and a component cap
//! - **Catalog**: deterministic ordering and placeholder placement
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_catalog_core::{extract_components, Catalog, ExtractOptions};
//!
//! let extraction = extract_components("model.ifc", &ExtractOptions::default())?;
//! let catalog = Catalog::build(extraction.components);
//!
//! for entry in &catalog.entries {
//!     println!("{} at {:?}", entry.component.full_tag, entry.placement.position);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for extracted data

pub mod catalog;
pub mod error;
pub mod extract;
pub mod placement;
pub mod scan;
pub mod tag;

pub use catalog::{Catalog, CatalogEntry};
pub use error::{Error, Result};
pub use extract::{
    extract_components, extract_components_with_progress, extract_from_reader, ExtractOptions,
    ExtractStats, ExtractedComponent, Extraction, DEFAULT_MAX_COMPONENTS, DEFAULT_MAX_LINE_BYTES,
    MIN_LITERAL_LEN,
    PROVENANCE,
};
pub use placement::{place, BoundingBox, Placement, Point3};
pub use scan::{entity_header, quoted_literals, scan_line, EntityHeader, ScannedLine};
pub use tag::{
    compose_full_tag, is_valid_component_tag, is_valid_system_code, normalize_component_tag,
    normalize_system_code, parse_tag, validate_system_code, TagParts, TAG_SEPARATOR,
};
