// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end extraction over IFC text on disk.

use ifc_catalog_core::{extract_components, Catalog, ExtractOptions, Extraction};
use std::io::Write;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn extract_text(content: &str) -> Extraction {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    extract_components(file.path(), &ExtractOptions::default()).unwrap()
}

fn tags(extraction: &Extraction) -> Vec<&str> {
    extraction.components.iter().map(|c| c.full_tag.as_str()).collect()
}

#[test]
fn test_fixture_first_seen_order() {
    let extraction = extract_components(fixture("plumbing.ifc"), &ExtractOptions::default()).unwrap();
    assert_eq!(
        tags(&extraction),
        vec!["P1-A01", "P1-A02", "S2-B99", "HVAC12-PU101.2", "P1-A03", "P1-A04"]
    );
    assert_eq!(extraction.stats.duplicates_dropped, 1);
    assert!(!extraction.stats.truncated);
}

#[test]
fn test_fixture_entity_metadata() {
    let extraction = extract_components(fixture("plumbing.ifc"), &ExtractOptions::default()).unwrap();
    let pump = extraction
        .components
        .iter()
        .find(|c| c.full_tag == "HVAC12-PU101.2")
        .unwrap();
    assert_eq!(pump.system_code, "HVAC12");
    assert_eq!(pump.component_tag, "PU101.2");
    assert_eq!(pump.source_type.as_deref(), Some("IFCPUMP"));
    assert_eq!(pump.source_guid.as_deref(), Some("1kTvXnbbzCWw8lcMd1dR4o"));

    let valve = extraction.components.iter().find(|c| c.full_tag == "S2-B99").unwrap();
    // First occurrence wins
    assert_eq!(valve.source_guid.as_deref(), Some("0dTR3bPzT1NvhHT8Dx6wZQ"));
}

#[test]
fn test_dedup_law() {
    for n in 1..=5 {
        let content: String = (0..n)
            .map(|i| format!("#{}=IFCVALVE('guid{}',$,'S2-B99',$);\n", i + 1, i))
            .collect();
        let extraction = extract_text(&content);
        assert_eq!(tags(&extraction), vec!["S2-B99"], "n = {}", n);
    }
}

#[test]
fn test_rejection_law() {
    let extraction = extract_text(concat!(
        "#1=IFCWALL('P1-A',$,'S1-',$);\n",
        "#2=IFCWALL('p1-A01',$,'P1-1',$);\n",
        "#3=IFCWALL('P1A01',$,'PPPPP1-A01',$);\n",
        "#4=IFCWALL('P1-A0',$,'P1-A012345',$);\n",
    ));
    assert!(extraction.components.is_empty());
}

#[test]
fn test_determinism_law() {
    let path = fixture("plumbing.ifc");
    let first = Catalog::build(extract_components(&path, &ExtractOptions::default()).unwrap().components);
    let second = Catalog::build(extract_components(&path, &ExtractOptions::default()).unwrap().components);
    assert_eq!(first, second);
    assert_eq!(first.systems, vec!["HVAC12", "P1", "S2"]);
    assert_eq!(first.entries[0].component.full_tag, "HVAC12-PU101.2");
}

#[test]
fn test_cap_bounds_output() {
    let content: String = (0..1_000)
        .map(|i| format!("#{}=IFCFLOWSEGMENT($,$,'P1-A{:03}');\n", i + 1, i))
        .collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    let options = ExtractOptions {
        max_components: 100,
        ..ExtractOptions::default()
    };
    let extraction = extract_components(file.path(), &options).unwrap();
    assert_eq!(extraction.components.len(), 100);
    assert!(extraction.stats.truncated);
    assert!(extraction.stats.lines_read < 1_000);
}
