// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sorted, placed component catalog built from an extraction pass.

use rustc_hash::FxHashMap;

use crate::extract::ExtractedComponent;
use crate::placement::{place, Placement};

/// A component with its placeholder placement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogEntry {
    pub component: ExtractedComponent,
    pub system_index: usize,
    pub placement: Placement,
}

/// Components sorted by full tag, with the distinct sorted system list.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Catalog {
    pub systems: Vec<String>,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Sort by full tag, index the systems and assign placements.
    ///
    /// The result depends only on the set of components, not on the order
    /// they were discovered in.
    pub fn build(mut components: Vec<ExtractedComponent>) -> Self {
        components.sort_by(|a, b| a.full_tag.cmp(&b.full_tag));

        let mut systems: Vec<String> = components.iter().map(|c| c.system_code.clone()).collect();
        systems.sort();
        systems.dedup();

        let entries = {
            let system_index: FxHashMap<&str, usize> = systems
                .iter()
                .enumerate()
                .map(|(i, code)| (code.as_str(), i))
                .collect();

            components
                .into_iter()
                .enumerate()
                .map(|(global_index, component)| {
                    let system_index = system_index[component.system_code.as_str()];
                    CatalogEntry {
                        placement: place(global_index, system_index),
                        system_index,
                        component,
                    }
                })
                .collect()
        };

        Self { systems, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
