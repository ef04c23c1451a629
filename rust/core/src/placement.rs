// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Placeholder spatial placement.
//!
//! Real geometry is not extracted yet. Every component gets a deterministic
//! position computed from its index in the sorted catalog and the index of its
//! system: systems are laid out as rows along Y, components run along X.
//! Replace [`place`] once element placements are read from the model.

/// Distance between neighbouring components along X (metres).
pub const COMPONENT_SPACING: f64 = 2.0;

/// Distance between system rows along Y (metres).
pub const SYSTEM_SPACING: f64 = 6.0;

/// Edge length of the placeholder bounding cube (metres).
pub const BOX_SIZE: f64 = 1.0;

/// 3D point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    fn offset(self, d: f64) -> Self {
        Self::new(self.x + d, self.y + d, self.z + d)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// Cube of edge `size` centered on `center`.
    pub fn cube(center: Point3, size: f64) -> Self {
        let half = size / 2.0;
        Self {
            min: center.offset(-half),
            max: center.offset(half),
        }
    }

    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }
}

/// Position and extent assigned to a component.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Placement {
    pub position: Point3,
    pub bounding_box: BoundingBox,
}

/// Placeholder placement for the component at `global_index` in the sorted
/// catalog whose system sits at `system_index` in the sorted system list.
pub fn place(global_index: usize, system_index: usize) -> Placement {
    let position = Point3::new(
        global_index as f64 * COMPONENT_SPACING,
        system_index as f64 * SYSTEM_SPACING,
        0.0,
    );
    Placement {
        position,
        bounding_box: BoundingBox::cube(position, BOX_SIZE),
    }
}
