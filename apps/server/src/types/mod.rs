// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Type definitions for records, artifacts and API responses.

mod artifact;
mod model;
mod response;

pub use artifact::{
    ArtifactComponent, ArtifactLinks, ArtifactStats, ComponentsArtifact, MetadataArtifact,
    ProgressInfo,
};
pub use model::{Component, Model, ModelFormat, ModelStatus, StatusUpdate};
pub use response::{
    ComponentListResponse, ConvertResponse, Enqueued, ModelListResponse, ProgressEvent, Stage,
};
