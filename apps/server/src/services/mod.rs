// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service modules for storage, model records and conversion.

pub mod conversion;
pub mod registry;
pub mod storage;

pub use conversion::{ConversionService, CONVERSION_FAILED_MESSAGE, UNSUPPORTED_FORMAT_MESSAGE};
pub use registry::{MemoryRegistry, ModelRegistry, PgRegistry, RegistryError};
pub use storage::{
    validate_file_name, validate_file_size, StorageError, StorageGuard, StoredFile, UploadError,
    MULTIPART_FRAMING_ALLOWANCE,
};
