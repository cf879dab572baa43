// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for loading and preparing a mapping run
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before any batch is opened
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] paramap_core::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("The rules require the {0}, but none was configured")]
    SourceNotConfigured(&'static str),

    #[error("Title '{0}' has no building code segment")]
    BuildingCodeMissing(String),

    #[error("Building code '{0}' not found in the asset list")]
    BuildingNotFound(String),

    #[error("Cannot extract a model code from '{0}'")]
    ModelCodeMissing(String),
}

/// Failure reported by the host while writing or managing a batch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// The host refused the value; the text write path may still succeed
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Anything else; aborts the active batch
    #[error("unexpected host failure: {0}")]
    Unexpected(String),
}

/// Fatal failure of a mapping run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Batch '{batch}' rolled back: {source}")]
    BatchAborted {
        batch: String,
        #[source]
        source: HostError,
    },
}
