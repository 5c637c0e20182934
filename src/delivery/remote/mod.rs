//! Remote build-upload resources.
//!
//! A build upload is created for an app version, receives one file record
//! whose server-issued upload operations describe where the bytes go, and is
//! then processed asynchronously until it reaches a terminal state.

mod api;

pub use api::ApiBuildUploadsRepository;

use crate::delivery::{Result, transfer::UploadOperation};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Uniform type identifier of an iOS application archive.
pub const IPA_UTI: &str = "com.apple.ipa";
/// Asset type of the primary build file.
pub const ASSET_TYPE: &str = "ASSET";

/// Target platform of a build upload. Only iOS archives are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "IOS",
        }
    }
}

/// Processing status reported by the remote side.
///
/// Anything other than the known values is an in-progress state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum UploadStatus {
    AwaitingUpload,
    Processing(String),
    Complete,
    Failed,
}

impl UploadStatus {
    /// `COMPLETE` and `FAILED` are the only terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Complete | UploadStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            UploadStatus::AwaitingUpload => "AWAITING_UPLOAD",
            UploadStatus::Processing(other) => other,
            UploadStatus::Complete => "COMPLETE",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl From<&str> for UploadStatus {
    fn from(value: &str) -> Self {
        match value {
            "AWAITING_UPLOAD" => UploadStatus::AwaitingUpload,
            "COMPLETE" => UploadStatus::Complete,
            "FAILED" => UploadStatus::Failed,
            other => UploadStatus::Processing(other.to_string()),
        }
    }
}

impl From<UploadStatus> for String {
    fn from(status: UploadStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a build upload with the remote side's detail messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildUploadState {
    pub state: UploadStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
}

impl BuildUploadState {
    pub fn new(state: UploadStatus) -> Self {
        Self {
            state,
            errors: Vec::new(),
            warnings: Vec::new(),
            infos: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUpload {
    pub id: String,
    pub state: BuildUploadState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUploadFile {
    pub id: String,
    pub upload_operations: Vec<UploadOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBuildUpload {
    pub app_id: String,
    pub version: String,
    pub build_number: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBuildUploadFile {
    pub build_upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub uti: String,
    pub asset_type: String,
}

impl CreateBuildUploadFile {
    /// File record for an `.ipa` under `build_upload_id`.
    pub fn ipa(build_upload_id: impl Into<String>, file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            build_upload_id: build_upload_id.into(),
            file_name: file_name.into(),
            file_size,
            uti: IPA_UTI.to_string(),
            asset_type: ASSET_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkBuildUploadFileUploaded {
    pub build_upload_file_id: String,
    pub sha256: String,
    pub md5: String,
}

/// Remote operations on build uploads.
#[async_trait]
pub trait BuildUploadsRepository: Send + Sync {
    async fn create_build_upload(&self, input: &CreateBuildUpload) -> Result<BuildUpload>;

    async fn create_build_upload_file(&self, input: &CreateBuildUploadFile)
    -> Result<BuildUploadFile>;

    async fn mark_build_upload_file_uploaded(&self, input: &MarkBuildUploadFileUploaded)
    -> Result<()>;

    async fn get_build_upload(&self, build_upload_id: &str) -> Result<BuildUpload>;
}
