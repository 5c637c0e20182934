//! App Store Connect wire mapping for build uploads.
//!
//! See also <https://developer.apple.com/documentation/appstoreconnectapi/build-uploads>.

use super::{
    BuildUpload, BuildUploadFile, BuildUploadState, BuildUploadsRepository, CreateBuildUpload,
    CreateBuildUploadFile, MarkBuildUploadFileUploaded, UploadStatus,
};
use crate::delivery::{
    error::{Error, Result},
    transfer::{UploadHeader, UploadOperation},
    utils::http::{ApiRequest, HttpTransport},
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const BUILD_UPLOAD: &str = "build upload";
const BUILD_UPLOAD_FILE: &str = "build upload file";

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct BuildUploadData {
    id: Option<String>,
    attributes: Option<BuildUploadAttributes>,
}

#[derive(Debug, Deserialize)]
struct BuildUploadAttributes {
    state: Option<BuildUploadStatePayload>,
}

#[derive(Debug, Deserialize)]
struct BuildUploadStatePayload {
    state: Option<String>,
    errors: Option<Vec<StateDetail>>,
    warnings: Option<Vec<StateDetail>>,
    infos: Option<Vec<StateDetail>>,
}

#[derive(Debug, Deserialize)]
struct StateDetail {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuildUploadFileData {
    id: Option<String>,
    attributes: Option<BuildUploadFileAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildUploadFileAttributes {
    upload_operations: Option<Vec<UploadOperationPayload>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadOperationPayload {
    method: Option<String>,
    url: Option<String>,
    offset: Option<u64>,
    length: Option<u64>,
    request_headers: Option<Vec<UploadHeaderPayload>>,
}

#[derive(Debug, Deserialize)]
struct UploadHeaderPayload {
    name: Option<String>,
    value: Option<String>,
}

fn malformed(what: &str, detail: &str) -> Error {
    Error::infrastructure(format!("Malformed {} payload: {}.", what, detail))
}

fn descriptions(details: Option<Vec<StateDetail>>, fallback: &str) -> Vec<String> {
    details
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.description.unwrap_or_else(|| fallback.to_string()))
        .collect()
}

impl BuildUploadData {
    fn into_build_upload(self) -> Result<BuildUpload> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed(BUILD_UPLOAD, "missing id"))?;
        let payload = self
            .attributes
            .and_then(|a| a.state)
            .ok_or_else(|| malformed(BUILD_UPLOAD, "missing state"))?;
        let status = payload
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed(BUILD_UPLOAD, "missing state"))?;

        Ok(BuildUpload {
            id,
            state: BuildUploadState {
                state: UploadStatus::from(status.as_str()),
                errors: descriptions(payload.errors, "Unknown error"),
                warnings: descriptions(payload.warnings, "Unknown warning"),
                infos: descriptions(payload.infos, "Unknown info"),
            },
        })
    }
}

impl UploadOperationPayload {
    fn into_operation(self) -> Result<UploadOperation> {
        let invalid = || malformed(BUILD_UPLOAD_FILE, "invalid upload operation");
        let method = self.method.filter(|m| !m.is_empty()).ok_or_else(invalid)?;
        let url = self.url.filter(|u| !u.is_empty()).ok_or_else(invalid)?;
        let offset = self.offset.ok_or_else(invalid)?;
        let length = self.length.ok_or_else(invalid)?;

        let request_headers = self
            .request_headers
            .unwrap_or_default()
            .into_iter()
            .map(|header| match (header.name, header.value) {
                (Some(name), Some(value)) if !name.is_empty() => Ok(UploadHeader { name, value }),
                _ => Err(malformed(BUILD_UPLOAD_FILE, "invalid upload operation header")),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(UploadOperation {
            method,
            url,
            offset,
            length,
            request_headers,
        })
    }
}

/// [`BuildUploadsRepository`] over the App Store Connect REST API.
#[derive(Clone)]
pub struct ApiBuildUploadsRepository {
    transport: Arc<dyn HttpTransport>,
}

impl ApiBuildUploadsRepository {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl BuildUploadsRepository for ApiBuildUploadsRepository {
    async fn create_build_upload(&self, input: &CreateBuildUpload) -> Result<BuildUpload> {
        let request = ApiRequest::new(Method::POST, "/v1/buildUploads").json(json!({
            "data": {
                "type": "buildUploads",
                "attributes": {
                    "cfBundleShortVersionString": input.version,
                    "cfBundleVersion": input.build_number,
                    "platform": input.platform.as_str(),
                },
                "relationships": {
                    "app": { "data": { "type": "apps", "id": input.app_id } }
                }
            }
        }));

        let document: Document<BuildUploadData> =
            self.transport.request(request).await?.decode(BUILD_UPLOAD)?;
        document.data.into_build_upload()
    }

    async fn create_build_upload_file(
        &self,
        input: &CreateBuildUploadFile,
    ) -> Result<BuildUploadFile> {
        let request = ApiRequest::new(Method::POST, "/v1/buildUploadFiles").json(json!({
            "data": {
                "type": "buildUploadFiles",
                "attributes": {
                    "assetType": input.asset_type,
                    "fileName": input.file_name,
                    "fileSize": input.file_size,
                    "uti": input.uti,
                },
                "relationships": {
                    "buildUpload": { "data": { "type": "buildUploads", "id": input.build_upload_id } }
                }
            }
        }));

        let document: Document<BuildUploadFileData> =
            self.transport.request(request).await?.decode(BUILD_UPLOAD_FILE)?;
        let id = document
            .data
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed(BUILD_UPLOAD_FILE, "missing id"))?;
        let upload_operations = document
            .data
            .attributes
            .and_then(|a| a.upload_operations)
            .unwrap_or_default()
            .into_iter()
            .map(UploadOperationPayload::into_operation)
            .collect::<Result<Vec<_>>>()?;

        Ok(BuildUploadFile {
            id,
            upload_operations,
        })
    }

    async fn mark_build_upload_file_uploaded(
        &self,
        input: &MarkBuildUploadFileUploaded,
    ) -> Result<()> {
        let path = format!("/v1/buildUploadFiles/{}", input.build_upload_file_id);
        let request = ApiRequest::new(Method::PATCH, path).json(json!({
            "data": {
                "type": "buildUploadFiles",
                "id": input.build_upload_file_id,
                "attributes": {
                    "sourceFileChecksums": {
                        "file": { "hash": input.sha256, "algorithm": "SHA_256" },
                        "composite": { "hash": input.md5, "algorithm": "MD5" }
                    },
                    "uploaded": true
                }
            }
        }));

        self.transport.request(request).await?;
        Ok(())
    }

    async fn get_build_upload(&self, build_upload_id: &str) -> Result<BuildUpload> {
        let request = ApiRequest::new(Method::GET, format!("/v1/buildUploads/{}", build_upload_id))
            .query("fields[buildUploads]", "state");

        let document: Document<BuildUploadData> =
            self.transport.request(request).await?.decode(BUILD_UPLOAD)?;
        document.data.into_build_upload()
    }
}
