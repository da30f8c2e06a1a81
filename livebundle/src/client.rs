#![doc = "HTTP implementation of the bundle resource: bridges the core `BundleResource` trait to the livebundle REST API."]
//
//! # API client (CLI <-> backend)
//!
//! [`ApiClient`] implements [`BundleResource`] over `reqwest`. Every request
//! carries the bearer token; every non-2xx response becomes an
//! [`ApiError::Status`] holding the status code and response body so the CLI
//! can print it verbatim.
//!
//! Routes, relative to `{base}/v1/apps/{app_id}`:
//!
//! | call | route |
//! |---|---|
//! | create_bundle | `POST /bundles` |
//! | create_file | `POST /bundles/{bundle}/files` (multipart form) |
//! | create_multipart_upload | `POST /bundles/{bundle}/files/{file}/upload?action=mpu-create` |
//! | upload_part | `PUT /bundles/{bundle}/files/{file}/upload?action=mpu-uploadpart` |
//! | complete_multipart_upload | `POST /bundles/{bundle}/files/{file}/upload?action=mpu-complete` |
//! | update_bundle | `PATCH /bundles/{bundle}` |

use async_trait::async_trait;
use bytes::Bytes;
use livebundle_core::contract::{
    Bundle, BundleFile, BundleResource, BundleUpdate, MultipartUpload, NewBundle, NewBundleFile,
    UploadedPart,
};
use livebundle_core::ResourceError;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const USER_AGENT: &str = concat!("livebundle/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{operation} request failed")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client")]
    Builder(#[source] reqwest::Error),
}

#[derive(Deserialize)]
struct PartReceipt {
    etag: String,
}

#[derive(Serialize)]
struct CompleteMultipart<'a> {
    parts: &'a [UploadedPart],
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
    app_id: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, app_id: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::Builder)?;
        tracing::info!(
            base_url,
            app_id,
            token_set = !token.is_empty(),
            "Initialized ApiClient"
        );
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            app_id: app_id.to_string(),
        })
    }

    fn bundles_url(&self) -> String {
        format!("{}/v1/apps/{}/bundles", self.base_url, self.app_id)
    }

    fn bundle_url(&self, bundle_id: &str) -> String {
        format!("{}/{bundle_id}", self.bundles_url())
    }

    fn file_upload_url(&self, bundle_id: &str, file_id: &str) -> String {
        format!("{}/files/{file_id}/upload", self.bundle_url(bundle_id))
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| {
                tracing::error!(operation, error = ?source, "HTTP request failed");
                ApiError::Request { operation, source }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(operation, %status, body = %body, "API returned an error status");
        Err(ApiError::Status {
            operation,
            status,
            body,
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        self.execute(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|source| ApiError::Request { operation, source })
    }
}

#[async_trait]
impl BundleResource for ApiClient {
    async fn create_bundle(&self, req: NewBundle) -> Result<Bundle, ResourceError> {
        tracing::info!(
            app_id = %self.app_id,
            artifact_type = %req.artifact_type,
            "Creating bundle"
        );
        let bundle: Bundle = self
            .execute_json("create_bundle", self.http.post(self.bundles_url()).json(&req))
            .await?;
        tracing::info!(bundle_id = %bundle.id, "Successfully created bundle");
        Ok(bundle)
    }

    async fn create_file(
        &self,
        bundle_id: &str,
        req: NewBundleFile,
    ) -> Result<BundleFile, ResourceError> {
        tracing::debug!(
            bundle_id,
            name = %req.name,
            href = ?req.href,
            size = req.size_in_bytes,
            inline = req.inline_bytes.is_some(),
            "Creating bundle file"
        );
        let mut form = Form::new()
            .text("checksum", req.checksum)
            .text("mimeType", req.mime_type.clone())
            .text("name", req.name.clone())
            .text("sizeInBytes", req.size_in_bytes.to_string());
        if let Some(href) = req.href {
            form = form.text("href", href);
        }
        if let Some(signature) = req.signature {
            form = form.text("signature", signature);
        }
        if let Some(bytes) = req.inline_bytes {
            let length = bytes.len() as u64;
            let part = Part::stream_with_length(Body::from(bytes), length)
                .file_name(req.name)
                .mime_str(&req.mime_type)?;
            form = form.part("file", part);
        }

        let url = format!("{}/files", self.bundle_url(bundle_id));
        let file: BundleFile = self
            .execute_json("create_file", self.http.post(url).multipart(form))
            .await?;
        Ok(file)
    }

    async fn create_multipart_upload(
        &self,
        bundle_id: &str,
        file_id: &str,
    ) -> Result<MultipartUpload, ResourceError> {
        let request = self
            .http
            .post(self.file_upload_url(bundle_id, file_id))
            .query(&[("action", "mpu-create")]);
        let session: MultipartUpload = self.execute_json("create_multipart_upload", request).await?;
        tracing::info!(bundle_id, file_id, upload_id = %session.upload_id, "Opened multipart session");
        Ok(session)
    }

    async fn upload_part(
        &self,
        bundle_id: &str,
        file_id: &str,
        upload_id: &str,
        part_number: u32,
        chunk: Bytes,
    ) -> Result<UploadedPart, ResourceError> {
        let length = chunk.len() as u64;
        let form = Form::new().part(
            "blob",
            Part::stream_with_length(Body::from(chunk), length).file_name("blob"),
        );
        let part_number_param = part_number.to_string();
        let request = self
            .http
            .put(self.file_upload_url(bundle_id, file_id))
            .query(&[
                ("action", "mpu-uploadpart"),
                ("uploadId", upload_id),
                ("partNumber", part_number_param.as_str()),
            ])
            .multipart(form);
        let receipt: PartReceipt = self.execute_json("upload_part", request).await?;
        tracing::debug!(upload_id, part_number, etag = %receipt.etag, "Uploaded part");
        Ok(UploadedPart {
            part_number,
            etag: receipt.etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        bundle_id: &str,
        file_id: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<(), ResourceError> {
        let request = self
            .http
            .post(self.file_upload_url(bundle_id, file_id))
            .query(&[("action", "mpu-complete"), ("uploadId", upload_id)])
            .json(&CompleteMultipart { parts: &parts });
        self.execute("complete_multipart_upload", request).await?;
        tracing::info!(upload_id, parts = parts.len(), "Completed multipart session");
        Ok(())
    }

    async fn update_bundle(&self, bundle_id: &str, req: BundleUpdate) -> Result<(), ResourceError> {
        let request = self.http.patch(self.bundle_url(bundle_id)).json(&req);
        self.execute("update_bundle", request).await?;
        tracing::info!(bundle_id, status = ?req.artifact_status, "Updated bundle");
        Ok(())
    }
}
