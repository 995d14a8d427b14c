//! Google Cloud Storage backend.
//!
//! Everything goes through the GCS JSON API. Objects are written with
//! resumable uploads, so the object name is exactly the key handed in and
//! nothing is visible until the final chunk lands. Requests are signed with
//! the credential provider of an `object_store::gcp` client.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::CredentialProvider;
use reqwest::header::{CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DEFAULT_GCS_ENDPOINT;
use crate::error::{CloudStoreError, Result};
use crate::store::BucketPage;

/// Resumable upload chunk. GCS wants multiples of 256 KiB.
const UPLOAD_CHUNK: usize = 32 * 256 * 1024;

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    items: Vec<BucketResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BucketResource {
    name: String,
}

#[derive(Debug, Serialize)]
struct BucketInsert<'a> {
    name: &'a str,
    location: &'a str,
}

#[derive(Debug, Serialize)]
struct ObjectInsert<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug)]
pub(crate) struct GcsClient {
    http: reqwest::Client,
    endpoint: Url,
    /// Client for the configured bucket; only its credential provider is used.
    home: GoogleCloudStorage,
}

impl GcsClient {
    pub fn new(
        credentials: Option<PathBuf>,
        home_bucket: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint.unwrap_or(DEFAULT_GCS_ENDPOINT))?;
        if endpoint.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(home_bucket);
        if let Some(path) = credentials {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }

        // Resumable uploads answer intermediate chunks with 308.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            home: builder.build()?,
        })
    }

    async fn bearer(&self) -> Result<String> {
        let credential = self
            .home
            .credentials()
            .get_credential()
            .await
            .map_err(|e| CloudStoreError::Credentials(e.to_string()))?;
        Ok(credential.bearer.clone())
    }

    fn api_url(&self, segments: &[&str]) -> Url {
        api_url(&self.endpoint, segments)
    }

    pub async fn list_buckets(
        &self,
        project: &str,
        page_token: Option<&str>,
    ) -> Result<BucketPage> {
        let mut url = self.api_url(&["storage", "v1", "b"]);
        url.query_pairs_mut().append_pair("project", project);
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        let list: BucketList = check(response).await?.json().await?;

        Ok(BucketPage {
            names: list.items.into_iter().map(|b| b.name).collect(),
            next_page_token: list.next_page_token,
        })
    }

    pub async fn create_bucket(&self, project: &str, name: &str, region: &str) -> Result<()> {
        let mut url = self.api_url(&["storage", "v1", "b"]);
        url.query_pairs_mut().append_pair("project", project);

        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(&BucketInsert {
                name,
                location: region,
            })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(CloudStoreError::BucketExists(name.to_string()));
        }
        check(response).await?;
        Ok(())
    }

    pub async fn read_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>> {
        let mut url = self.api_url(&["storage", "v1", "b", bucket, "o", key]);
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.bytes().await?))
    }

    /// Open a resumable upload session and return its URI.
    async fn start_upload(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.api_url(&["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut().append_pair("uploadType", "resumable");

        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(&ObjectInsert { name: key })
            .send()
            .await?;
        let response = check(response).await?;

        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| CloudStoreError::Api {
                status: response.status().as_u16(),
                message: "resumable upload returned no session uri".to_string(),
            })?;
        Ok(Url::parse(session)?)
    }
}

/// An in-progress resumable upload of one object.
#[derive(Debug)]
pub(crate) struct GcsUpload {
    client: Arc<GcsClient>,
    bucket: String,
    key: String,
    session: Option<Url>,
    buffer: Vec<u8>,
    offset: u64,
}

impl GcsUpload {
    pub fn new(client: Arc<GcsClient>, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            session: None,
            buffer: Vec::new(),
            offset: 0,
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= UPLOAD_CHUNK {
            let rest = self.buffer.split_off(UPLOAD_CHUNK);
            let chunk = std::mem::replace(&mut self.buffer, rest);
            self.put_chunk(chunk, None).await?;
        }
        Ok(())
    }

    /// Send the last chunk, which creates the object.
    pub async fn finish(mut self) -> Result<()> {
        let chunk = std::mem::take(&mut self.buffer);
        let total = self.offset + chunk.len() as u64;
        self.put_chunk(chunk, Some(total)).await
    }

    /// Cancel the session, if one was opened.
    pub async fn cancel(self) -> Result<()> {
        let Some(session) = self.session else {
            return Ok(());
        };
        let response = self.client.http.delete(session).send().await?;
        // GCS answers a cancelled session with 499
        if response.status().is_success() || response.status().as_u16() == 499 {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn put_chunk(&mut self, chunk: Vec<u8>, total: Option<u64>) -> Result<()> {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                let session = self.client.start_upload(&self.bucket, &self.key).await?;
                self.session = Some(session.clone());
                session
            }
        };

        let len = chunk.len() as u64;
        let response = self
            .client
            .http
            .put(session)
            .header(CONTENT_RANGE, content_range(self.offset, len, total))
            .body(chunk)
            .send()
            .await?;

        if total.is_none() && response.status() == StatusCode::PERMANENT_REDIRECT {
            self.offset += len;
            return Ok(());
        }
        check(response).await?;
        self.offset += len;
        Ok(())
    }
}

/// `endpoint` with `segments` appended, each percent-encoded as a single
/// path segment.
fn api_url(endpoint: &Url, segments: &[&str]) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// `Content-Range` for a chunk of `len` bytes at `offset`. The total is
/// only known, and only sent, with the last chunk.
fn content_range(offset: u64, len: u64, total: Option<u64>) -> String {
    let total = total.map_or_else(|| "*".to_string(), |t| t.to_string());
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    Err(CloudStoreError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, 10, None), "bytes 0-9/*");
        assert_eq!(content_range(10, 5, Some(15)), "bytes 10-14/15");
        assert_eq!(content_range(0, 0, Some(0)), "bytes */0");
        assert_eq!(content_range(20, 0, Some(20)), "bytes */20");
    }

    #[test]
    fn test_object_key_is_one_path_segment() {
        let endpoint = Url::parse("http://localhost:4443/").unwrap();

        let url = api_url(&endpoint, &["storage", "v1", "b", "backups", "o", "docs//a.txt"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/storage/v1/b/backups/o/docs%2F%2Fa.txt"
        );

        let url = api_url(&endpoint, &["storage", "v1", "b", "backups", "o", "/top.txt"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/storage/v1/b/backups/o/%2Ftop.txt"
        );
    }
}
