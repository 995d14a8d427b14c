//! Startup check-or-create for the target bucket.

use cloud_store::{CloudBuckets, CloudStoreError};
use tracing::{debug, info};

use crate::config::CloudSinkConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("bucket name is empty")]
    EmptyBucketName,
    #[error("failed to enumerate buckets in project {project:?}, double check the project id: {source}")]
    List {
        project: String,
        #[source]
        source: CloudStoreError,
    },
    #[error("failed to create bucket {bucket:?}: {source}")]
    Create {
        bucket: String,
        #[source]
        source: CloudStoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The bucket was already there
    Existing,
    /// The bucket was created in the configured region
    Created,
}

/// Look for `name` among the project's buckets, following every page.
///
/// Enumeration stops at the first match or when the listing reports no
/// more results.
pub async fn bucket_exists(
    buckets: &dyn CloudBuckets,
    project: &str,
    name: &str,
) -> Result<bool, ProvisionError> {
    let mut page_token: Option<String> = None;
    loop {
        let page = buckets
            .list_buckets(project, page_token.as_deref())
            .await
            .map_err(|source| ProvisionError::List {
                project: project.to_string(),
                source,
            })?;
        debug!(project = %project, count = page.names.len(), "listed bucket page");

        if page.names.iter().any(|b| b == name) {
            return Ok(true);
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => return Ok(false),
        }
    }
}

/// Make sure the configured bucket exists, creating it if needed.
///
/// The bucket is only created once enumeration has found no match. Any
/// error, including a name collision on create, is fatal to the caller.
pub async fn provision_bucket(
    buckets: &dyn CloudBuckets,
    config: &CloudSinkConfig,
) -> Result<Provisioned, ProvisionError> {
    let name = config.bucket.as_str();
    if name.trim().is_empty() {
        return Err(ProvisionError::EmptyBucketName);
    }

    if bucket_exists(buckets, &config.project, name).await? {
        info!(bucket = %name, "bucket exists");
        return Ok(Provisioned::Existing);
    }

    buckets
        .create_bucket(&config.project, name, &config.region)
        .await
        .map_err(|source| ProvisionError::Create {
            bucket: name.to_string(),
            source,
        })?;
    info!(bucket = %name, region = %config.region, "bucket created");
    Ok(Provisioned::Created)
}
