//! S3 implementations of [`ArtifactStore`] and [`BucketProvisioner`]

use crate::error::{absent_or_remote, remote_error};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectCannedAcl, ObjectIdentifier,
};
use stackflow_cloud::{
    ArtifactStore, BucketProvisioner, CloudError, DEFAULT_REGION, ObjectPage, Removal, Result,
    StagingObject,
};

/// Upper bound of an S3 bucket name
const MAX_BUCKET_NAME: usize = 63;

/// Staging store backed by S3
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
}

impl std::fmt::Debug for S3ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ArtifactStore")
            .field("region", &self.client.config().region())
            .finish()
    }
}

impl S3ArtifactStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_object(&self, object: &StagingObject) -> Result<()> {
        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body.clone()))
            .content_encoding(&object.content_encoding)
            .acl(ObjectCannedAcl::from(object.access_control.as_str()))
            .send()
            .await
            .map_err(|e| remote_error("PutObject", e))?;
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<Option<ObjectPage>> {
        let output = match self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => return absent_or_remote("ListObjectsV2", e, None),
        };

        let keys = output
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(Some(ObjectPage { keys, next_token }))
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CloudError::Remote(format!("DeleteObjects: {}", e)))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| CloudError::Remote(format!("DeleteObjects: {}", e)))?;

        let output = match self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
        {
            Ok(output) => output,
            // The bucket may vanish between listing and deleting
            Err(e) => return absent_or_remote("DeleteObjects", e, ()),
        };

        if let Some(failed) = output.errors().first() {
            return Err(CloudError::Remote(format!(
                "DeleteObjects: {} of {} objects in {} were not deleted (first: {} {})",
                output.errors().len(),
                keys.len(),
                bucket,
                failed.key().unwrap_or_default(),
                failed.message().unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<Removal> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(Removal::Removed),
            Err(e) => absent_or_remote("DeleteBucket", e, Removal::AlreadyAbsent),
        }
    }
}

/// Creates a uniquely named staging bucket per stack
#[derive(Clone)]
pub struct S3BucketProvisioner {
    client: Client,
    region: String,
}

impl S3BucketProvisioner {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        let region = sdk_config
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self {
            client: Client::new(sdk_config),
            region,
        }
    }

    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }
}

/// `stackflow-<stack>-<8 hex>`, lowercased and clipped to a valid bucket name
pub fn bucket_name(stack_name: &str, suffix: &str) -> String {
    let mut stem: String = stack_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let room = MAX_BUCKET_NAME - "stackflow--".len() - suffix.len();
    stem.truncate(room);
    let stem = stem.trim_matches('-');

    if stem.is_empty() {
        format!("stackflow-{}", suffix)
    } else {
        format!("stackflow-{}-{}", stem, suffix)
    }
}

#[async_trait]
impl BucketProvisioner for S3BucketProvisioner {
    async fn provision(&self, stack_name: &str) -> Result<String> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let bucket = bucket_name(stack_name, &suffix[..8]);

        let mut call = self.client.create_bucket().bucket(&bucket);
        // us-east-1 rejects an explicit location constraint
        if self.region != DEFAULT_REGION {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        call.send()
            .await
            .map_err(|e| remote_error("CreateBucket", e))?;

        tracing::debug!(bucket = %bucket, region = %self.region, "Created staging bucket");
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_is_lowercase() {
        assert_eq!(bucket_name("MyApi", "0a1b2c3d"), "stackflow-myapi-0a1b2c3d");
    }

    #[test]
    fn test_bucket_name_replaces_invalid_chars() {
        assert_eq!(
            bucket_name("api_v2.prod", "0a1b2c3d"),
            "stackflow-api-v2-prod-0a1b2c3d"
        );
    }

    #[test]
    fn test_bucket_name_fits_limit() {
        let long = "a".repeat(200);
        let name = bucket_name(&long, "0a1b2c3d");
        assert_eq!(name.len(), MAX_BUCKET_NAME);
        assert!(name.ends_with("-0a1b2c3d"));
    }

    #[test]
    fn test_bucket_name_without_usable_stem() {
        assert_eq!(bucket_name("__", "0a1b2c3d"), "stackflow-0a1b2c3d");
    }
}
