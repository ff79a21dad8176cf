//! APS Object Storage Service (OSS v2) client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::auth::Credential;
use crate::config::ApsConfig;

use super::types::{BucketPage, SignedResource, SignedUpload};
use super::{BlobReference, BlobStore, BucketSummary, StorageError};

/// OSS v2 client.
pub struct OssClient {
    client: Client,
    base_url: String,
}

impl OssClient {
    pub fn new(config: &ApsConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.oss_url.trim_end_matches('/').to_string(),
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/buckets/{}", self.base_url, urlencoding::encode(bucket))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/objects/{}",
            self.bucket_url(bucket),
            urlencoding::encode(key)
        )
    }

    /// Turn a non-success response into an `ApiError`.
    async fn check(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BlobStore for OssClient {
    fn name(&self) -> &str {
        "oss"
    }

    async fn bucket_exists(
        &self,
        credential: &Credential,
        bucket: &str,
    ) -> Result<bool, StorageError> {
        let response = self
            .client
            .get(format!("{}/details", self.bucket_url(bucket)))
            .bearer_auth(credential.access_token())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn create_bucket(
        &self,
        credential: &Credential,
        bucket: &str,
        region: &str,
        policy_key: &str,
    ) -> Result<(), StorageError> {
        debug!("Creating bucket '{}' ({}, {})", bucket, region, policy_key);
        let response = self
            .client
            .post(format!("{}/buckets", self.base_url))
            .bearer_auth(credential.access_token())
            .header("x-ads-region", region)
            .json(&json!({ "bucketKey": bucket, "policyKey": policy_key }))
            .send()
            .await?;

        // 409: another caller created it first
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn list_buckets(
        &self,
        credential: &Credential,
    ) -> Result<Vec<BucketSummary>, StorageError> {
        let mut buckets = Vec::new();
        let mut url = format!("{}/buckets?limit=100", self.base_url);

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(credential.access_token())
                .send()
                .await?;
            let page: BucketPage = Self::check(response)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::ParseError(e.to_string()))?;

            buckets.extend(page.items);
            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(buckets)
    }

    async fn delete_bucket(&self, credential: &Credential, bucket: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.bucket_url(bucket))
            .bearer_auth(credential.access_token())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn put(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobReference, StorageError> {
        let signed_endpoint = format!("{}/signeds3upload", self.object_url(bucket, key));
        debug!("Uploading {} bytes to {}/{}", bytes.len(), bucket, key);

        let response = self
            .client
            .get(&signed_endpoint)
            .bearer_auth(credential.access_token())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let upload: SignedUpload = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::ParseError(e.to_string()))?;

        let target = upload
            .urls
            .first()
            .ok_or_else(|| StorageError::ParseError("signed upload returned no urls".to_string()))?;
        let response = self.client.put(target).body(bytes).send().await?;
        Self::check(response).await?;

        let response = self
            .client
            .post(&signed_endpoint)
            .bearer_auth(credential.access_token())
            .json(&json!({ "uploadKey": upload.upload_key }))
            .send()
            .await?;
        Self::check(response)
            .await?
            .json::<BlobReference>()
            .await
            .map_err(|e| StorageError::ParseError(e.to_string()))
    }

    async fn head_exists(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
    ) -> Result<bool, StorageError> {
        let response = self
            .client
            .head(format!("{}/details", self.object_url(bucket, key)))
            .bearer_auth(credential.access_token())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn signed_download_url(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        minutes: u32,
        single_use: bool,
    ) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!("{}/signed", self.object_url(bucket, key)))
            .query(&[("access", "read"), ("useCdn", "true")])
            .bearer_auth(credential.access_token())
            .json(&json!({ "minutesExpiration": minutes, "singleUse": single_use }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let resource: SignedResource = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::ParseError(e.to_string()))?;
        Ok(resource.signed_url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.client.get(url).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OssClient {
        OssClient::new(&ApsConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            auth_url: "http://localhost/token".to_string(),
            oss_url: "https://example.test/oss/v2/".to_string(),
            da_url: "https://example.test/da/v3".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_object_url_encodes_key() {
        let oss = client();
        assert_eq!(
            oss.object_url("bucket", "sub dir/first.dwg"),
            "https://example.test/oss/v2/buckets/bucket/objects/sub%20dir%2Ffirst.dwg"
        );
    }

    #[test]
    fn test_bucket_url_trims_trailing_slash() {
        assert_eq!(
            client().bucket_url("b"),
            "https://example.test/oss/v2/buckets/b"
        );
    }
}
