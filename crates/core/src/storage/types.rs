use serde::{Deserialize, Serialize};

/// Stored object as reported by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobReference {
    pub bucket_key: String,
    /// URN usable as a work item argument URL.
    pub object_id: String,
    pub object_key: String,
}

impl BlobReference {
    /// Build the reference the storage service would report for `bucket/key`.
    pub fn new(bucket_key: impl Into<String>, object_key: impl Into<String>) -> Self {
        let bucket_key = bucket_key.into();
        let object_key = object_key.into();
        Self {
            object_id: format!("urn:adsk.objects:os.object:{}/{}", bucket_key, object_key),
            bucket_key,
            object_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub bucket_key: String,
    #[serde(default)]
    pub policy_key: Option<String>,
    #[serde(default)]
    pub created_date: Option<i64>,
}

/// Body returned when requesting a signed upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedUpload {
    pub upload_key: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BucketPage {
    pub items: Vec<BucketSummary>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedResource {
    pub signed_url: String,
}
