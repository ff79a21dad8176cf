//! Design Automation v3 REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::auth::Credential;
use crate::config::ApsConfig;

use super::{
    Activity, Alias, AppBundle, AppBundleDetails, AutomationError, CombinedStatus,
    DesignAutomation, JobGraph, RegistryKind, UploadParameters, WorkItem, WorkItemStatus,
};

/// HTTP client for one Design Automation region.
pub struct DaClient {
    client: Client,
    base_url: String,
}

impl DaClient {
    pub fn new(config: &ApsConfig) -> Result<Self, AutomationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.da_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, AutomationError> {
        let response = Self::check(request.send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AutomationError::ParseError(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        credential: &Credential,
        path: &str,
        body: &B,
    ) -> Result<T, AutomationError> {
        debug!("POST {}", path);
        Self::send_json(
            self.client
                .post(self.url(path))
                .bearer_auth(credential.access_token())
                .json(body),
        )
        .await
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        path: &str,
    ) -> Result<Option<T>, AutomationError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(credential.access_token())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AutomationError::ParseError(e.to_string()))?;
        Ok(Some(body))
    }

    async fn check(response: Response) -> Result<Response, AutomationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(AutomationError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

/// Version endpoints reject a body that carries the id.
fn without_id<T: Clone>(value: &T, clear: impl FnOnce(&mut T)) -> T {
    let mut copy = value.clone();
    clear(&mut copy);
    copy
}

#[async_trait]
impl DesignAutomation for DaClient {
    fn name(&self) -> &str {
        "design-automation"
    }

    async fn submit_work_item(
        &self,
        credential: &Credential,
        item: &WorkItem,
    ) -> Result<WorkItemStatus, AutomationError> {
        self.post_json(credential, "workitems", item).await
    }

    async fn submit_combined(
        &self,
        credential: &Credential,
        graph: &JobGraph,
    ) -> Result<CombinedStatus, AutomationError> {
        self.post_json(credential, "workitems/combine", graph).await
    }

    async fn work_item_status(
        &self,
        credential: &Credential,
        id: &str,
    ) -> Result<WorkItemStatus, AutomationError> {
        Self::send_json(
            self.client
                .get(self.url(&format!("workitems/{}", urlencoding::encode(id))))
                .bearer_auth(credential.access_token()),
        )
        .await
    }

    async fn get_app_bundle(
        &self,
        credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<AppBundle>, AutomationError> {
        self.get_optional(credential, &format!("appbundles/{}", qualified_id))
            .await
    }

    async fn create_app_bundle(
        &self,
        credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError> {
        self.post_json(credential, "appbundles", bundle).await
    }

    async fn create_app_bundle_version(
        &self,
        credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError> {
        let body = without_id(bundle, |b| b.id.clear());
        self.post_json(credential, &format!("appbundles/{}/versions", bundle.id), &body)
            .await
    }

    async fn upload_app_bundle(
        &self,
        upload: &UploadParameters,
        package: Vec<u8>,
    ) -> Result<(), AutomationError> {
        let form = upload
            .form_data
            .iter()
            .fold(multipart::Form::new(), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            })
            .part("file", multipart::Part::bytes(package).file_name("package.zip"));

        debug!("Uploading app bundle package to {}", upload.endpoint_url);
        let response = self
            .client
            .post(&upload.endpoint_url)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_activity(
        &self,
        credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<Activity>, AutomationError> {
        self.get_optional(credential, &format!("activities/{}", qualified_id))
            .await
    }

    async fn create_activity(
        &self,
        credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError> {
        self.post_json(credential, "activities", activity).await
    }

    async fn create_activity_version(
        &self,
        credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError> {
        let body = without_id(activity, |a| a.id.clear());
        self.post_json(credential, &format!("activities/{}/versions", activity.id), &body)
            .await
    }

    async fn create_alias(
        &self,
        credential: &Credential,
        kind: RegistryKind,
        id: &str,
        alias: &Alias,
    ) -> Result<(), AutomationError> {
        let path = format!("{}/{}/aliases", kind.path(), id);
        let _: serde_json::Value = self.post_json(credential, &path, alias).await?;
        Ok(())
    }

    async fn update_alias(
        &self,
        credential: &Credential,
        kind: RegistryKind,
        id: &str,
        alias: &Alias,
    ) -> Result<(), AutomationError> {
        let path = format!("{}/{}/aliases/{}", kind.path(), id, alias.id);
        debug!("PATCH {}", path);
        let response = self
            .client
            .patch(self.url(&path))
            .bearer_auth(credential.access_token())
            .json(&serde_json::json!({ "version": alias.version }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base() {
        let client = DaClient::new(&ApsConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            auth_url: "http://localhost/token".to_string(),
            oss_url: "http://localhost/oss/v2".to_string(),
            da_url: "https://example.test/da/us-east/v3/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            client.url("workitems/combine"),
            "https://example.test/da/us-east/v3/workitems/combine"
        );
    }

    #[test]
    fn test_version_body_omits_id() {
        let bundle = AppBundle {
            id: "mergepdfexe".to_string(),
            engine: "Autodesk.AutoCAD+24_3".to_string(),
            description: None,
            version: None,
            package: Some("https://ignored".to_string()),
        };
        let body = without_id(&bundle, |b| b.id.clear());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("package").is_none());
        assert_eq!(json["engine"], "Autodesk.AutoCAD+24_3");
    }
}
