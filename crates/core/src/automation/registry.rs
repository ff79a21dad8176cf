//! One-time registration of the app bundle and activities work items use.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::config::AutomationConfig;
use crate::storage::BlobStore;

use super::builder::{
    FINAL_ARGUMENT, FINAL_LOCAL_NAME, REFERENCE_INPUT, REFERENCE_LOCAL_NAME, REFERENCE_OUTPUT,
};
use super::{AutomationError, DesignAutomation, Verb};

/// Parameter name that lets a work item pass any number of extra arguments.
pub const VARIADIC_PARAMETER: &str = "...";

/// Script run by the reference-fetch activity once the files are in place.
const LIST_FILES_SCRIPT: &str = "(vl-directory-files \"adskFiles\" nil 0)\n";

/// Activity parameter declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_environment_variable: Option<bool>,
}

/// Job type: engine, command line and parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub engine: String,
    pub command_line: Vec<String>,
    #[serde(default, rename = "appbundles", skip_serializing_if = "Vec::is_empty")]
    pub app_bundles: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Activity {
    /// Equal apart from id and version.
    pub fn same_definition(&self, other: &Activity) -> bool {
        self.engine == other.engine
            && self.command_line == other.command_line
            && self.app_bundles == other.app_bundles
            && self.parameters == other.parameters
            && self.settings == other.settings
            && self.description == other.description
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBundle {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Download link of the registered package; only present on reads.
    #[serde(default, skip_serializing)]
    pub package: Option<String>,
}

/// Form upload target returned when a bundle (version) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadParameters {
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    #[serde(rename = "formData", default)]
    pub form_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBundleDetails {
    pub version: u32,
    pub upload_parameters: UploadParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: String,
    pub version: u32,
}

/// Which registry an alias belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    AppBundle,
    Activity,
}

impl RegistryKind {
    pub fn path(&self) -> &'static str {
        match self {
            RegistryKind::AppBundle => "appbundles",
            RegistryKind::Activity => "activities",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Result of an ensure call: the qualified id work items should reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub id: String,
    pub outcome: RegistrationOutcome,
}

/// Makes sure the merge bundle and activities exist and match the local
/// definitions. Safe to call on every run.
pub struct Registrar {
    service: Arc<dyn DesignAutomation>,
    blobs: Arc<dyn BlobStore>,
    credentials: Arc<CredentialProvider>,
    config: AutomationConfig,
}

impl Registrar {
    pub fn new(
        service: Arc<dyn DesignAutomation>,
        blobs: Arc<dyn BlobStore>,
        credentials: Arc<CredentialProvider>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            service,
            blobs,
            credentials,
            config,
        }
    }

    /// Merge activity: the variadic parameter collects one argument per
    /// intermediate, `final` receives the merged document.
    pub fn merge_activity(&self) -> Activity {
        let bundle = &self.config.merge_bundle;
        Activity {
            id: self.config.merge_activity.clone(),
            version: None,
            engine: self.config.engine.clone(),
            command_line: vec![format!(
                "\"$(appbundles[{}].path)\\MergePDF.bundle\\Contents\\MergePDF.exe\"",
                bundle
            )],
            app_bundles: vec![self.config.qualified(bundle)],
            parameters: BTreeMap::from([
                (VARIADIC_PARAMETER.to_string(), Parameter::default()),
                (
                    FINAL_ARGUMENT.to_string(),
                    Parameter {
                        verb: Some(Verb::Store),
                        local_name: Some(FINAL_LOCAL_NAME.to_string()),
                        ..Parameter::default()
                    },
                ),
            ]),
            settings: BTreeMap::new(),
            description: None,
        }
    }

    /// Reference-fetch activity: pulls a document with its references and
    /// stores them zipped.
    pub fn reference_activity(&self) -> Activity {
        Activity {
            id: self.config.xref_activity.clone(),
            version: None,
            engine: self.config.engine.clone(),
            command_line: vec![format!(
                "\"$(engine.path)\\accoreconsole.exe\" /i \"$(args[{}].path)\" /s \"$(settings[script].path)\"",
                REFERENCE_INPUT
            )],
            app_bundles: Vec::new(),
            parameters: BTreeMap::from([
                (
                    REFERENCE_INPUT.to_string(),
                    Parameter {
                        verb: Some(Verb::ReferenceFetch),
                        required: Some(true),
                        ..Parameter::default()
                    },
                ),
                (
                    REFERENCE_OUTPUT.to_string(),
                    Parameter {
                        verb: Some(Verb::Store),
                        local_name: Some(REFERENCE_LOCAL_NAME.to_string()),
                        required: Some(true),
                        zip: Some(true),
                        ..Parameter::default()
                    },
                ),
            ]),
            settings: BTreeMap::from([(
                "script".to_string(),
                Setting {
                    value: LIST_FILES_SCRIPT.to_string(),
                    is_environment_variable: None,
                },
            )]),
            description: None,
        }
    }

    /// Register the merge tool package, or publish a new version when the
    /// registered package differs from `package`.
    pub async fn ensure_app_bundle(&self, package: &Path) -> Result<Registration, AutomationError> {
        if !package.is_file() {
            return Err(AutomationError::MissingPackage(package.to_path_buf()));
        }
        let local = tokio::fs::read(package).await?;
        let name = &self.config.merge_bundle;
        let qualified = self.config.qualified(name);
        let credential = self.credentials.internal().await?;

        let bundle = AppBundle {
            id: name.clone(),
            engine: self.config.engine.clone(),
            description: None,
            version: None,
            package: None,
        };

        let Some(existing) = self.service.get_app_bundle(&credential, &qualified).await? else {
            info!("Creating app bundle {}", qualified);
            let details = self.service.create_app_bundle(&credential, &bundle).await?;
            self.service
                .upload_app_bundle(&details.upload_parameters, local)
                .await?;
            self.service
                .create_alias(&credential, RegistryKind::AppBundle, name, &self.alias(details.version))
                .await?;
            return Ok(Registration {
                id: qualified,
                outcome: RegistrationOutcome::Created,
            });
        };

        let package_url = existing.package.ok_or_else(|| {
            AutomationError::UnexpectedResponse(format!("app bundle {} has no package link", qualified))
        })?;
        let remote = self.blobs.download(&package_url).await?;
        if Sha256::digest(&local) == Sha256::digest(&remote) {
            debug!("App bundle {} is up to date", qualified);
            return Ok(Registration {
                id: qualified,
                outcome: RegistrationOutcome::Unchanged,
            });
        }

        info!("Updating app bundle {}", qualified);
        let details = self
            .service
            .create_app_bundle_version(&credential, &bundle)
            .await?;
        self.service
            .upload_app_bundle(&details.upload_parameters, local)
            .await?;
        self.service
            .update_alias(&credential, RegistryKind::AppBundle, name, &self.alias(details.version))
            .await?;

        Ok(Registration {
            id: qualified,
            outcome: RegistrationOutcome::Updated,
        })
    }

    /// Create `activity`, or publish a new version when the registered one
    /// differs in anything but id and version.
    pub async fn ensure_activity(&self, activity: &Activity) -> Result<Registration, AutomationError> {
        let qualified = self.config.qualified(&activity.id);
        let credential = self.credentials.internal().await?;

        let Some(existing) = self.service.get_activity(&credential, &qualified).await? else {
            info!("Creating activity {}", qualified);
            let created = self.service.create_activity(&credential, activity).await?;
            self.service
                .create_alias(
                    &credential,
                    RegistryKind::Activity,
                    &activity.id,
                    &self.alias(created.version.unwrap_or(1)),
                )
                .await?;
            return Ok(Registration {
                id: qualified,
                outcome: RegistrationOutcome::Created,
            });
        };

        if existing.same_definition(activity) {
            debug!("Activity {} is up to date", qualified);
            return Ok(Registration {
                id: qualified,
                outcome: RegistrationOutcome::Unchanged,
            });
        }

        info!("Updating activity {}", qualified);
        let created = self
            .service
            .create_activity_version(&credential, activity)
            .await?;
        let version = created.version.ok_or_else(|| {
            AutomationError::UnexpectedResponse(format!("new version of {} has no number", qualified))
        })?;
        self.service
            .update_alias(&credential, RegistryKind::Activity, &activity.id, &self.alias(version))
            .await?;

        Ok(Registration {
            id: qualified,
            outcome: RegistrationOutcome::Updated,
        })
    }

    fn alias(&self, version: u32) -> Alias {
        Alias {
            id: self.config.label.clone(),
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAutomation, MockBlobStore, MockTokenSource};
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Harness {
        service: Arc<MockAutomation>,
        blobs: Arc<MockBlobStore>,
        registrar: Registrar,
    }

    fn harness() -> Harness {
        let blobs = Arc::new(MockBlobStore::new());
        let service = Arc::new(MockAutomation::new().with_package_store(blobs.clone()));
        let credentials = Arc::new(CredentialProvider::new(Arc::new(MockTokenSource::new())));
        let registrar = Registrar::new(
            service.clone(),
            blobs.clone(),
            credentials,
            AutomationConfig::default(),
        );
        Harness {
            service,
            blobs,
            registrar,
        }
    }

    fn package(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_merge_activity_declares_variadic_parameter() {
        let activity = harness().registrar.merge_activity();
        assert!(activity.parameters.contains_key(VARIADIC_PARAMETER));
        assert_eq!(
            activity.parameters[FINAL_ARGUMENT].local_name.as_deref(),
            Some(FINAL_LOCAL_NAME)
        );
        assert_eq!(activity.app_bundles, vec!["xrefgetapp.mergepdfexe+prod"]);

        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["parameters"]["..."], serde_json::json!({}));
        assert!(json["commandLine"][0].as_str().unwrap().contains("MergePDF.exe"));
    }

    #[test]
    fn test_same_definition_ignores_id_and_version() {
        let registrar = harness().registrar;
        let local = registrar.merge_activity();
        let mut remote = local.clone();
        remote.id = "xrefgetapp.mergepdf".to_string();
        remote.version = Some(7);
        assert!(local.same_definition(&remote));

        remote.command_line.push("extra".to_string());
        assert!(!local.same_definition(&remote));
    }

    #[tokio::test]
    async fn test_ensure_activity_is_idempotent() {
        let h = harness();
        let activity = h.registrar.merge_activity();

        let first = h.registrar.ensure_activity(&activity).await.unwrap();
        let second = h.registrar.ensure_activity(&activity).await.unwrap();

        assert_eq!(first.id, "xrefgetapp.mergepdf+prod");
        assert_eq!(first.outcome, RegistrationOutcome::Created);
        assert_eq!(second.outcome, RegistrationOutcome::Unchanged);
        assert_eq!(h.service.activity_version("mergepdf").await, Some(1));
    }

    #[tokio::test]
    async fn test_changed_activity_gets_new_version() {
        let h = harness();
        let mut activity = h.registrar.reference_activity();
        h.registrar.ensure_activity(&activity).await.unwrap();

        activity.description = Some("changed".to_string());
        let result = h.registrar.ensure_activity(&activity).await.unwrap();

        assert_eq!(result.outcome, RegistrationOutcome::Updated);
        assert_eq!(h.service.activity_version("fetchxrefs").await, Some(2));
    }

    #[tokio::test]
    async fn test_app_bundle_compares_package_hash() {
        let h = harness();
        let zip = package(b"bundle-v1");

        let created = h.registrar.ensure_app_bundle(zip.path()).await.unwrap();
        assert_eq!(created.outcome, RegistrationOutcome::Created);

        let unchanged = h.registrar.ensure_app_bundle(zip.path()).await.unwrap();
        assert_eq!(unchanged.outcome, RegistrationOutcome::Unchanged);

        let zip = package(b"bundle-v2");
        let updated = h.registrar.ensure_app_bundle(zip.path()).await.unwrap();
        assert_eq!(updated.outcome, RegistrationOutcome::Updated);
        assert_eq!(h.service.uploaded_packages().await.len(), 2);
        assert!(h.blobs.request_count() >= 2);
    }

    #[tokio::test]
    async fn test_missing_package_is_reported() {
        let h = harness();
        let result = h
            .registrar
            .ensure_app_bundle(Path::new("/no/such/package.zip"))
            .await;
        assert!(matches!(result, Err(AutomationError::MissingPackage(_))));
    }
}
