use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub aps: ApsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// APS application credentials and service endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApsConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Two-legged token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Object storage service base URL
    #[serde(default = "default_oss_url")]
    pub oss_url: String,
    /// Design Automation base URL (region specific)
    #[serde(default = "default_da_url")]
    pub da_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_auth_url() -> String {
    "https://developer.api.autodesk.com/authentication/v2/token".to_string()
}

fn default_oss_url() -> String {
    "https://developer.api.autodesk.com/oss/v2".to_string()
}

fn default_da_url() -> String {
    "https://developer.api.autodesk.com/da/us-east/v3".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Bucket used for inputs, reserved outputs and downloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_bucket_key")]
    pub bucket_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_policy_key")]
    pub policy_key: String,
    /// Lifetime of issued download links
    #[serde(default = "default_signed_url_minutes")]
    pub signed_url_minutes: u32,
    #[serde(default)]
    pub single_use: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_key: default_bucket_key(),
            region: default_region(),
            policy_key: default_policy_key(),
            signed_url_minutes: default_signed_url_minutes(),
            single_use: false,
        }
    }
}

fn default_bucket_key() -> String {
    format!("darunner-{}", Utc::now().timestamp())
}

fn default_region() -> String {
    "US".to_string()
}

fn default_policy_key() -> String {
    "transient".to_string()
}

fn default_signed_url_minutes() -> u32 {
    15
}

/// Activities, app bundles and work item constraints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Application nickname that owns the registered bundles and activities
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Shared activity used for every part work item
    #[serde(default = "default_part_activity")]
    pub part_activity_id: String,
    #[serde(default = "default_merge_activity")]
    pub merge_activity: String,
    #[serde(default = "default_merge_bundle")]
    pub merge_bundle: String,
    /// Zip package of the merge tool. Bundle registration is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_zip: Option<PathBuf>,
    #[serde(default = "default_xref_activity")]
    pub xref_activity: String,
    /// Server-side processing limit for the combinator work item
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u32,
    #[serde(default = "default_true")]
    pub debug_upload_job_folder: bool,
}

impl AutomationConfig {
    /// Fully qualified alias id, e.g. `xrefgetapp.mergepdf+prod`.
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}+{}", self.nickname, name, self.label)
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            label: default_label(),
            engine: default_engine(),
            part_activity_id: default_part_activity(),
            merge_activity: default_merge_activity(),
            merge_bundle: default_merge_bundle(),
            bundle_zip: None,
            xref_activity: default_xref_activity(),
            time_limit_secs: default_time_limit(),
            debug_upload_job_folder: true,
        }
    }
}

fn default_nickname() -> String {
    "xrefgetapp".to_string()
}

fn default_label() -> String {
    "prod".to_string()
}

fn default_engine() -> String {
    "Autodesk.AutoCAD+24_3".to_string()
}

fn default_part_activity() -> String {
    "AutoCAD.PlotToPDF+prod".to_string()
}

fn default_merge_activity() -> String {
    "mergepdf".to_string()
}

fn default_merge_bundle() -> String {
    "mergepdfexe".to_string()
}

fn default_xref_activity() -> String {
    "fetchxrefs".to_string()
}

fn default_time_limit() -> u32 {
    900
}

fn default_true() -> bool {
    true
}

/// Work item status polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Upper bound on the whole wait for a submitted graph (unbounded when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_wait_secs: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    2000 // 2 seconds
}

/// Where reports and downloaded results land
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub download_results: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            download_results: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub aps: SanitizedApsConfig,
    pub storage: StorageConfig,
    pub automation: AutomationConfig,
    pub poller: PollerConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

/// APS config with the client secret hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedApsConfig {
    pub client_id: String,
    pub client_secret_configured: bool,
    pub auth_url: String,
    pub oss_url: String,
    pub da_url: String,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            aps: SanitizedApsConfig {
                client_id: config.aps.client_id.clone(),
                client_secret_configured: !config.aps.client_secret.is_empty(),
                auth_url: config.aps.auth_url.clone(),
                oss_url: config.aps.oss_url.clone(),
                da_url: config.aps.da_url.clone(),
                timeout_secs: config.aps.timeout_secs,
            },
            storage: config.storage.clone(),
            automation: config.automation.clone(),
            poller: config.poller.clone(),
            output: config.output.clone(),
            server: config.server.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[aps]
client_id = "id"
client_secret = "secret"
"#;

    #[test]
    fn test_deserialize_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.aps.client_id, "id");
        assert_eq!(config.aps.timeout_secs, 30);
        assert!(config.aps.da_url.ends_with("/da/us-east/v3"));
        assert_eq!(config.storage.region, "US");
        assert_eq!(config.storage.policy_key, "transient");
        assert_eq!(config.storage.signed_url_minutes, 15);
        assert!(config.storage.bucket_key.starts_with("darunner-"));
        assert_eq!(config.automation.time_limit_secs, 900);
        assert_eq!(config.poller.interval_ms, 2000);
        assert!(config.poller.max_wait_secs.is_none());
        assert!(config.output.download_results);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_deserialize_missing_aps_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_full_automation_section() {
        let toml = r#"
[aps]
client_id = "id"
client_secret = "secret"

[automation]
nickname = "myapp"
label = "dev"
bundle_zip = "/bundles/package.zip"
time_limit_secs = 300
debug_upload_job_folder = false

[poller]
interval_ms = 500
max_wait_secs = 600
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.automation.nickname, "myapp");
        assert_eq!(
            config.automation.bundle_zip.as_deref(),
            Some(std::path::Path::new("/bundles/package.zip"))
        );
        assert!(!config.automation.debug_upload_job_folder);
        assert_eq!(config.automation.qualified("mergepdf"), "myapp.mergepdf+dev");
        assert_eq!(config.poller.interval_ms, 500);
        assert_eq!(config.poller.max_wait_secs, Some(600));
    }

    #[test]
    fn test_sanitized_config_hides_secret() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.aps.client_secret_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("\"secret\""));
        assert!(json.contains("client_secret_configured"));
    }
}
