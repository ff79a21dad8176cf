pub mod auth;
pub mod automation;
pub mod config;
pub mod orchestrator;
pub mod storage;
pub mod testing;

pub use auth::{
    ApsTokenClient, AuthError, Credential, CredentialProvider, Scope, ScopeSet, TokenGrant,
    TokenSource,
};
pub use automation::{
    Activity, AppBundle, AutomationError, CombinedStatus, DaClient, DesignAutomation, JobGraph,
    Registrar, Registration, RegistrationOutcome, Statistics, Status, WorkItem, WorkItemBuilder,
    WorkItemStatus,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use orchestrator::{
    FinalResult, MergeRequest, OrchestratorError, PartRequest, ProgressCallback, ProgressEvent,
    ReferenceRequest, ReferenceResult, ResultLocation, WorkItemOrchestrator, WorkItemReport,
    WorkItemRole,
};
pub use storage::{BlobReference, BlobStore, ObjectResolver, OssClient, StorageError};
