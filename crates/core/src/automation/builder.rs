//! Builds the work items the orchestrator submits.

use std::collections::HashSet;
use std::path::Path;

use crate::auth::Credential;
use crate::config::AutomationConfig;
use crate::storage::BlobReference;

use super::{FileBinding, WorkItem, INTERMEDIATE_PREFIX};

/// Argument names of the shared plot activity.
pub const PART_INPUT: &str = "HostDwg";
pub const PART_OUTPUT: &str = "Result";

/// Output argument of the merge activity and the file name the tool writes.
pub const FINAL_ARGUMENT: &str = "final";
pub const FINAL_LOCAL_NAME: &str = "final.pdf";

/// Argument names of the reference-fetch activity.
pub const REFERENCE_INPUT: &str = "inputFile";
pub const REFERENCE_OUTPUT: &str = "etransmit";
pub const REFERENCE_LOCAL_NAME: &str = "adskFiles";

/// Creates part, combinator and reference work items from configuration.
#[derive(Debug, Clone)]
pub struct WorkItemBuilder {
    config: AutomationConfig,
}

impl WorkItemBuilder {
    pub fn new(config: AutomationConfig) -> Self {
        Self { config }
    }

    pub fn merge_activity_id(&self) -> String {
        self.config.qualified(&self.config.merge_activity)
    }

    pub fn reference_activity_id(&self) -> String {
        self.config.qualified(&self.config.xref_activity)
    }

    /// Plot one input to the intermediate `output_key`.
    pub fn part_work_item(
        &self,
        input: &BlobReference,
        output_key: &str,
        credential: &Credential,
    ) -> WorkItem {
        WorkItem::builder(&self.config.part_activity_id)
            .argument(
                PART_INPUT,
                FileBinding::fetch(&input.object_id).with_credential(credential),
            )
            .argument(
                PART_OUTPUT,
                FileBinding::store(format!("{}{}", INTERMEDIATE_PREFIX, output_key)),
            )
            .build()
    }

    /// Merge the intermediates into `output`.
    ///
    /// `intermediates` pairs each intermediate key with the reserved object it
    /// is also published to. Each gets an argument named after the key's stem,
    /// matched by the activity's variadic parameter.
    pub fn combinator_work_item(
        &self,
        intermediates: &[(String, BlobReference)],
        output: &BlobReference,
        credential: &Credential,
    ) -> WorkItem {
        let mut taken: HashSet<String> = HashSet::from([
            FINAL_ARGUMENT.to_string(),
            "adskDebug".to_string(),
            "adskMask".to_string(),
        ]);

        let draft = intermediates.iter().fold(
            WorkItem::builder(self.merge_activity_id()),
            |draft, (key, reserved)| {
                let name = unique_name(argument_stem(key), &mut taken);
                draft.argument(
                    name,
                    FileBinding::store(&reserved.object_id)
                        .with_local_name(key)
                        .with_credential(credential),
                )
            },
        );

        draft
            .argument(
                FINAL_ARGUMENT,
                FileBinding::store(&output.object_id)
                    .with_local_name(FINAL_LOCAL_NAME)
                    .with_credential(credential),
            )
            .debug("adskDebug", self.config.debug_upload_job_folder)
            .text("adskMask", "true")
            .time_limit_secs(self.config.time_limit_secs)
            .build()
    }

    /// Fetch a caller-owned resource with everything it references and store
    /// the zipped bundle to `output`.
    pub fn reference_work_item(
        &self,
        source_url: &str,
        source_token: &str,
        output: &BlobReference,
        credential: &Credential,
    ) -> WorkItem {
        WorkItem::builder(self.reference_activity_id())
            .argument(
                REFERENCE_INPUT,
                FileBinding::reference_fetch(source_url)
                    .with_bearer_token(source_token)
                    .with_required(true),
            )
            .argument(
                REFERENCE_OUTPUT,
                FileBinding::store(&output.object_id)
                    .with_local_name(REFERENCE_LOCAL_NAME)
                    .with_credential(credential)
                    .with_zip(true)
                    .with_required(true),
            )
            .build()
    }
}

fn argument_stem(key: &str) -> &str {
    Path::new(key)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("part")
}

fn unique_name(stem: &str, taken: &mut HashSet<String>) -> String {
    let mut name = stem.to_string();
    let mut suffix = 2;
    while !taken.insert(name.clone()) {
        name = format!("{}_{}", stem, suffix);
        suffix += 1;
    }
    name
}
