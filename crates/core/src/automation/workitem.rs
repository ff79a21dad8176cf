//! Declarative work item descriptions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::auth::Credential;

/// What the service does with a file argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    /// Download the input before running.
    #[serde(rename = "get")]
    Fetch,
    /// Upload the output after running.
    #[serde(rename = "put")]
    Store,
    /// Download the input together with everything it references.
    #[serde(rename = "refget")]
    ReferenceFetch,
}

impl Verb {
    pub fn is_input(&self) -> bool {
        matches!(self, Verb::Fetch | Verb::ReferenceFetch)
    }
}

/// A file read or written by a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBinding {
    pub verb: Verb,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl FileBinding {
    fn new(verb: Verb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            local_name: None,
            headers: BTreeMap::new(),
            zip: None,
            required: None,
        }
    }

    pub fn fetch(url: impl Into<String>) -> Self {
        Self::new(Verb::Fetch, url)
    }

    pub fn store(url: impl Into<String>) -> Self {
        Self::new(Verb::Store, url)
    }

    pub fn reference_fetch(url: impl Into<String>) -> Self {
        Self::new(Verb::ReferenceFetch, url)
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Authorize the transfer with a raw bearer token.
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn with_credential(self, credential: &Credential) -> Self {
        self.with_header("Authorization", credential.bearer())
    }

    pub fn with_zip(mut self, zip: bool) -> Self {
        self.zip = Some(zip);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
}

/// Diagnostic switches understood by the service (`adskDebug`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugFlags {
    pub upload_job_folder: bool,
}

/// Inline string argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    pub value: String,
}

/// A named work item argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    File(FileBinding),
    Debug(DebugFlags),
    Text(TextValue),
}

impl Argument {
    pub fn as_file(&self) -> Option<&FileBinding> {
        match self {
            Argument::File(binding) => Some(binding),
            _ => None,
        }
    }
}

impl From<FileBinding> for Argument {
    fn from(binding: FileBinding) -> Self {
        Argument::File(binding)
    }
}

/// One unit of remote work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    activity_id: String,
    arguments: BTreeMap<String, Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit_processing_time_sec: Option<u32>,
}

impl WorkItem {
    pub fn builder(activity_id: impl Into<String>) -> WorkItemDraft {
        WorkItemDraft {
            item: WorkItem {
                activity_id: activity_id.into(),
                arguments: BTreeMap::new(),
                limit_processing_time_sec: None,
            },
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn arguments(&self) -> &BTreeMap<String, Argument> {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.get(name)
    }

    pub fn time_limit_secs(&self) -> Option<u32> {
        self.limit_processing_time_sec
    }

    /// File arguments with the given verb, in name order.
    pub fn files(&self, verb: Verb) -> impl Iterator<Item = (&str, &FileBinding)> {
        self.arguments.iter().filter_map(move |(name, argument)| {
            argument
                .as_file()
                .filter(|binding| binding.verb == verb)
                .map(|binding| (name.as_str(), binding))
        })
    }
}

/// Work item under construction.
#[derive(Debug, Clone)]
pub struct WorkItemDraft {
    item: WorkItem,
}

impl WorkItemDraft {
    pub fn argument(mut self, name: impl Into<String>, argument: impl Into<Argument>) -> Self {
        self.item.arguments.insert(name.into(), argument.into());
        self
    }

    pub fn debug(self, name: impl Into<String>, upload_job_folder: bool) -> Self {
        self.argument(name, Argument::Debug(DebugFlags { upload_job_folder }))
    }

    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.argument(
            name,
            Argument::Text(TextValue {
                value: value.into(),
            }),
        )
    }

    pub fn time_limit_secs(mut self, secs: u32) -> Self {
        self.item.limit_processing_time_sec = Some(secs);
        self
    }

    pub fn build(self) -> WorkItem {
        self.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_file_binding_serialization() {
        let binding = FileBinding::store("urn:adsk.objects:os.object:b/final.pdf")
            .with_local_name("final.pdf")
            .with_bearer_token("tok");

        let value = serde_json::to_value(&binding).unwrap();
        assert_eq!(
            value,
            json!({
                "verb": "put",
                "url": "urn:adsk.objects:os.object:b/final.pdf",
                "localName": "final.pdf",
                "headers": {"Authorization": "Bearer tok"}
            })
        );
    }

    #[test]
    fn test_work_item_serialization() {
        let credential = Credential::new("tok", Utc::now());
        let item = WorkItem::builder("app.activity+prod")
            .argument("input", FileBinding::fetch("urn:x").with_credential(&credential))
            .debug("adskDebug", true)
            .text("adskMask", "true")
            .time_limit_secs(900)
            .build();

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["activityId"], "app.activity+prod");
        assert_eq!(value["limitProcessingTimeSec"], 900);
        assert_eq!(value["arguments"]["input"]["verb"], "get");
        assert_eq!(
            value["arguments"]["adskDebug"],
            json!({"uploadJobFolder": true})
        );
        assert_eq!(value["arguments"]["adskMask"], json!({"value": "true"}));
    }

    #[test]
    fn test_untagged_arguments_round_trip_by_shape() {
        let json = r#"{
            "activityId": "a",
            "arguments": {
                "in": {"verb": "refget", "url": "https://x", "required": true},
                "dbg": {"uploadJobFolder": false},
                "txt": {"value": "v"}
            }
        }"#;
        let item: WorkItem = serde_json::from_str(json).unwrap();
        assert!(matches!(item.argument("in"), Some(Argument::File(_))));
        assert!(matches!(item.argument("dbg"), Some(Argument::Debug(_))));
        assert!(matches!(item.argument("txt"), Some(Argument::Text(_))));
        assert_eq!(item.files(Verb::ReferenceFetch).count(), 1);
        assert!(item.time_limit_secs().is_none());
    }
}
