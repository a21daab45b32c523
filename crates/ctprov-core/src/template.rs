use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of a rendered consul-template configuration file.
///
/// `source` and `destination` are optional at the type level so that a
/// malformed entry can be reported with its index instead of failing
/// deserialization of the whole list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookbook: Option<String>,
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl TemplateDescriptor {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}
