//! The payload contract shared by resolvers and requesters.

use std::collections::BTreeMap;

/// Data and metadata produced by a successful fetch.
pub trait ResolvedResource: Send + Sync {
    /// Raw payload bytes.
    fn data(&self) -> &[u8];

    /// Metadata accompanying the payload. May be empty.
    fn annotations(&self) -> BTreeMap<String, String>;
}

/// Plain owned implementation of [`ResolvedResource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    data: Vec<u8>,
    annotations: BTreeMap<String, String>,
}

impl Resource {
    /// Create a resource with no annotations.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Attach an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Replace all annotations.
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Consume the resource and return the payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl ResolvedResource for Resource {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        self.annotations.clone()
    }
}
