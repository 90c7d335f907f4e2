//! Shared object repository: named element descriptors reused across sessions.

use crate::descriptor::ElementDescriptor;
use std::collections::HashMap;
use std::path::Path;

use crate::session::SessionError;

pub trait ObjectRepository: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ElementDescriptor>;

    fn names(&self) -> Vec<String>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryObjectRepository {
    objects: HashMap<String, ElementDescriptor>,
}

impl InMemoryObjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, name: impl Into<String>, descriptor: ElementDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: ElementDescriptor) {
        self.objects.insert(name.into(), descriptor);
    }
}

impl ObjectRepository for InMemoryObjectRepository {
    fn lookup(&self, name: &str) -> Option<ElementDescriptor> {
        self.objects.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Repository backed by a JSON file mapping object name to descriptor.
#[derive(Clone, Debug, Default)]
pub struct JsonObjectRepository {
    inner: InMemoryObjectRepository,
}

impl JsonObjectRepository {
    pub fn from_json_str(raw: &str) -> Result<Self, SessionError> {
        let objects: HashMap<String, ElementDescriptor> = serde_json::from_str(raw)?;
        Ok(Self {
            inner: InMemoryObjectRepository { objects },
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.inner.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.objects.is_empty()
    }
}

impl ObjectRepository for JsonObjectRepository {
    fn lookup(&self, name: &str) -> Option<ElementDescriptor> {
        self.inner.lookup(name)
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_repository_resolves_names() {
        let repo = JsonObjectRepository::from_json_str(
            r#"{
                "LoginButton": { "id": "login", "tag": "button", "text": "Sign in" },
                "SearchBox": { "css": "input[type=search]" }
            }"#,
        )
        .unwrap();
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.names(), vec!["LoginButton", "SearchBox"]);
        let login = repo.lookup("LoginButton").unwrap();
        assert_eq!(login.id(), Some("login"));
        assert!(repo.lookup("Missing").is_none());
    }
}
