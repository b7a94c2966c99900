//! Remote demographics directories.
//!
//! A [`RemoteDirectory`] is one remote site that can look up or create a
//! person. Transport is up to the implementor; this module only decides what
//! to do with the raw response bodies. [`RemoteSync`] asks every configured
//! directory once and keeps the most complete usable answer. Remote problems
//! are logged and become `None`, never errors.

use serde_json::Value;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::person::PortableDocument;

/// Remote directory errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote directory unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("No remote servers configured")]
    NoServersConfigured,
}

/// One remote demographics site.
pub trait RemoteDirectory {
    /// Name used in logs, usually the server address.
    fn name(&self) -> &str;

    /// Look up a person from whatever demographics are known.
    ///
    /// Returns the raw response body.
    fn lookup(&self, known: &PortableDocument) -> Result<String, RemoteError>;

    /// Create a person on the remote site. Returns the raw response body.
    fn create(&self, document: &PortableDocument) -> Result<String, RemoteError>;
}

/// Queries a set of remote directories.
pub struct RemoteSync {
    directories: Vec<Box<dyn RemoteDirectory>>,
}

impl RemoteSync {
    pub fn new(directories: Vec<Box<dyn RemoteDirectory>>) -> Self {
        Self { directories }
    }

    /// One directory per configured server, built by `connect`.
    pub fn from_config<F>(config: &RemoteConfig, connect: F) -> Self
    where
        F: Fn(&str) -> Box<dyn RemoteDirectory>,
    {
        Self::new(config.servers.iter().map(|s| connect(s)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Most complete match for `known` across all directories.
    pub fn lookup(&self, known: &PortableDocument) -> Option<PortableDocument> {
        self.best_response("lookup", |dir| dir.lookup(known))
    }

    /// Remote match for a national id.
    pub fn lookup_by_identifier(&self, national_id: &str) -> Option<PortableDocument> {
        self.lookup(&PortableDocument::for_national_id(national_id))
    }

    /// Create `document` remotely, returning the site's view of the person.
    pub fn create_remote(&self, document: &PortableDocument) -> Option<PortableDocument> {
        self.best_response("create", |dir| dir.create(document))
    }

    fn best_response<F>(&self, operation: &str, call: F) -> Option<PortableDocument>
    where
        F: Fn(&dyn RemoteDirectory) -> Result<String, RemoteError>,
    {
        if self.directories.is_empty() {
            tracing::warn!(operation, "{}", RemoteError::NoServersConfigured);
            return None;
        }

        let mut candidates = Vec::new();
        for dir in &self.directories {
            match call(dir.as_ref()).and_then(|body| parse_response(&body)) {
                Ok(doc) => candidates.push(doc),
                Err(e) => {
                    tracing::warn!(
                        operation,
                        directory = dir.name(),
                        error = %e,
                        "remote directory gave no result"
                    );
                }
            }
        }

        // Ties go to the earliest directory
        let best = candidates
            .into_iter()
            .rev()
            .max_by_key(PortableDocument::populated_field_count);
        tracing::debug!(operation, found = best.is_some(), "remote query finished");
        best
    }
}

/// Parse a response body; bodies without a `"person"` object are unusable.
pub fn parse_response(body: &str) -> Result<PortableDocument, RemoteError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))?;
    if !value.get("person").map_or(false, Value::is_object) {
        return Err(RemoteError::Malformed("response has no person".into()));
    }
    PortableDocument::from_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeDirectory {
        name: String,
        response: Result<String, String>,
        calls: Rc<Cell<usize>>,
    }

    impl FakeDirectory {
        fn boxed(name: &str, response: Result<&str, &str>) -> Box<dyn RemoteDirectory> {
            Self::counted(name, response, Rc::new(Cell::new(0)))
        }

        fn counted(
            name: &str,
            response: Result<&str, &str>,
            calls: Rc<Cell<usize>>,
        ) -> Box<dyn RemoteDirectory> {
            Box::new(Self {
                name: name.to_string(),
                response: response.map(String::from).map_err(String::from),
                calls,
            })
        }

        fn respond(&self) -> Result<String, RemoteError> {
            self.calls.set(self.calls.get() + 1);
            self.response.clone().map_err(RemoteError::Unreachable)
        }
    }

    impl RemoteDirectory for FakeDirectory {
        fn name(&self) -> &str {
            &self.name
        }

        fn lookup(&self, _known: &PortableDocument) -> Result<String, RemoteError> {
            self.respond()
        }

        fn create(&self, _document: &PortableDocument) -> Result<String, RemoteError> {
            self.respond()
        }
    }

    const SPARSE: &str = r#"{"person": {"gender": "F"}}"#;
    const RICH: &str = r#"{"person": {
        "gender": "F",
        "names": {"given_name": "Mary", "family_name": "Banda"},
        "occupation": "Farmer",
        "patient": {"identifiers": {"National id": "P1701"}}
    }}"#;

    #[test]
    fn test_no_servers_yields_none() {
        let sync = RemoteSync::new(Vec::new());
        assert!(sync.is_empty());
        assert!(sync.lookup_by_identifier("P1701").is_none());
    }

    #[test]
    fn test_failures_yield_none() {
        let sync = RemoteSync::new(vec![
            FakeDirectory::boxed("down", Err("connection refused")),
            FakeDirectory::boxed("garbage", Ok("<html>oops</html>")),
            FakeDirectory::boxed("no-person", Ok(r#"{"error": "not found"}"#)),
        ]);
        assert!(sync.lookup(&PortableDocument::default()).is_none());
    }

    #[test]
    fn test_most_complete_response_wins() {
        let sync = RemoteSync::new(vec![
            FakeDirectory::boxed("a", Ok(SPARSE)),
            FakeDirectory::boxed("down", Err("timeout")),
            FakeDirectory::boxed("b", Ok(RICH)),
        ]);

        let doc = sync.lookup_by_identifier("P1701").unwrap();
        assert_eq!(doc.person.names.given_name.as_deref(), Some("Mary"));
        // flattened attribute migrated on parse
        assert_eq!(doc.person.attributes.occupation.as_deref(), Some("Farmer"));
    }

    #[test]
    fn test_null_sections_still_usable() {
        let body = r#"{"person": {
            "gender": "F",
            "names": null,
            "attributes": null,
            "patient": {"identifiers": {"National id": "P1", "ARV Number": null}}
        }}"#;
        let doc = parse_response(body).unwrap();
        assert_eq!(doc.national_id(), Some("P1"));

        let sync = RemoteSync::new(vec![FakeDirectory::boxed("legacy", Ok(body))]);
        let doc = sync.lookup_by_identifier("P1").unwrap();
        assert_eq!(doc.person.gender.as_deref(), Some("F"));
    }

    #[test]
    fn test_tie_goes_to_first_directory() {
        let first = r#"{"person": {"gender": "M"}}"#;
        let sync = RemoteSync::new(vec![
            FakeDirectory::boxed("a", Ok(first)),
            FakeDirectory::boxed("b", Ok(SPARSE)),
        ]);
        let doc = sync.create_remote(&PortableDocument::default()).unwrap();
        assert_eq!(doc.person.gender.as_deref(), Some("M"));
    }

    #[test]
    fn test_each_directory_called_once() {
        let calls = Rc::new(Cell::new(0));
        let sync = RemoteSync::new(vec![
            FakeDirectory::counted("a", Err("down"), Rc::clone(&calls)),
            FakeDirectory::counted("b", Ok(SPARSE), Rc::clone(&calls)),
        ]);
        sync.lookup(&PortableDocument::default());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = RemoteConfig {
            servers: vec!["10.0.0.2:3000".into(), "10.0.0.3".into()],
        };
        let sync =
            RemoteSync::from_config(&config, |server| FakeDirectory::boxed(server, Ok(SPARSE)));
        assert!(!sync.is_empty());
        assert!(sync.lookup(&PortableDocument::default()).is_some());
    }
}
