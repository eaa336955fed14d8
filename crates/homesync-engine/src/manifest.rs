//! Server-reported change-tokens.

use std::collections::HashMap;
use std::sync::Arc;

use homesync_core::EntityKind;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Method, Transport};

/// Endpoint reporting the server's last modification time.
pub const DEFAULT_MANIFEST_PATH: &str = "system/db-changed-time";

/// The server's current change-tokens.
///
/// `changed_time` is a database-wide token; `entities` optionally overrides
/// it per kind (keyed by kind name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChangeManifest {
    #[serde(default)]
    changed_time: Option<String>,
    #[serde(default)]
    entities: HashMap<String, String>,
}

impl ChangeManifest {
    /// A manifest with one token for every kind.
    pub fn global(token: impl Into<String>) -> Self {
        Self {
            changed_time: Some(token.into()),
            entities: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: EntityKind, token: impl Into<String>) -> Self {
        self.entities.insert(kind.name().to_string(), token.into());
        self
    }

    pub fn parse(payload: &[u8]) -> Result<Self, TransportError> {
        let manifest: ChangeManifest = serde_json::from_slice(payload)
            .map_err(|e| TransportError::ParseError(format!("change manifest: {}", e)))?;
        if manifest.changed_time.is_none() && manifest.entities.is_empty() {
            return Err(TransportError::ParseError(
                "change manifest carries no tokens".to_string(),
            ));
        }
        Ok(manifest)
    }

    /// Token for `kind`: its own entry, else the global one.
    pub fn token_for(&self, kind: EntityKind) -> Option<&str> {
        self.entities
            .get(kind.name())
            .or(self.changed_time.as_ref())
            .map(String::as_str)
    }
}

/// Lazily fetches the manifest at most once and shares it.
///
/// One source is created per refresh, so every kind in the refresh compares
/// against the same server state and the manifest costs one call at most.
pub struct ManifestSource {
    transport: Arc<dyn Transport>,
    path: String,
    manifest: OnceCell<ChangeManifest>,
}

impl ManifestSource {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            manifest: OnceCell::new(),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.manifest.initialized()
    }

    pub async fn get(&self) -> Result<&ChangeManifest, TransportError> {
        self.manifest
            .get_or_try_init(|| async {
                let payload = self.transport.call(Method::Get, &self.path, None).await?;
                let manifest = ChangeManifest::parse(&payload)?;
                debug!("Fetched change manifest {:?}", manifest);
                Ok(manifest)
            })
            .await
    }

    /// The server's token for `kind`.
    pub async fn token_for(&self, kind: EntityKind) -> Result<String, TransportError> {
        self.get()
            .await?
            .token_for(kind)
            .map(str::to_string)
            .ok_or_else(|| {
                TransportError::ParseError(format!("change manifest has no token for {}", kind))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::OfflineGate;
    use crate::transport::{HttpTransport, TransportConfig};
    use serde_json::json;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_global_token() {
        let manifest = ChangeManifest::parse(br#"{"changed_time": "2024-05-01 10:00:00"}"#).unwrap();
        assert_eq!(
            manifest.token_for(EntityKind::Products),
            Some("2024-05-01 10:00:00")
        );
        assert_eq!(manifest, ChangeManifest::global("2024-05-01 10:00:00"));
    }

    #[test]
    fn per_kind_tokens_override_global() {
        let manifest = ChangeManifest::parse(
            br#"{"changed_time": "g", "entities": {"products": "p7", "stock": "s2"}}"#,
        )
        .unwrap();
        assert_eq!(manifest.token_for(EntityKind::Products), Some("p7"));
        assert_eq!(manifest.token_for(EntityKind::Stock), Some("s2"));
        assert_eq!(manifest.token_for(EntityKind::Locations), Some("g"));
    }

    #[test]
    fn per_kind_only() {
        let manifest = ChangeManifest::default().with_kind(EntityKind::Tasks, "t1");
        assert_eq!(manifest.token_for(EntityKind::Tasks), Some("t1"));
        assert_eq!(manifest.token_for(EntityKind::Chores), None);
    }

    #[test]
    fn parse_rejects_empty_and_garbage() {
        assert!(matches!(
            ChangeManifest::parse(b"{}"),
            Err(TransportError::ParseError(_))
        ));
        assert!(matches!(
            ChangeManifest::parse(b"[1,2]"),
            Err(TransportError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn source_fetches_once() {
        let server = MockServer::start().await;
        Mock::given(path("/api/system/db-changed-time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"changed_time": "t5"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = Arc::new(
            HttpTransport::new(
                &TransportConfig::new(format!("{}/api", server.uri())),
                OfflineGate::new(),
            )
            .unwrap(),
        );
        let source = Arc::new(ManifestSource::new(transport, DEFAULT_MANIFEST_PATH));
        assert!(!source.is_fetched());

        let lookups = EntityKind::ALL.iter().map(|&kind| {
            let source = source.clone();
            async move { source.token_for(kind).await }
        });
        for token in futures::future::join_all(lookups).await {
            assert_eq!(token.unwrap(), "t5");
        }
        assert!(source.is_fetched());
    }
}
