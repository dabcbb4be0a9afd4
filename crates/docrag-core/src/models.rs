//! Record types shared by the registry, ingestion, and retrieval layers.
//!
//! Ownership is strictly hierarchical: a [`Provider`] owns its [`Model`]s,
//! a [`Collection`] owns its [`Document`]s, and a [`Document`] owns its
//! [`Chunk`]s. Identifiers are UUID v4 strings; timestamps are Unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// An inference server on the local machine or network (no credential).
    Local,
    /// A remote hosted API that requires a credential.
    Api,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Api => "api",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ProviderKind::Local),
            "api" => Ok(ProviderKind::Api),
            other => Err(format!("unknown provider kind: '{}'", other)),
        }
    }
}

/// Outcome of the most recent connection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Success,
    Error,
    #[default]
    Unset,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Success => "success",
            TestResult::Error => "error",
            TestResult::Unset => "unset",
        }
    }
}

impl FromStr for TestResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TestResult::Success),
            "error" => Ok(TestResult::Error),
            "unset" | "" => Ok(TestResult::Unset),
            other => Err(format!("unknown test result: '{}'", other)),
        }
    }
}

/// Settings for a local inference server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalConfig {
    pub base_url: String,
    /// How long the server should keep a model loaded (e.g. `"5m"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    /// Provider-specific keys, round-tripped untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Settings for a remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    /// API version header value, for providers that version by header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Organization or project scoping header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Provider-specific keys, round-tripped untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Typed provider configuration, one shape per [`ProviderKind`].
///
/// Serialized as a JSON object tagged with `"kind"`; unknown keys are
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Local(LocalConfig),
    Api(ApiConfig),
}

impl ProviderConfig {
    pub fn local(base_url: impl Into<String>) -> Self {
        ProviderConfig::Local(LocalConfig {
            base_url: base_url.into(),
            keep_alive: None,
            options: serde_json::Map::new(),
        })
    }

    pub fn api(base_url: impl Into<String>) -> Self {
        ProviderConfig::Api(ApiConfig {
            base_url: base_url.into(),
            api_version: None,
            organization: None,
            options: serde_json::Map::new(),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Local(_) => ProviderKind::Local,
            ProviderConfig::Api(_) => ProviderKind::Api,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            ProviderConfig::Local(c) => &c.base_url,
            ProviderConfig::Api(c) => &c.base_url,
        }
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        match self {
            ProviderConfig::Local(c) => c.base_url = base_url.into(),
            ProviderConfig::Api(c) => c.base_url = base_url.into(),
        }
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url().trim_end_matches('/'), path)
    }
}

/// A configured source of chat and/or embedding capability.
#[derive(Clone)]
pub struct Provider {
    pub id: String,
    /// Unique across all providers; also selects the provider strategy.
    pub name: String,
    pub credential: Option<String>,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_test_result: TestResult,
    pub last_test_message: Option<String>,
    pub config: ProviderConfig,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        self.config.kind()
    }

    /// The stored credential, treating an empty string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|c| !c.trim().is_empty())
    }
}

// Credentials never reach logs through `{:?}`.
impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("credential", &self.credential().map(mask_secret))
            .field("is_active", &self.is_active)
            .field("is_connected", &self.is_connected)
            .field("last_test_result", &self.last_test_result)
            .field("last_test_message", &self.last_test_message)
            .field("config", &self.config)
            .finish()
    }
}

/// Mask a secret for display, keeping at most the last four characters.
///
/// ```rust
/// use docrag_core::models::mask_secret;
///
/// assert_eq!(mask_secret("sk-abcdefghijkl"), "****ijkl");
/// assert_eq!(mask_secret("short"), "****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Externally visible projection of a [`Provider`]: the credential is
/// reduced to a presence flag and a masked hint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    pub has_credential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_hint: Option<String>,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_test_result: TestResult,
    pub last_test_message: Option<String>,
    pub config: ProviderConfig,
}

impl From<&Provider> for ProviderView {
    fn from(p: &Provider) -> Self {
        ProviderView {
            id: p.id.clone(),
            name: p.name.clone(),
            kind: p.kind(),
            has_credential: p.credential().is_some(),
            credential_hint: p.credential().map(mask_secret),
            is_active: p.is_active,
            is_connected: p.is_connected,
            last_test_result: p.last_test_result,
            last_test_message: p.last_test_message.clone(),
            config: p.config.clone(),
        }
    }
}

/// A catalog entry as produced by a provider's model listing, before it
/// is bound to a stored provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub model_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub metadata: serde_json::Value,
}

impl ModelSpec {
    pub fn new(model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            display_name: model_id.clone(),
            model_id,
            description: None,
            is_default: false,
            metadata: serde_json::json!({}),
        }
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_model(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// A named capability offered by a provider. `(provider_id, model_id)`
/// is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    pub model_id: String,
    pub display_name: String,
    pub is_default: bool,
    pub is_available: bool,
    pub is_selected: bool,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

impl Model {
    pub fn from_spec(provider_id: &str, spec: ModelSpec) -> Self {
        Model {
            id: uuid::Uuid::new_v4().to_string(),
            provider_id: provider_id.to_string(),
            model_id: spec.model_id,
            display_name: spec.display_name,
            is_default: spec.is_default,
            is_available: true,
            is_selected: false,
            description: spec.description,
            metadata: spec.metadata,
        }
    }
}

/// A named group of documents sharing chunking parameters and one
/// embedding space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_provider_id: String,
    pub embedding_model_id: String,
    pub created_at: i64,
}

impl Collection {
    /// Whether two collections embed into the same vector space.
    pub fn same_embedding_space(&self, other: &Collection) -> bool {
        self.embedding_provider_id == other.embedding_provider_id
            && self.embedding_model_id == other.embedding_model_id
    }
}

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl FileType {
    /// Match a filename's extension (case-insensitive) against the allow-list.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        ext.to_ascii_lowercase().parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Pptx => "pptx",
            FileType::Xlsx => "xlsx",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileType::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileType::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            "pptx" => Ok(FileType::Pptx),
            "xlsx" => Ok(FileType::Xlsx),
            other => Err(format!("unsupported file type: '{}'", other)),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file and its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub collection_id: String,
    pub filename: String,
    pub filepath: String,
    pub file_type: FileType,
    pub file_size_bytes: u64,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub raw_content: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A bounded substring of a document's content.
///
/// `start_offset`/`end_offset` are character (not byte) offsets into the
/// document's `raw_content`, half-open. `embedding` is `None` when the
/// embedding call for this chunk failed; such chunks are never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("report.PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("a.b.docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_filename("deck.pptx"), Some(FileType::Pptx));
        assert_eq!(FileType::from_filename("sheet.xlsx"), Some(FileType::Xlsx));
        assert_eq!(FileType::from_filename("notes.txt"), None);
        assert_eq!(FileType::from_filename("README"), None);
    }

    #[test]
    fn test_provider_config_tagged_roundtrip() {
        let json = serde_json::json!({
            "kind": "api",
            "baseUrl": "https://api.example.com/v1",
            "apiVersion": "2023-06-01",
            "options": { "region": "eu", "beta": true }
        });
        let config: ProviderConfig = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(config.kind(), ProviderKind::Api);
        match &config {
            ProviderConfig::Api(api) => assert_eq!(api.options["region"], "eu"),
            other => panic!("unexpected config: {:?}", other),
        }
        assert_eq!(serde_json::to_value(&config).unwrap(), json);
    }

    #[test]
    fn test_provider_config_rejects_unknown_keys() {
        let json = serde_json::json!({
            "kind": "local",
            "baseUrl": "http://localhost:11434",
            "apiKey": "oops"
        });
        assert!(serde_json::from_value::<ProviderConfig>(json).is_err());
    }

    #[test]
    fn test_provider_config_endpoint_strips_slash() {
        let config = ProviderConfig::local("http://localhost:11434/");
        assert_eq!(config.endpoint("/api/tags"), "http://localhost:11434/api/tags");
    }

    #[test]
    fn test_provider_debug_masks_credential() {
        let provider = Provider {
            id: "p1".to_string(),
            name: "openai".to_string(),
            credential: Some("sk-supersecretvalue1234".to_string()),
            is_active: true,
            is_connected: false,
            last_test_result: TestResult::Unset,
            last_test_message: None,
            config: ProviderConfig::api("https://api.openai.com/v1"),
            created_at: 0,
            updated_at: 0,
        };
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("****1234"));

        let view = ProviderView::from(&provider);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("supersecret"));
        assert!(json.contains("\"hasCredential\":true"));
    }

    #[test]
    fn test_blank_credential_is_absent() {
        let provider = Provider {
            id: "p1".to_string(),
            name: "openai".to_string(),
            credential: Some("   ".to_string()),
            is_active: true,
            is_connected: false,
            last_test_result: TestResult::Unset,
            last_test_message: None,
            config: ProviderConfig::api("https://api.openai.com/v1"),
            created_at: 0,
            updated_at: 0,
        };
        assert!(provider.credential().is_none());
    }
}
