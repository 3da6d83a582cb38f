//!
//! Aliased model registry for the Argo gateway.
//!
//! Maps user-facing alias keys (e.g. `argo:gpt-4o`) to upstream internal ids
//! (e.g. `gpt4o`), classifies models as chat or embedding, and assigns each
//! one a wire-format family. Resolution is total: any input string resolves
//! to some internal id, falling back to the default model for the requested
//! kind. The registry is process-wide; reads take a cheap snapshot and a
//! refresh swaps in a new snapshot atomically, serialised against itself.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Wire-format family of an upstream model.
///
/// Determines which tool-call and content conventions apply when talking to
/// Argo about that model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    OpenAi,
    Anthropic,
    Google,
    Unknown,
}

///
/// Whether a model serves chat completions or embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Chat,
    Embed,
}

///
/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /** user-facing alias key, e.g. `argo:gpt-4o` */
    pub alias_key: String,
    /** upstream internal id, e.g. `gpt4o` */
    pub internal_id: String,
    pub kind: ModelKind,
    pub family: ModelFamily,
    /** present in the last catalogue fetch */
    pub available: bool,
}

///
/// One model reported by the upstream catalogue.
///
/// The catalogue may be a bare id list (no kind information) or objects
/// carrying a `type`/`kind` field; chat and embedding ids live in separate
/// namespaces, so the kind is kept when the upstream states it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogueModel {
    id: String,
    kind: Option<ModelKind>,
}

///
/// Immutable view of the registry contents.
///
/// The internal-id map is keyed by `(id, kind)`: chat and embedding models
/// are distinct namespaces and an id may legitimately exist in both.
#[derive(Debug, Default)]
struct Snapshot {
    /** alias key → entry */
    aliases: HashMap<String, ModelEntry>,
    /** (internal id, kind) → entry */
    internal: HashMap<(String, ModelKind), ModelEntry>,
}

///
/// Process-wide model registry.
///
/// Constructed at startup from the built-in catalogue; mutated only by
/// [`ModelRegistry::refresh`].
pub struct ModelRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
    /** serialises refresh against itself */
    refresh_lock: tokio::sync::Mutex<()>,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Default chat model internal id */
pub const DEFAULT_CHAT_MODEL: &str = "gpt4o";

/** Default embedding model internal id */
pub const DEFAULT_EMBED_MODEL: &str = "v3small";

/** Built-in chat catalogue: (alias key, internal id) */
const CHAT_MODELS: &[(&str, &str)] = &[
    ("argo:gpt-3.5", "gpt35"),
    ("argo:gpt-4", "gpt4"),
    ("argo:gpt-4o", "gpt4o"),
    ("argo:gpt-4o-latest", "gpt4olatest"),
    ("argo:gpt-4.1", "gpt41"),
    ("argo:gpt-o1-preview", "gpto1preview"),
    ("argo:gpt-o3-mini", "gpto3mini"),
    ("argo:gpt-o4-mini", "gpto4mini"),
    ("argo:claude-opus-4", "claudeopus4"),
    ("argo:claude-sonnet-4", "claudesonnet4"),
    ("argo:claude-sonnet-3.7", "claudesonnet37"),
    ("argo:claude-haiku-3.5", "claudehaiku35"),
    ("argo:gemini-2.5-pro", "gemini25pro"),
    ("argo:gemini-2.5-flash", "gemini25flash"),
];

/** Built-in embedding catalogue: (alias key, internal id) */
const EMBED_MODELS: &[(&str, &str)] = &[
    ("argo:text-embedding-ada-002", "ada002"),
    ("argo:text-embedding-3-small", "v3small"),
    ("argo:text-embedding-3-large", "v3large"),
];

/* --- start of code -------------------------------------------------------------------------- */

impl ModelFamily {
    ///
    /// Classify a model name or internal id by keyword.
    ///
    /// # Arguments
    ///  * `name` - model name, alias or internal id
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("claude") {
            ModelFamily::Anthropic
        } else if lower.contains("gemini") {
            ModelFamily::Google
        } else if lower.contains("gpt")
            || lower.contains("o1")
            || lower.contains("o3")
            || lower.contains("o4")
            || lower.contains("ada")
            || lower.starts_with("v3")
        {
            ModelFamily::OpenAi
        } else {
            ModelFamily::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::OpenAi => "openai",
            ModelFamily::Anthropic => "anthropic",
            ModelFamily::Google => "google",
            ModelFamily::Unknown => "unknown",
        }
    }
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Chat => "chat",
            ModelKind::Embed => "embed",
        }
    }
}

impl Snapshot {
    fn insert(&mut self, entry: ModelEntry) {
        self.internal.insert((entry.internal_id.clone(), entry.kind), entry.clone());
        self.aliases.insert(entry.alias_key.clone(), entry);
    }

    ///
    /// Merge an upstream catalogue into a fresh snapshot.
    ///
    /// Existing entries keep their alias and kind; their availability is set
    /// from the catalogue (a kind-less catalogue id confirms either kind).
    /// Catalogue models not in the table yet are registered under a
    /// generated `argo:<id>` alias in their stated kind namespace, chat when
    /// unstated. A kind-less id that is already known under either kind is
    /// treated as a confirmation, not a new model.
    fn merge_catalogue(&self, models: &[CatalogueModel]) -> Snapshot {
        let mut next = Snapshot::default();
        for entry in self.aliases.values() {
            let mut entry = entry.clone();
            entry.available = models.iter().any(|m| {
                m.id == entry.internal_id && m.kind.map(|k| k == entry.kind).unwrap_or(true)
            });
            next.insert(entry);
        }

        for model in models {
            let known = match model.kind {
                Some(kind) => next.internal.contains_key(&(model.id.clone(), kind)),
                None => {
                    next.internal.contains_key(&(model.id.clone(), ModelKind::Chat))
                        || next.internal.contains_key(&(model.id.clone(), ModelKind::Embed))
                }
            };
            let alias_key = format!("argo:{}", model.id);
            if known || next.aliases.contains_key(&alias_key) {
                continue;
            }
            next.insert(ModelEntry {
                alias_key,
                internal_id: model.id.clone(),
                kind: model.kind.unwrap_or(ModelKind::Chat),
                family: ModelFamily::classify(&model.id),
                available: true,
            });
        }
        next
    }

    fn builtin() -> Self {
        let mut snapshot = Snapshot::default();
        for (alias, internal) in CHAT_MODELS {
            snapshot.insert(ModelEntry {
                alias_key: (*alias).to_string(),
                internal_id: (*internal).to_string(),
                kind: ModelKind::Chat,
                family: ModelFamily::classify(internal),
                available: true,
            });
        }
        for (alias, internal) in EMBED_MODELS {
            snapshot.insert(ModelEntry {
                alias_key: (*alias).to_string(),
                internal_id: (*internal).to_string(),
                kind: ModelKind::Embed,
                family: ModelFamily::classify(internal),
                available: true,
            });
        }
        snapshot
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    ///
    /// Build a registry seeded with the built-in catalogue.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::builtin())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("model registry lock poisoned").clone()
    }

    ///
    /// Resolve any model name to an upstream internal id.
    ///
    /// Candidate transformations are applied cumulatively, returning on the
    /// first alias-key hit:
    /// 1. the name verbatim;
    /// 2. an exact internal-id match;
    /// 3. `/` replaced with `:`;
    /// 4. lower-cased;
    /// 5. prefixed with `argo:` when no family prefix is present.
    ///
    /// Resolution is total: when every candidate misses, the default model
    /// for `kind` is returned.
    ///
    /// # Arguments
    ///  * `name` - model name as supplied by the client
    ///  * `kind` - chat or embedding resolution namespace
    ///
    /// # Returns
    ///  * Upstream internal id (never empty)
    pub fn resolve(&self, name: &str, kind: ModelKind) -> String {
        let snapshot = self.current();
        let fallback = match kind {
            ModelKind::Chat => DEFAULT_CHAT_MODEL,
            ModelKind::Embed => DEFAULT_EMBED_MODEL,
        };

        if let Some(entry) = snapshot.aliases.get(name) {
            if entry.kind == kind {
                return entry.internal_id.clone();
            }
        }
        if let Some(entry) = snapshot.internal.get(&(name.to_string(), kind)) {
            return entry.internal_id.clone();
        }

        let mut candidate = name.replace('/', ":");
        if let Some(entry) = snapshot.aliases.get(&candidate) {
            if entry.kind == kind {
                return entry.internal_id.clone();
            }
        }

        candidate = candidate.to_lowercase();
        if let Some(entry) = snapshot.aliases.get(&candidate) {
            if entry.kind == kind {
                return entry.internal_id.clone();
            }
        }

        if !candidate.contains(':') {
            candidate = format!("argo:{}", candidate);
            if let Some(entry) = snapshot.aliases.get(&candidate) {
                if entry.kind == kind {
                    return entry.internal_id.clone();
                }
            }
        }

        warn!("Unknown {} model '{}', using default '{}'", kind.as_str(), name, fallback);
        fallback.to_string()
    }

    ///
    /// Look up the entry for an internal id, chat namespace first.
    pub fn entry(&self, internal_id: &str) -> Option<ModelEntry> {
        let snapshot = self.current();
        snapshot
            .internal
            .get(&(internal_id.to_string(), ModelKind::Chat))
            .or_else(|| snapshot.internal.get(&(internal_id.to_string(), ModelKind::Embed)))
            .cloned()
    }

    ///
    /// Wire-format family for a model name or internal id.
    ///
    /// Registry entries win; unregistered names fall back to keyword
    /// classification so passthrough model names still pick a sane dialect.
    pub fn family_of(&self, name: &str) -> ModelFamily {
        let snapshot = self.current();
        let entry = snapshot
            .internal
            .get(&(name.to_string(), ModelKind::Chat))
            .or_else(|| snapshot.internal.get(&(name.to_string(), ModelKind::Embed)))
            .or_else(|| snapshot.aliases.get(name));
        if let Some(entry) = entry {
            return entry.family;
        }
        ModelFamily::classify(name)
    }

    ///
    /// All entries, sorted by alias key (for `/v1/models`).
    pub fn list(&self) -> Vec<ModelEntry> {
        let snapshot = self.current();
        let mut entries: Vec<ModelEntry> = snapshot.aliases.values().cloned().collect();
        entries.sort_by(|a, b| a.alias_key.cmp(&b.alias_key));
        entries
    }

    ///
    /// Re-fetch the upstream model catalogue.
    ///
    /// Serialised against concurrent refreshes; readers keep the previous
    /// snapshot until the new one is swapped in. On any failure the previous
    /// registry is preserved and a non-fatal error is returned.
    ///
    /// # Arguments
    ///  * `client` - shared HTTP client
    ///  * `url` - catalogue endpoint URL
    ///
    /// # Returns
    ///  * Number of models known after the refresh
    pub async fn refresh(&self, client: &reqwest::Client, url: &str) -> Result<usize> {
        let _guard = self.refresh_lock.lock().await;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProxyError::UpstreamRejected {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::UpstreamInvalidResponse(e.to_string()))?;

        let upstream = parse_catalogue(&body)
            .ok_or_else(|| ProxyError::UpstreamInvalidResponse("unrecognised catalogue shape".to_string()))?;

        let next = self.current().merge_catalogue(&upstream);

        let count = next.aliases.len();
        *self.snapshot.write().expect("model registry lock poisoned") = Arc::new(next);
        info!("Model catalogue refreshed: {} models, {} upstream", count, upstream.len());
        Ok(count)
    }

    /// Test seam: swap in a snapshot merged from an already-parsed catalogue.
    #[cfg(test)]
    fn apply_catalogue(&self, models: &[CatalogueModel]) {
        let next = self.current().merge_catalogue(models);
        *self.snapshot.write().expect("model registry lock poisoned") = Arc::new(next);
    }
}

///
/// Extract the model list from a catalogue payload.
///
/// Accepts a bare array of ids, an array of `{id | model | name}` objects
/// (optionally with a `type`/`kind` field naming the chat or embedding
/// namespace), or either wrapped in a `data`/`models` field.
fn parse_catalogue(body: &Value) -> Option<Vec<CatalogueModel>> {
    let array = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.get("data").or_else(|| map.get("models"))?.as_array()?,
        _ => return None,
    };

    let mut models = Vec::new();
    for item in array {
        match item {
            Value::String(s) => models.push(CatalogueModel { id: s.clone(), kind: None }),
            Value::Object(map) => {
                let id = map
                    .get("id")
                    .or_else(|| map.get("model"))
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str);
                if let Some(id) = id {
                    let kind = map
                        .get("type")
                        .or_else(|| map.get("kind"))
                        .and_then(Value::as_str)
                        .and_then(|k| match k {
                            "chat" => Some(ModelKind::Chat),
                            "embed" | "embedding" => Some(ModelKind::Embed),
                            _ => None,
                        });
                    models.push(CatalogueModel { id: id.to_string(), kind });
                }
            }
            _ => {}
        }
    }
    Some(models)
}
