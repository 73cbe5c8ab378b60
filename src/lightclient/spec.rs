/// Chain specification store
///
/// Resolution order: session cache, user-registered custom spec, built-in
/// bundle, remote fetch. The first hit wins and is cached for the session.
/// Every source goes through `validate_chain_spec` before it is cached.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::LightClientError;

/// Fields of a chain spec the core relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpecInfo {
    pub name: String,
    pub id: String,
    pub relay_chain: Option<String>,
    pub para_id: Option<u32>,
}

impl ChainSpecInfo {
    pub fn is_parachain(&self) -> bool {
        self.relay_chain.is_some()
    }
}

/// Check a raw spec is a JSON object with non-empty `name`, `id` and
/// `genesis`. Parachain specs must carry both the relay chain and para id.
pub fn validate_chain_spec(raw: &str) -> Result<ChainSpecInfo, LightClientError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| LightClientError::InvalidSpec(format!("not JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| LightClientError::InvalidSpec("not a JSON object".into()))?;

    let non_empty = |key: &str| -> Result<String, LightClientError> {
        match obj.get(key).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            _ => Err(LightClientError::InvalidSpec(format!("missing {}", key))),
        }
    };
    let name = non_empty("name")?;
    let id = non_empty("id")?;

    match obj.get("genesis") {
        Some(serde_json::Value::Object(genesis)) if !genesis.is_empty() => {}
        Some(serde_json::Value::String(genesis)) if !genesis.is_empty() => {}
        _ => return Err(LightClientError::InvalidSpec("missing genesis".into())),
    }

    let relay_chain = obj
        .get("relay_chain")
        .or_else(|| obj.get("relayChain"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let para_id = obj
        .get("para_id")
        .or_else(|| obj.get("paraId"))
        .and_then(|v| v.as_u64())
        .map(|v| {
            u32::try_from(v).map_err(|_| LightClientError::InvalidSpec(format!("para id {}", v)))
        })
        .transpose()?;

    if relay_chain.is_some() != para_id.is_some() {
        return Err(LightClientError::InvalidSpec(format!(
            "parachain spec {} needs both relay_chain and para_id",
            id
        )));
    }

    Ok(ChainSpecInfo {
        name,
        id,
        relay_chain,
        para_id,
    })
}

/// Remote spec source.
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self, chain_id: &str) -> Result<String, LightClientError>;
}

/// Fetches `{base_url}/{chain_id}.json`.
pub struct HttpSpecFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSpecFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, chain_id: &str) -> Result<String, LightClientError> {
        let url = format!("{}/{}.json", self.base_url, chain_id);
        log::debug!("Fetching chain spec from {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LightClientError::ConnectionFailed(format!("{}: {}", url, e)))?;
        response
            .text()
            .await
            .map_err(|e| LightClientError::ConnectionFailed(format!("{}: {}", url, e)))
    }
}

pub struct ChainSpecStore {
    cache: RwLock<HashMap<String, Arc<str>>>,
    custom: RwLock<HashMap<String, Arc<str>>>,
    builtin: HashMap<String, Arc<str>>,
    fetcher: Option<Arc<dyn SpecFetcher>>,
}

impl ChainSpecStore {
    pub fn new(fetcher: Option<Arc<dyn SpecFetcher>>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            custom: RwLock::new(HashMap::new()),
            builtin: HashMap::new(),
            fetcher,
        }
    }

    /// Add a bundled spec. Invalid specs are rejected here, not at resolve time.
    pub fn with_builtin(mut self, chain_id: &str, raw: &str) -> Result<Self, LightClientError> {
        validate_chain_spec(raw)?;
        self.builtin.insert(chain_id.to_string(), Arc::from(raw));
        Ok(self)
    }

    /// Load every `<chain_id>.json` in `dir` as a bundled spec.
    pub fn with_builtin_dir(mut self, dir: &Path) -> Result<Self, LightClientError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            LightClientError::InvalidSpec(format!("cannot read {}: {}", dir.display(), e))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(chain_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                LightClientError::InvalidSpec(format!("cannot read {}: {}", path.display(), e))
            })?;
            self = self.with_builtin(chain_id, &raw)?;
            log::debug!("Loaded bundled chain spec {}", chain_id);
        }
        Ok(self)
    }

    /// Register a user-supplied spec. Overwrites any earlier registration and
    /// the cached copy.
    pub fn register_custom(&self, chain_id: &str, raw: &str) -> Result<ChainSpecInfo, LightClientError> {
        let info = validate_chain_spec(raw)?;
        let raw: Arc<str> = Arc::from(raw);
        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_id.to_string(), raw.clone());
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_id.to_string(), raw);
        log::info!("Registered custom chain spec {} ({})", chain_id, info.name);
        Ok(info)
    }

    pub fn is_cached(&self, chain_id: &str) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(chain_id)
    }

    pub async fn resolve(&self, chain_id: &str) -> Result<Arc<str>, LightClientError> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned();
        if let Some(raw) = cached {
            log::debug!("Chain spec cache hit for {}", chain_id);
            return Ok(raw);
        }

        let custom = self
            .custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned();
        let raw = match custom.or_else(|| self.builtin.get(chain_id).cloned()) {
            Some(raw) => raw,
            None => {
                let fetcher = self
                    .fetcher
                    .as_ref()
                    .ok_or_else(|| LightClientError::SpecNotFound(chain_id.to_string()))?;
                let fetched = fetcher.fetch(chain_id).await?;
                validate_chain_spec(&fetched)?;
                log::info!("Fetched chain spec for {}", chain_id);
                Arc::from(fetched.as_str())
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.entry(chain_id.to_string()).or_insert(raw);
        Ok(entry.clone())
    }

    /// Drop cached copies (custom and built-in registrations stay).
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
