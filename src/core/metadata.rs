//! Token metadata resolution
//!
//! Decimals are resolved in order of authority:
//!   1. address override table
//!   2. live `decimals()` read
//!   3. symbol override table (after alias canonicalization)
//!   4. local metadata store
//!   5. configured default, only when explicitly allowed
//!
//! A stale cached value must never shadow a live read: mis-cached decimals
//! scale an amount by orders of magnitude.

use alloy_primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::config::EngineConfig;
use crate::models::errors::{EngineError, EngineResult};
use crate::models::types::{BlockPin, TokenInfo, TokenMetadataSource};
use crate::providers::chain::{Accessor, ChainStateReader};
use crate::utils::cache::SnapshotCache;
use crate::utils::constants::{short_address, MAX_TOKEN_DECIMALS};

/// Locally cached token fields; either may be unknown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTokenMetadata {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Local metadata cache collaborator
pub trait TokenMetadataStore: Send + Sync {
    fn get(&self, token: &Address) -> Option<CachedTokenMetadata>;
    fn put(&self, token: Address, metadata: CachedTokenMetadata);
}

/// `TokenMetadataStore` held in memory, optionally seeded from JSON
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    entries: DashMap<Address, CachedTokenMetadata>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON object of `address -> {symbol, decimals}`
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let map: HashMap<Address, CachedTokenMetadata> = serde_json::from_str(raw)?;
        let store = Self::new();
        for (token, metadata) in map {
            store.entries.insert(token, metadata);
        }
        Ok(store)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let store = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!("📦 Loaded {} cached tokens from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        let map: HashMap<Address, CachedTokenMetadata> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        Ok(serde_json::to_string_pretty(&map)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenMetadataStore for InMemoryTokenStore {
    fn get(&self, token: &Address) -> Option<CachedTokenMetadata> {
        self.entries.get(token).map(|entry| entry.value().clone())
    }

    fn put(&self, token: Address, metadata: CachedTokenMetadata) {
        self.entries.insert(token, metadata);
    }
}

pub struct TokenMetadataResolver<R> {
    reader: Arc<R>,
    store: Arc<dyn TokenMetadataStore>,
    config: Arc<EngineConfig>,
    memo: SnapshotCache<Address, TokenInfo>,
}

impl<R: ChainStateReader> TokenMetadataResolver<R> {
    pub fn new(reader: Arc<R>, store: Arc<dyn TokenMetadataStore>, config: Arc<EngineConfig>) -> Self {
        Self {
            reader,
            store,
            config,
            memo: SnapshotCache::new("token_metadata"),
        }
    }

    /// Resolve symbol and decimals, memoized for the run
    pub async fn resolve(&self, token: Address) -> EngineResult<TokenInfo> {
        self.memo
            .get_or_try_compute(token, || self.resolve_uncached(token))
            .await
    }

    pub fn memo(&self) -> &SnapshotCache<Address, TokenInfo> {
        &self.memo
    }

    async fn resolve_uncached(&self, token: Address) -> EngineResult<TokenInfo> {
        let cached = self.store.get(&token).unwrap_or_default();
        let mut learned = cached.clone();

        let symbol = match self.config.token_aliases.get(&token) {
            Some(alias) => alias.clone(),
            None => match self.live_symbol(token).await {
                Some(live) => {
                    learned.symbol = Some(live.clone());
                    live
                }
                None => cached
                    .symbol
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| short_address(&token)),
            },
        };

        let (decimals, source) = if let Some(d) = self.config.decimal_overrides.get(&token) {
            (*d, TokenMetadataSource::Override)
        } else if let Some(live) = self.live_decimals(token).await {
            learned.decimals = Some(live);
            (live, TokenMetadataSource::OnChain)
        } else if let Some(d) = self.config.symbol_decimal_overrides.get(&symbol) {
            // symbols are self-reported, so these only stand in for a failed read
            (*d, TokenMetadataSource::Override)
        } else if let Some(d) = cached.decimals.filter(|d| *d <= MAX_TOKEN_DECIMALS) {
            (d, TokenMetadataSource::Cached)
        } else if self.config.allow_default_decimals {
            warn!(
                "⚠️ No decimals for {} ({}), assuming default {}",
                symbol, token, self.config.default_decimals
            );
            (self.config.default_decimals, TokenMetadataSource::Default)
        } else {
            return Err(EngineError::metadata_ambiguous(format!(
                "no authoritative decimals for {} ({})",
                symbol, token
            )));
        };

        if learned != cached {
            self.store.put(token, learned);
        }

        debug!("🪙 {} -> {} ({} decimals, {:?})", token, symbol, decimals, source);
        Ok(TokenInfo {
            address: token,
            symbol,
            decimals,
            source,
        })
    }

    async fn live_symbol(&self, token: Address) -> Option<String> {
        match self.reader.read_text(token, &Accessor::Symbol, BlockPin::Latest).await {
            Ok(symbol) => {
                let trimmed = symbol.trim_matches(char::from(0)).trim().to_string();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            Err(e) => {
                debug!("📭 symbol() unavailable for {}: {}", token, e);
                None
            }
        }
    }

    async fn live_decimals(&self, token: Address) -> Option<u8> {
        match self.reader.read_uint(token, &Accessor::Decimals, BlockPin::Latest).await {
            Ok(value) if value <= alloy_primitives::U256::from(MAX_TOKEN_DECIMALS) => Some(value.to::<u8>()),
            Ok(value) => {
                warn!("⚠️ Implausible decimals() {} for {}, ignoring", value, token);
                None
            }
            Err(e) => {
                debug!("📭 decimals() unavailable for {}: {}", token, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::chain::StateErrorKind;
    use crate::providers::fixture::FixtureStateReader;
    use alloy_primitives::U256;
    use std::str::FromStr;

    fn resolver(reader: FixtureStateReader, store: Arc<InMemoryTokenStore>, config: EngineConfig) -> TokenMetadataResolver<FixtureStateReader> {
        TokenMetadataResolver::new(Arc::new(reader), store, Arc::new(config))
    }

    #[tokio::test]
    async fn test_live_read_beats_cache() {
        let token = Address::repeat_byte(0x42);
        let mut reader = FixtureStateReader::new();
        reader.set_token(token, "FOO", 6);
        let store = Arc::new(InMemoryTokenStore::new());
        store.put(
            token,
            CachedTokenMetadata {
                symbol: Some("FOO".into()),
                decimals: Some(18),
            },
        );

        let info = resolver(reader, store.clone(), EngineConfig::default())
            .resolve(token)
            .await
            .unwrap();
        assert_eq!(info.decimals, 6);
        assert_eq!(info.source, TokenMetadataSource::OnChain);
        // store corrected after the live read
        assert_eq!(store.get(&token).unwrap().decimals, Some(6));
    }

    #[tokio::test]
    async fn test_address_override_wins() {
        let usdc = Address::from_str("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913").unwrap();
        let mut reader = FixtureStateReader::new();
        reader.set_token(usdc, "USD Coin", 18);

        let info = resolver(reader, Arc::new(InMemoryTokenStore::new()), EngineConfig::default())
            .resolve(usdc)
            .await
            .unwrap();
        assert_eq!(info.symbol, "USDC");
        assert_eq!(info.decimals, 6);
        assert_eq!(info.source, TokenMetadataSource::Override);
    }

    #[tokio::test]
    async fn test_symbol_override_does_not_shadow_live_decimals() {
        let token = Address::repeat_byte(0x11);
        let mut reader = FixtureStateReader::new();
        reader.set_token(token, "USDC", 18);

        let info = resolver(reader, Arc::new(InMemoryTokenStore::new()), EngineConfig::default())
            .resolve(token)
            .await
            .unwrap();
        assert_eq!(info.symbol, "USDC");
        assert_eq!(info.decimals, 18);
        assert_eq!(info.source, TokenMetadataSource::OnChain);
    }

    #[tokio::test]
    async fn test_symbol_override_when_decimals_unreadable() {
        let token = Address::repeat_byte(0x12);
        let mut reader = FixtureStateReader::new();
        reader
            .set(token, Accessor::Symbol, crate::providers::chain::StateValue::Text("USDT".into()))
            .fail(token, "decimals", StateErrorKind::Reverted);

        let info = resolver(reader, Arc::new(InMemoryTokenStore::new()), EngineConfig::default())
            .resolve(token)
            .await
            .unwrap();
        assert_eq!(info.decimals, 6);
        assert_eq!(info.source, TokenMetadataSource::Override);
    }

    #[tokio::test]
    async fn test_cache_used_when_live_fails() {
        let token = Address::repeat_byte(0x43);
        let mut reader = FixtureStateReader::new();
        reader
            .fail(token, "symbol", StateErrorKind::Transport)
            .fail(token, "decimals", StateErrorKind::Transport);
        let store = Arc::new(InMemoryTokenStore::new());
        store.put(
            token,
            CachedTokenMetadata {
                symbol: Some("BAR".into()),
                decimals: Some(8),
            },
        );

        let info = resolver(reader, store, EngineConfig::default()).resolve(token).await.unwrap();
        assert_eq!(info.symbol, "BAR");
        assert_eq!(info.decimals, 8);
        assert_eq!(info.source, TokenMetadataSource::Cached);
    }

    #[tokio::test]
    async fn test_ambiguous_without_default() {
        let token = Address::repeat_byte(0x44);
        let resolver = resolver(
            FixtureStateReader::new(),
            Arc::new(InMemoryTokenStore::new()),
            EngineConfig::default(),
        );
        let err = resolver.resolve(token).await.unwrap_err();
        assert_eq!(err.code_str(), "TOKEN_METADATA_AMBIGUOUS");
        // failures are not memoized
        assert!(resolver.memo().is_empty());
    }

    #[tokio::test]
    async fn test_default_when_allowed() {
        let token = Address::repeat_byte(0x44);
        let info = resolver(
            FixtureStateReader::new(),
            Arc::new(InMemoryTokenStore::new()),
            EngineConfig::default().with_allow_default_decimals(true),
        )
        .resolve(token)
        .await
        .unwrap();
        assert_eq!(info.decimals, 18);
        assert_eq!(info.source, TokenMetadataSource::Default);
        assert_eq!(info.symbol, "0x4444...4444");
    }

    #[tokio::test]
    async fn test_implausible_decimals_rejected() {
        let token = Address::repeat_byte(0x45);
        let mut reader = FixtureStateReader::new();
        reader.set_uint(token, Accessor::Decimals, U256::from(77));
        reader.set(token, Accessor::Symbol, crate::providers::chain::StateValue::Text("ODD".into()));
        let store = Arc::new(InMemoryTokenStore::new());
        store.put(
            token,
            CachedTokenMetadata {
                symbol: None,
                decimals: Some(9),
            },
        );

        let info = resolver(reader, store, EngineConfig::default()).resolve(token).await.unwrap();
        assert_eq!(info.decimals, 9);
        assert_eq!(info.source, TokenMetadataSource::Cached);
    }

    #[tokio::test]
    async fn test_memoized_within_run() {
        let token = Address::repeat_byte(0x46);
        let mut reader = FixtureStateReader::new();
        reader.set_token(token, "BAZ", 18);
        let reader = Arc::new(reader);
        let resolver = TokenMetadataResolver::new(
            reader.clone(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(EngineConfig::default()),
        );

        resolver.resolve(token).await.unwrap();
        let reads = reader.read_count();
        resolver.resolve(token).await.unwrap();
        assert_eq!(reader.read_count(), reads);
    }

    #[test]
    fn test_store_json_roundtrip_shape() {
        let raw = r#"{ "0x4242424242424242424242424242424242424242": { "symbol": "FOO", "decimals": 6 } }"#;
        let store = InMemoryTokenStore::from_json_str(raw).unwrap();
        let meta = store.get(&Address::repeat_byte(0x42)).unwrap();
        assert_eq!(meta.decimals, Some(6));
        assert!(store.to_json().unwrap().contains("FOO"));
    }
}
