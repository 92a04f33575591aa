//! CLI configuration: `PRESIGN_*` environment variables, overridden by flags.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use presign_cache::CacheConfig;
use presign_core::constants::DEFAULT_HTTP_TIMEOUT_SECONDS;
use presign_resolver::ResolverConfig;

/// Flags that override the environment.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Signing endpoint URL [env: PRESIGN_ENDPOINT]
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Requested URL lifetime in seconds [env: PRESIGN_TTL_SECONDS]
    #[arg(long, global = true)]
    pub ttl: Option<u64>,

    /// Minimum interval between visibility-triggered fetches, in milliseconds
    #[arg(long, global = true)]
    pub min_refetch_ms: Option<u64>,

    /// Snapshot file [env: PRESIGN_SNAPSHOT_PATH]
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Disable the background refresh timer
    #[arg(long, global = true)]
    pub no_auto_refresh: bool,
}

#[derive(Debug)]
pub struct AppConfig {
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cache = CacheConfig::default();

        if let Some(ttl) = parse_u64(&lookup, "PRESIGN_TTL_SECONDS")? {
            cache = cache.with_ttl_seconds(ttl);
        }
        if let Some(interval) = parse_u64(&lookup, "PRESIGN_MIN_REFETCH_INTERVAL_MS")? {
            cache = cache.with_min_refetch_interval_ms(interval);
        }
        if let Some(path) = lookup("PRESIGN_SNAPSHOT_PATH").filter(|p| !p.is_empty()) {
            cache = cache.with_snapshot(path);
        }
        cache.auto_refresh_enabled = lookup("PRESIGN_AUTO_REFRESH")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(cache.auto_refresh_enabled);

        Ok(Self {
            endpoint: lookup("PRESIGN_ENDPOINT").filter(|e| !e.is_empty()),
            timeout_seconds: parse_u64(&lookup, "PRESIGN_HTTP_TIMEOUT_SECONDS")?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS),
            cache,
        })
    }

    /// Applies command-line overrides.
    pub fn apply(mut self, args: &ConfigArgs) -> Self {
        if let Some(endpoint) = &args.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        if let Some(ttl) = args.ttl {
            self.cache = self.cache.with_ttl_seconds(ttl);
        }
        if let Some(interval) = args.min_refetch_ms {
            self.cache = self.cache.with_min_refetch_interval_ms(interval);
        }
        if let Some(path) = &args.snapshot {
            self.cache = self.cache.with_snapshot(path.clone());
        }
        if args.no_auto_refresh {
            self.cache = self.cache.no_auto_refresh();
        }
        self
    }

    pub fn resolver_config(&self) -> Result<ResolverConfig> {
        let Some(endpoint) = &self.endpoint else {
            bail!("no signing endpoint configured (set PRESIGN_ENDPOINT or pass --endpoint)");
        };
        Ok(ResolverConfig::new(endpoint.clone()).with_timeout(self.timeout_seconds))
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    lookup(name)
        .map(|v| v.parse::<u64>().with_context(|| format!("invalid {}: {:?}", name, v)))
        .transpose()
}
