//! Site configuration

use crate::error::{LouderError, LouderResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Origin the site is served from unless configured otherwise.
pub const DEFAULT_ORIGIN: &str = "https://stillouder.space/";

/// Top-level configuration for the offline layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Cache controller settings
    pub cache: CacheConfig,

    /// Page-side lifecycle manager settings
    pub pwa: PwaConfig,
}

/// Cache controller (service worker) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Version string every partition name is derived from
    pub version: String,

    /// Origin the site is served from; relative manifest paths resolve against it
    pub origin: Url,

    /// Assets fetched into the precache partition at install time, in order
    pub precache_urls: Vec<String>,

    /// Path of the offline fallback document
    pub offline_page: String,

    /// Hosts whose traffic is network-only and never surfaces an error
    pub analytics_hosts: Vec<String>,

    /// Path fragment identifying tag-manager traffic on any host
    pub analytics_path_fragment: String,

    /// Extensions routed to the image partition
    pub image_extensions: Vec<String>,

    /// Host serving font files
    pub font_host: String,

    /// Extension of the single audio asset
    pub audio_extension: String,

    /// URL schemes that are never intercepted
    pub passthrough_schemes: Vec<String>,

    /// Promote the new version as soon as install succeeds
    pub skip_waiting_on_install: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "still-louder-v1.0.0".to_string(),
            // Cannot fail: DEFAULT_ORIGIN is a fixed absolute URL.
            origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is an absolute URL"),
            precache_urls: [
                "/",
                "/index.html",
                "/al-vacio-pre-release.html",
                "/offline.html",
                "/assets/css/style.css",
                "/assets/js/script.js",
                "/assets/js/sw-register.js",
                "/assets/site.webmanifest",
                "/assets/favicon-96x96.png",
                "/assets/favicon.svg",
                "/assets/apple-touch-icon.png",
                "/assets/web-app-manifest-192x192.png",
                "/assets/web-app-manifest-512x512.png",
                "https://fonts.googleapis.com/css2?family=Inter:wght@400;600;700&display=swap",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            offline_page: "/offline.html".to_string(),
            analytics_hosts: vec![
                "www.google-analytics.com".to_string(),
                "www.googletagmanager.com".to_string(),
            ],
            analytics_path_fragment: "/gtag/".to_string(),
            image_extensions: ["jpg", "jpeg", "png", "gif", "svg", "webp", "avif", "ico"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            font_host: "fonts.gstatic.com".to_string(),
            audio_extension: ".mp3".to_string(),
            passthrough_schemes: vec!["chrome-extension".to_string(), "moz-extension".to_string()],
            skip_waiting_on_install: true,
        }
    }
}

impl CacheConfig {
    /// Resolve a manifest entry against the configured origin.
    pub fn resolve(&self, path: &str) -> LouderResult<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Resolve every precache entry, preserving manifest order.
    pub fn precache_manifest(&self) -> LouderResult<Vec<Url>> {
        self.precache_urls.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline fallback document.
    pub fn offline_url(&self) -> LouderResult<Url> {
        self.resolve(&self.offline_page)
    }

    /// Check the settings the controller cannot run without.
    pub fn validate(&self) -> LouderResult<()> {
        if self.version.trim().is_empty() {
            return Err(LouderError::config("cache version must not be empty"));
        }
        if self.offline_page.is_empty() {
            return Err(LouderError::config("offline page must be set"));
        }
        self.precache_manifest()?;
        self.offline_url()?;
        Ok(())
    }
}

/// Page-side lifecycle manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
    /// Path of the worker script
    pub sw_path: String,

    /// Registration scope
    pub scope: String,

    /// Interval between update checks, in milliseconds
    pub update_check_interval_ms: u64,

    /// Delay before the custom install prompt is shown, in milliseconds
    pub install_prompt_delay_ms: u64,

    /// How long the install confirmation stays visible, in milliseconds
    pub install_success_duration_ms: u64,

    /// Push notifications (stubbed)
    pub enable_notifications: bool,

    /// Verbose logging
    pub debug: bool,

    /// File backing the durable key-value flags; `None` uses the data dir
    pub storage_path: Option<PathBuf>,
}

impl Default for PwaConfig {
    fn default() -> Self {
        Self {
            sw_path: "/sw.js".to_string(),
            scope: "/".to_string(),
            update_check_interval_ms: 60_000,
            install_prompt_delay_ms: 3_000,
            install_success_duration_ms: 4_000,
            enable_notifications: false,
            debug: true,
            storage_path: None,
        }
    }
}

impl PwaConfig {
    pub fn update_check_interval(&self) -> Duration {
        Duration::from_millis(self.update_check_interval_ms)
    }

    pub fn install_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.install_prompt_delay_ms)
    }

    pub fn install_success_duration(&self) -> Duration {
        Duration::from_millis(self.install_success_duration_ms)
    }

    /// Location of the durable flag store.
    pub fn resolved_storage_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("still-louder")
                .join("local-storage.json")
        })
    }
}

impl SiteConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> LouderResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SiteConfig = serde_json::from_str(&contents)?;
        config.cache.validate()?;
        tracing::debug!(path = %path.display(), version = %config.cache.version, "Loaded site config");
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> LouderResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> LouderResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_resolves() {
        let config = CacheConfig::default();
        let manifest = config.precache_manifest().unwrap();
        assert_eq!(manifest.len(), 14);
        assert_eq!(manifest[0].as_str(), "https://stillouder.space/");
        assert_eq!(manifest[13].host_str(), Some("fonts.googleapis.com"));
        assert_eq!(
            config.offline_url().unwrap().as_str(),
            "https://stillouder.space/offline.html"
        );
    }

    #[test]
    fn test_default_origin_parses() {
        assert_eq!(Url::parse(DEFAULT_ORIGIN).unwrap(), CacheConfig::default().origin);
    }

    #[test]
    fn test_storage_path_override() {
        let config = PwaConfig {
            storage_path: Some(PathBuf::from("/tmp/flags.json")),
            ..Default::default()
        };
        assert_eq!(config.resolved_storage_path(), PathBuf::from("/tmp/flags.json"));
        assert!(PwaConfig::default()
            .resolved_storage_path()
            .ends_with("still-louder/local-storage.json"));
    }

    #[test]
    fn test_validate_rejects_empty_version() {
        let config = CacheConfig {
            version: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LouderError::Config(_))));
    }

    #[test]
    fn test_pwa_intervals() {
        let config = PwaConfig::default();
        assert_eq!(config.update_check_interval(), Duration::from_secs(60));
        assert_eq!(config.install_prompt_delay(), Duration::from_secs(3));
        assert_eq!(config.install_success_duration(), Duration::from_secs(4));
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.json");
        std::fs::write(&path, r#"{ "cache": { "version": "v2" } }"#).unwrap();

        let config = SiteConfig::load(&path).unwrap();
        assert_eq!(config.cache.version, "v2");
        assert_eq!(config.cache.offline_page, "/offline.html");
        assert_eq!(config.pwa.sw_path, "/sw.js");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.json");
        let mut config = SiteConfig::default();
        config.pwa.debug = false;
        config.save(&path).unwrap();

        let loaded = SiteConfig::load(&path).unwrap();
        assert!(!loaded.pwa.debug);
        assert_eq!(loaded.cache.version, config.cache.version);
    }
}
