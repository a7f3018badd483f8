//! Client configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | CIVIC_API_URL | (required) | Platform project URL |
//! | CIVIC_API_KEY | (required) | Project API key (anon key) |
//! | CIVIC_ACCESS_TOKEN | unset | Session bearer token |
//! | CIVIC_CLASSIFIER_URL | http://127.0.0.1:8000 | ML prediction service |
//! | CIVIC_TIMEOUT_SECS | 30 | HTTP request timeout |

use crate::error::{ClientError, ClientResult};
use crate::realtime::RealtimeConfig;

const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration for connecting to the platform and the classifier
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Project base URL (e.g., "https://xyz.example.co")
    pub base_url: String,

    /// Project API key, sent as `apikey` on every request
    pub api_key: String,

    /// Session access token; requests fall back to the API key without one
    pub token: Option<String>,

    /// Classifier base URL
    pub classifier_url: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Change feed settings
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            token: None,
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            realtime: RealtimeConfig::default(),
        }
    }

    /// Load configuration from the process environment (and `.env`, if present)
    pub fn from_env() -> ClientResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url =
            get("CIVIC_API_URL").ok_or_else(|| ClientError::Config("CIVIC_API_URL must be set".into()))?;
        let api_key =
            get("CIVIC_API_KEY").ok_or_else(|| ClientError::Config("CIVIC_API_KEY must be set".into()))?;

        let mut config = Self::new(base_url, api_key);
        config.token = get("CIVIC_ACCESS_TOKEN");
        if let Some(url) = get("CIVIC_CLASSIFIER_URL") {
            config.classifier_url = url;
        }
        if let Some(raw) = get("CIVIC_TIMEOUT_SECS") {
            config.timeout = raw
                .parse()
                .map_err(|_| ClientError::Config(format!("CIVIC_TIMEOUT_SECS is not a number: {raw}")))?;
        }
        Ok(config)
    }

    /// Set the session access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the classifier base URL
    pub fn with_classifier_url(mut self, url: impl Into<String>) -> Self {
        self.classifier_url = url.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the change feed settings
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Websocket endpoint of the realtime service, with the API key
    /// form-encoded into the query
    pub fn realtime_url(&self) -> ClientResult<String> {
        let ws = self
            .base()
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        let mut url = reqwest::Url::parse(&format!("{ws}/realtime/v1/websocket"))
            .map_err(|e| ClientError::Config(format!("invalid CIVIC_API_URL {}: {}", self.base(), e)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", "1.0.0");
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_from_lookup_with_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("CIVIC_API_URL", "https://civic.example.co/"),
            ("CIVIC_API_KEY", "anon"),
        ]))
        .unwrap();

        assert_eq!(config.base(), "https://civic.example.co");
        assert_eq!(config.classifier_url, DEFAULT_CLASSIFIER_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(config.token.is_none());
        assert_eq!(
            config.realtime_url().unwrap(),
            "wss://civic.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn rejects_missing_or_malformed_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("CIVIC_API_KEY", "anon")])),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[
                ("CIVIC_API_URL", "http://localhost:54321"),
                ("CIVIC_API_KEY", "anon"),
                ("CIVIC_TIMEOUT_SECS", "soon"),
            ])),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::new("http://localhost:54321", "anon")
            .with_token("jwt")
            .with_classifier_url("http://ml:8000")
            .with_timeout(5);
        assert_eq!(config.token.as_deref(), Some("jwt"));
        assert_eq!(config.classifier_url, "http://ml:8000");
        assert_eq!(config.timeout, 5);
        assert!(config.realtime_url().unwrap().starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn realtime_url_encodes_the_api_key() {
        let config = ClientConfig::new("https://civic.example.co", "a+b/c=&d");
        assert_eq!(
            config.realtime_url().unwrap(),
            "wss://civic.example.co/realtime/v1/websocket?apikey=a%2Bb%2Fc%3D%26d&vsn=1.0.0"
        );

        let config = ClientConfig::new("not a url", "anon");
        assert!(matches!(config.realtime_url(), Err(ClientError::Config(_))));
    }
}
