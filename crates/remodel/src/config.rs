//! Configuration for the client

use http::HeaderMap;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between two completion checks of an operation.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for an operation to complete.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked once per unsuccessful completion check, with the
/// iteration count (starting at 1).
pub type TickFn = Arc<dyn Fn(u32) + Send + Sync>;

/// Configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URI every endpoint path is joined onto
    pub base_uri: Option<String>,

    /// Bearer token sent with every request
    pub api_token: Option<SecretString>,

    /// Value of the `Accept-Language` header
    pub language: Option<String>,

    /// Page size injected into list queries that don't carry one
    pub page_size: Option<u32>,

    /// Default timeout for requests
    pub timeout: Duration,

    /// Custom headers to include with every request
    pub default_headers: HeaderMap,

    /// Polling defaults for queued operations
    pub wait: WaitConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: None,
            api_token: None,
            language: None,
            page_size: None,
            timeout: DEFAULT_TIMEOUT,
            default_headers: HeaderMap::new(),
            wait: WaitConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with an API token.
    pub fn with_api_token(api_token: impl Into<String>) -> Self {
        Self {
            api_token: Some(SecretString::new(api_token.into().into_boxed_str())),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured. This will look for:
    /// - `REMODEL_BASE_URI`
    /// - `REMODEL_API_TOKEN`
    /// - `REMODEL_LANGUAGE`
    /// - `REMODEL_PAGE_SIZE`
    /// - `REMODEL_TIMEOUT` (seconds)
    /// - `REMODEL_WAIT_INTERVAL` and `REMODEL_WAIT_TIMEOUT` (seconds)
    /// - `REMODEL_WAIT_ALWAYS` (`true`/`1`)
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self, crate::error::Error> {
        use std::env;

        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(base_uri) = env::var("REMODEL_BASE_URI") {
            config.base_uri = Some(base_uri);
        }

        if let Ok(api_token) = env::var("REMODEL_API_TOKEN") {
            config.api_token = Some(SecretString::new(api_token.into_boxed_str()));
        }

        if let Ok(language) = env::var("REMODEL_LANGUAGE") {
            config.language = Some(language);
        }

        if let Ok(page_size) = env::var("REMODEL_PAGE_SIZE") {
            let page_size = page_size.parse::<u32>().map_err(|_| {
                crate::error::Error::MissingConfig(format!(
                    "REMODEL_PAGE_SIZE must be a positive integer, got '{}'",
                    page_size
                ))
            })?;
            config.page_size = Some(page_size);
        }

        if let Some(timeout) = env_secs("REMODEL_TIMEOUT") {
            config.timeout = timeout;
        }

        if let Some(interval) = env_secs("REMODEL_WAIT_INTERVAL") {
            config.wait = config.wait.interval(interval);
        }

        if let Some(timeout) = env_secs("REMODEL_WAIT_TIMEOUT") {
            config.wait = config.wait.timeout(timeout);
        }

        if let Ok(always) = env::var("REMODEL_WAIT_ALWAYS") {
            config.wait = config
                .wait
                .always(matches!(always.trim(), "1" | "true" | "yes"));
        }

        Ok(config)
    }

    /// Merge this configuration with another, with the other taking precedence.
    pub fn merge(mut self, other: ClientConfig) -> Self {
        if other.base_uri.is_some() {
            self.base_uri = other.base_uri;
        }
        if other.api_token.is_some() {
            self.api_token = other.api_token;
        }
        if other.language.is_some() {
            self.language = other.language;
        }
        if other.page_size.is_some() {
            self.page_size = other.page_size;
        }
        if other.timeout != DEFAULT_TIMEOUT {
            self.timeout = other.timeout;
        }
        for (key, value) in other.default_headers.iter() {
            self.default_headers.insert(key.clone(), value.clone());
        }
        self.wait = self.wait.merge(other.wait);

        self
    }
}

#[cfg(feature = "env")]
fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Polling behaviour of queued operations.
#[derive(Clone)]
pub struct WaitConfig {
    /// Delay between two completion checks
    pub interval: Duration,

    /// Deadline measured from the start of the wait; zero disables it
    pub timeout: Duration,

    /// Block every queued mutation until its operation settles
    pub always: bool,

    /// Observer called once per unsuccessful completion check
    pub tick: Option<TickFn>,

    explicit: ExplicitWait,
}

/// Settings chosen through the builder methods, kept even when they equal
/// the defaults.
#[derive(Debug, Clone, Copy, Default)]
struct ExplicitWait {
    interval: bool,
    timeout: bool,
    always: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WAIT_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
            always: false,
            tick: None,
            explicit: ExplicitWait::default(),
        }
    }
}

impl fmt::Debug for WaitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitConfig")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("always", &self.always)
            .field("tick", &self.tick.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl WaitConfig {
    /// Set the poll interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self.explicit.interval = true;
        self
    }

    /// Set the deadline; `Duration::ZERO` waits forever.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.explicit.timeout = true;
        self
    }

    /// Set whether queued mutations block until settled.
    pub fn always(mut self, always: bool) -> Self {
        self.always = always;
        self.explicit.always = true;
        self
    }

    /// Install a tick callback.
    pub fn on_tick(mut self, tick: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.tick = Some(Arc::new(tick));
        self
    }

    /// Overlay `other`: a field is taken when it was set through a builder
    /// method or differs from its default.
    fn merge(mut self, other: WaitConfig) -> Self {
        if other.explicit.interval || other.interval != DEFAULT_WAIT_INTERVAL {
            self.interval = other.interval;
            self.explicit.interval = true;
        }
        if other.explicit.timeout || other.timeout != DEFAULT_WAIT_TIMEOUT {
            self.timeout = other.timeout;
            self.explicit.timeout = true;
        }
        if other.explicit.always || other.always {
            self.always = other.always;
            self.explicit.always = true;
        }
        if other.tick.is_some() {
            self.tick = other.tick;
        }
        self
    }
}

/// Builder for creating ClientConfig with a fluent API.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URI.
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.config.base_uri = Some(base_uri.into());
        self
    }

    /// Set the API token.
    pub fn api_token(mut self, api_token: impl Into<String>) -> Self {
        self.config.api_token = Some(SecretString::new(api_token.into().into_boxed_str()));
        self
    }

    /// Set the `Accept-Language` value.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = Some(language.into());
        self
    }

    /// Set the default list page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Add a default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid according to HTTP specifications.
    pub fn default_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> crate::Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key: http::HeaderName = key_str
            .parse()
            .map_err(|_| crate::Error::InvalidHeaderName(key_str.clone()))?;
        let value: http::HeaderValue = value_str
            .parse()
            .map_err(|_| crate::Error::InvalidHeaderValue(value_str.clone()))?;

        self.config.default_headers.insert(key, value);
        Ok(self)
    }

    /// Set the polling configuration.
    pub fn wait(mut self, wait: WaitConfig) -> Self {
        self.config.wait = wait;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.api_token.is_none());
        assert!(config.page_size.is_none());
        assert_eq!(config.wait.interval, Duration::from_secs(1));
        assert_eq!(config.wait.timeout, Duration::from_secs(30));
        assert!(!config.wait.always);
        assert!(config.wait.tick.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfigBuilder::new()
            .api_token("token")
            .base_uri("https://example.com/v1/")
            .language("de")
            .page_size(50)
            .timeout(Duration::from_secs(5))
            .wait(WaitConfig::default().interval(Duration::from_millis(250)).always(true))
            .build();

        assert!(config.api_token.is_some());
        assert_eq!(config.base_uri.as_deref(), Some("https://example.com/v1/"));
        assert_eq!(config.language.as_deref(), Some("de"));
        assert_eq!(config.page_size, Some(50));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.wait.interval, Duration::from_millis(250));
        assert!(config.wait.always);
    }

    #[test]
    fn test_config_merge() {
        let base = ClientConfig::with_api_token("token");
        let other = ClientConfigBuilder::new()
            .base_uri("https://example.com")
            .wait(WaitConfig::default().timeout(Duration::from_secs(90)))
            .build();

        let merged = base.merge(other);
        assert!(merged.api_token.is_some());
        assert_eq!(merged.base_uri.as_deref(), Some("https://example.com"));
        assert_eq!(merged.wait.timeout, Duration::from_secs(90));
        assert_eq!(merged.wait.interval, DEFAULT_WAIT_INTERVAL);
    }

    #[test]
    fn test_config_merge_can_restore_defaults() {
        let base = ClientConfigBuilder::new()
            .wait(
                WaitConfig::default()
                    .interval(Duration::from_millis(50))
                    .timeout(Duration::from_secs(5))
                    .always(true),
            )
            .build();
        let other = ClientConfigBuilder::new()
            .wait(
                WaitConfig::default()
                    .interval(DEFAULT_WAIT_INTERVAL)
                    .always(false),
            )
            .build();

        let merged = base.merge(other);
        assert_eq!(merged.wait.interval, DEFAULT_WAIT_INTERVAL);
        assert_eq!(merged.wait.timeout, Duration::from_secs(5));
        assert!(!merged.wait.always);
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_env_overlay_can_disable_always() {
        temp_env::with_vars([("REMODEL_WAIT_ALWAYS", Some("false"))], || {
            let client = crate::Client::builder()
                .base_uri("https://api.example.com/v1")
                .wait(WaitConfig::default().always(true))
                .config(ClientConfig::from_env().expect("config from env"))
                .build()
                .expect("client");
            assert!(!client.wait_config().always);
        });
    }

    #[test]
    fn test_tick_callback_is_shared() {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let wait = WaitConfig::default().on_tick(move |i| {
            seen.fetch_add(i, Ordering::SeqCst);
        });

        let copy = wait.clone();
        (copy.tick.as_ref().unwrap())(2);
        (wait.tick.as_ref().unwrap())(3);
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(format!("{:?}", wait).contains("<callback>"));
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_config_from_env_variables() {
        temp_env::with_vars(
            [
                ("REMODEL_BASE_URI", Some("https://env.example.com")),
                ("REMODEL_API_TOKEN", Some("env-token")),
                ("REMODEL_LANGUAGE", Some("fr")),
                ("REMODEL_PAGE_SIZE", Some("25")),
                ("REMODEL_TIMEOUT", Some("12")),
                ("REMODEL_WAIT_INTERVAL", Some("2")),
                ("REMODEL_WAIT_TIMEOUT", Some("120")),
                ("REMODEL_WAIT_ALWAYS", Some("true")),
            ],
            || {
                let config = ClientConfig::from_env().expect("config from env");
                assert_eq!(config.base_uri.as_deref(), Some("https://env.example.com"));
                assert!(config.api_token.is_some());
                assert_eq!(config.language.as_deref(), Some("fr"));
                assert_eq!(config.page_size, Some(25));
                assert_eq!(config.timeout, Duration::from_secs(12));
                assert_eq!(config.wait.interval, Duration::from_secs(2));
                assert_eq!(config.wait.timeout, Duration::from_secs(120));
                assert!(config.wait.always);
            },
        );
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_config_from_env_rejects_bad_page_size() {
        temp_env::with_vars([("REMODEL_PAGE_SIZE", Some("lots"))], || {
            assert!(ClientConfig::from_env().is_err());
        });
    }
}
