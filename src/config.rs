//! Service configuration.
//!
//! Everything the job and the HTTP surface need is collected in
//! [`ServiceConfig`] and built through [`ServiceConfigBuilder`], so defaults
//! are documented in one place and invalid combinations are rejected before
//! the server starts. Settings of the PDF converter live in
//! [`crate::converter::vision::VisionConfig`].

use crate::error::PlatformError;
use crate::schema::DEFAULT_POLICY;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use markdown_conversion::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .platform_url("https://platform.example.com")
///     .port(8090)
///     .invocation_timeout_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.listen_addr().port(), 8090);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Interface to bind. Default: 0.0.0.0.
    pub host: IpAddr,

    /// Port to listen on. Default: 8090.
    pub port: u16,

    /// Base URL of the storage/indexing platform API.
    pub platform_url: String,

    /// Bearer token attached to every platform request.
    pub auth_token: Option<String>,

    /// Policy for created artifacts when a request names none.
    /// Default: `urn:ivcap:policy:ivcap.base.artifact`.
    pub default_policy: String,

    /// Timeout of a single platform HTTP call, including body transfer. Default: 120.
    pub platform_timeout_secs: u64,

    /// Upper bound on one invocation when the caller sends no `Timeout`
    /// header. `None` means unbounded. Default: 600.
    pub invocation_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8090,
            platform_url: "http://localhost:8080".to_string(),
            auth_token: None,
            default_policy: DEFAULT_POLICY.to_string(),
            platform_timeout_secs: 120,
            invocation_timeout_secs: Some(600),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("platform_url", &self.platform_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("default_policy", &self.default_policy)
            .field("platform_timeout_secs", &self.platform_timeout_secs)
            .field("invocation_timeout_secs", &self.invocation_timeout_secs)
            .finish()
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn platform_url(mut self, url: impl Into<String>) -> Self {
        self.config.platform_url = url.into();
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.config.auth_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn default_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.default_policy = policy.into();
        self
    }

    pub fn platform_timeout_secs(mut self, secs: u64) -> Self {
        self.config.platform_timeout_secs = secs.max(1);
        self
    }

    /// `0` disables the default invocation timeout.
    pub fn invocation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.invocation_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, PlatformError> {
        let c = &self.config;
        let url = reqwest::Url::parse(&c.platform_url).map_err(|e| {
            PlatformError::InvalidConfig(format!("platform URL '{}': {e}", c.platform_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PlatformError::InvalidConfig(format!(
                "platform URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.default_policy.trim().is_empty() {
            return Err(PlatformError::InvalidConfig(
                "default policy must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
