use std::time::Duration;

use crate::{
    exposure::{EventTracker, NoopEventTracker},
    LocalFlagsProvider, RemoteFlagsProvider, Result,
};

/// Configuration for [`LocalFlagsProvider`] and [`RemoteFlagsProvider`].
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use mixpanel_flags::ClientConfig;
/// let provider = ClientConfig::from_token("project-token")
///     .polling_interval(Duration::from_secs(30))
///     .to_local_provider()
///     .unwrap();
/// ```
pub struct ClientConfig<'a> {
    pub(crate) token: String,
    pub(crate) api_host: String,
    pub(crate) request_timeout: Duration,
    pub(crate) enable_polling: bool,
    pub(crate) polling_interval: Duration,
    pub(crate) event_tracker: Box<dyn EventTracker + Send + Sync + 'a>,
}

impl<'a> ClientConfig<'a> {
    /// Default host for API calls.
    pub const DEFAULT_API_HOST: &'static str = "https://api.mixpanel.com";
    /// Default timeout for a single request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default interval between definition fetches.
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a default configuration for the project identified by `token`.
    ///
    /// ```
    /// # use mixpanel_flags::ClientConfig;
    /// ClientConfig::from_token("project-token");
    /// ```
    pub fn from_token(token: impl Into<String>) -> Self {
        ClientConfig {
            token: token.into(),
            api_host: ClientConfig::DEFAULT_API_HOST.to_owned(),
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            enable_polling: true,
            polling_interval: ClientConfig::DEFAULT_POLLING_INTERVAL,
            event_tracker: Box::new(NoopEventTracker),
        }
    }

    /// Override the API host, e.g. `api-eu.mixpanel.com` for EU data residency. HTTPS is assumed
    /// when no scheme is given.
    pub fn api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Abort requests that take longer than `request_timeout`.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Whether [`LocalFlagsProvider::start_polling`] keeps refreshing definitions in the
    /// background after the initial fetch.
    pub fn enable_polling(mut self, enable_polling: bool) -> Self {
        self.enable_polling = enable_polling;
        self
    }

    /// Interval between background definition fetches.
    pub fn polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    /// Set the destination for exposure events.
    pub fn event_tracker(mut self, event_tracker: impl EventTracker + Send + Sync + 'a) -> Self {
        self.event_tracker = Box::new(event_tracker);
        self
    }

    /// Create a [`LocalFlagsProvider`] using this configuration.
    pub fn to_local_provider(self) -> Result<LocalFlagsProvider<'a>> {
        LocalFlagsProvider::new(self)
    }

    /// Create a [`RemoteFlagsProvider`] using this configuration.
    pub fn to_remote_provider(self) -> Result<RemoteFlagsProvider<'a>> {
        RemoteFlagsProvider::new(self)
    }
}
