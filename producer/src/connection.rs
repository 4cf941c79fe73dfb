//! Lifecycle of the single transport link owned by a producer.

use crate::auth::AuthProvider;
use crate::common::{EventHubError, EventHubResult, conditions};
use crate::config::ProducerConfig;
use crate::transport::{TransportConnector, TransportLink};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Everything a connector needs besides the target and credential.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOptions {
    /// Name the link is registered under, e.g. `EHProducer-<uuid>`
    pub client_name: String,
    pub keep_alive: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    /// Default per-message timeout; the send session overrides it per window
    pub message_timeout: Option<Duration>,
    /// Link attach properties. Carries `com.microsoft:timeout` in milliseconds.
    pub link_properties: BTreeMap<String, Value>,
    /// Client identification sent with the connection
    pub properties: BTreeMap<String, Value>,
}

impl LinkOptions {
    pub fn from_config(client_name: impl Into<String>, config: &ProducerConfig) -> Self {
        let message_timeout = config.send_timeout();

        let mut link_properties = BTreeMap::new();
        if let Some(timeout) = message_timeout {
            link_properties.insert(
                conditions::TIMEOUT.to_string(),
                Value::from(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            );
        }

        let mut properties = BTreeMap::new();
        properties.insert("product".to_string(), Value::from(env!("CARGO_PKG_NAME")));
        properties.insert("version".to_string(), Value::from(env!("CARGO_PKG_VERSION")));
        properties.insert(
            "platform".to_string(),
            Value::from(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)),
        );
        let mut user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        if let Some(extra) = config.user_agent() {
            user_agent = format!("{user_agent} {extra}");
        }
        properties.insert("user-agent".to_string(), Value::from(user_agent));

        Self {
            client_name: client_name.into(),
            keep_alive: config.keep_alive(),
            idle_timeout: config.idle_timeout(),
            message_timeout,
            link_properties,
            properties,
        }
    }
}

/// Opens, resets and closes one producer's link.
///
/// Not synchronized itself: the producer only touches it while holding its
/// exclusivity lock, so open and close never race.
pub struct LinkLifecycle {
    target: String,
    connector: Arc<dyn TransportConnector>,
    auth: Arc<dyn AuthProvider>,
    options: LinkOptions,
    link: Option<Box<dyn TransportLink>>,
    max_message_size: Option<u64>,
    teardowns: u32,
}

impl std::fmt::Debug for LinkLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkLifecycle")
            .field("target", &self.target)
            .field("client_name", &self.options.client_name)
            .field("open", &self.link.is_some())
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl LinkLifecycle {
    pub fn new(
        target: impl Into<String>,
        connector: Arc<dyn TransportConnector>,
        auth: Arc<dyn AuthProvider>,
        options: LinkOptions,
    ) -> Self {
        Self {
            target: target.into(),
            connector,
            auth,
            options,
            link: None,
            max_message_size: None,
            teardowns: 0,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &LinkOptions {
        &self.options
    }

    /// Whether a usable link is currently held.
    pub fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_usable())
    }

    /// Size limit advertised by the most recently opened link.
    pub fn max_message_size(&self) -> Option<u64> {
        self.max_message_size
    }

    /// Number of links actually torn down so far.
    pub fn teardowns(&self) -> u32 {
        self.teardowns
    }

    /// Opens the link unless a usable one is already held.
    ///
    /// Credential acquisition and the connector call together must finish
    /// before `deadline`.
    ///
    /// # Errors
    ///
    /// Credential failures are reported as [`EventHubError::Connection`];
    /// running out of time as [`EventHubError::Timeout`].
    pub async fn open(&mut self, deadline: Option<Instant>) -> EventHubResult<()> {
        if self.is_open() {
            return Ok(());
        }
        if self.link.is_some() {
            log::debug!("Discarding unusable link to {}", self.target);
            self.reset().await;
        }

        log::debug!("Opening link {} to {}", self.options.client_name, self.target);
        let (auth, connector) = (Arc::clone(&self.auth), Arc::clone(&self.connector));
        let (target, options) = (self.target.as_str(), &self.options);
        let connect = async move {
            let credential = auth.authenticate().await.map_err(|e| match e {
                EventHubError::Connection { .. } => e,
                other => EventHubError::connection(format!("authentication failed: {other}")),
            })?;
            connector.open(target, &credential, options).await
        };
        let link = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, connect).await??,
            None => connect.await?,
        };

        self.max_message_size = link.max_message_size();
        self.link = Some(link);
        log::info!(
            "Opened link {} to {} (max message size: {:?})",
            self.options.client_name,
            self.target,
            self.max_message_size
        );
        Ok(())
    }

    /// The open link, if any.
    pub fn link_mut(&mut self) -> Option<&mut (dyn TransportLink + 'static)> {
        self.link.as_deref_mut()
    }

    /// Drops the current link after a connection-level failure.
    ///
    /// Close errors are logged and swallowed; the next [`open`](Self::open)
    /// creates a fresh link either way.
    pub async fn reset(&mut self) {
        if let Some(mut link) = self.link.take() {
            self.teardowns += 1;
            if let Err(e) = link.close().await {
                log::warn!("Error while dropping link to {}: {e}", self.target);
            }
        }
    }

    /// Closes the link. Closing without a link, or twice, is a no-op.
    pub async fn close(&mut self) -> EventHubResult<()> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        self.teardowns += 1;
        log::info!("Closing link {} to {}", self.options.client_name, self.target);
        link.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthToken, StaticTokenProvider};
    use crate::model::EventRecord;
    use crate::outcome::OutcomeNotifier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct IdleLink {
        closes: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TransportLink for IdleLink {
        fn set_message_timeout(&mut self, _timeout: Option<Duration>) {}

        fn enqueue_records(&mut self, _records: Vec<EventRecord>, _notifier: OutcomeNotifier) {}

        async fn await_completion(&mut self) -> EventHubResult<()> {
            Ok(())
        }

        fn pending_records(&mut self) -> Vec<EventRecord> {
            Vec::new()
        }

        fn max_message_size(&self) -> Option<u64> {
            Some(256 * 1024)
        }

        async fn close(&mut self) -> EventHubResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        opens: AtomicU32,
        closes: Arc<AtomicU32>,
        open_delay: Option<Duration>,
    }

    #[async_trait]
    impl TransportConnector for CountingConnector {
        async fn open(
            &self,
            _target: &str,
            _credential: &AuthToken,
            _options: &LinkOptions,
        ) -> EventHubResult<Box<dyn TransportLink>> {
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(IdleLink {
                closes: self.closes.clone(),
            }))
        }
    }

    fn lifecycle(connector: Arc<CountingConnector>) -> LinkLifecycle {
        LinkLifecycle::new(
            "hub",
            connector,
            Arc::new(StaticTokenProvider::new("sas", "servicebus.windows.net:sastoken")),
            LinkOptions::from_config("EHProducer-test", &ProducerConfig::default()),
        )
    }

    #[test]
    fn test_link_options_carry_timeout_property() {
        let config = ProducerConfig::default().with_send_timeout(Duration::from_secs(30));
        let options = LinkOptions::from_config("EHProducer-x", &config);

        assert_eq!(options.message_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            options.link_properties.get(conditions::TIMEOUT),
            Some(&Value::from(30_000u64))
        );
        assert!(options.properties.contains_key("user-agent"));
    }

    #[test]
    fn test_disabled_send_timeout_omits_property() {
        let config = ProducerConfig::default().with_send_timeout(Duration::ZERO);
        let options = LinkOptions::from_config("EHProducer-x", &config);

        assert_eq!(options.message_timeout, None);
        assert!(options.link_properties.is_empty());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let connector = Arc::new(CountingConnector::default());
        let mut links = lifecycle(connector.clone());

        links.open(None).await.unwrap();
        links.open(None).await.unwrap();

        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(links.max_message_size(), Some(256 * 1024));
        assert!(links.is_open());
    }

    #[tokio::test]
    async fn test_close_twice_tears_down_once() {
        let connector = Arc::new(CountingConnector::default());
        let mut links = lifecycle(connector.clone());

        links.close().await.unwrap();
        links.open(None).await.unwrap();
        links.close().await.unwrap();
        links.close().await.unwrap();

        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(links.teardowns(), 1);
        assert!(!links.is_open());
    }

    #[tokio::test]
    async fn test_reset_forces_reopen() {
        let connector = Arc::new(CountingConnector::default());
        let mut links = lifecycle(connector.clone());

        links.open(None).await.unwrap();
        links.reset().await;
        links.open(None).await.unwrap();

        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_respects_deadline() {
        let connector = Arc::new(CountingConnector {
            open_delay: Some(Duration::from_secs(10)),
            ..CountingConnector::default()
        });
        let mut links = lifecycle(connector.clone());

        let deadline = Instant::now() + Duration::from_secs(1);
        let result = links.open(Some(deadline)).await;

        assert!(matches!(result, Err(EventHubError::Timeout { .. })));
        assert!(!links.is_open());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }
}
