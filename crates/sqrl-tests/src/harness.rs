//! In-process site and device for protocol conversations.

use std::sync::Arc;

use rand::rngs::OsRng;
use sqrl_client::{ClientSession, SqrlClient};
use sqrl_core::Tif;
use sqrl_engine::{
    DriverConfig, InboundRequest, IssuedLogin, MemoryStorage, PollOutcome, ProtocolDriver,
    StorageError,
};
use sqrl_proto::{OptionFlags, PostBody, ServerResponse, SqrlCommand};
use tracing::info;

/// An in-process relying party: protocol driver over in-memory storage.
pub struct TestSite {
    driver: ProtocolDriver,
    storage: Arc<MemoryStorage>,
}

impl TestSite {
    /// Creates a site for `example.com` with a friendly name and CPS
    /// redirect URLs configured.
    pub fn new() -> Self {
        let mut config = DriverConfig::new("example.com");
        config.server_friendly_name = Some("Example".to_string());
        config.success_url = Some("https://example.com/loggedin".to_string());
        config.cancel_url = Some("https://example.com/cancelled".to_string());
        Self::with_config(config)
    }

    /// Creates a site with a custom driver configuration.
    pub fn with_config(config: DriverConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let driver = ProtocolDriver::new(config, storage.clone());
        Self { driver, storage }
    }

    /// Returns the backing storage for direct inspection.
    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    /// Issues a login URL as the site's login page would.
    pub async fn issue_login_url(&self) -> IssuedLogin {
        self.driver
            .issue_login_url(&mut OsRng)
            .await
            .expect("in-memory storage never fails")
    }

    /// Handles one protocol POST with no ambient TIF bits.
    pub async fn post(&self, nut: &str, body: PostBody) -> ServerResponse {
        self.post_with_ambient(nut, body, Tif::NONE).await
    }

    /// Handles one protocol POST with session-layer TIF bits merged in.
    pub async fn post_with_ambient(
        &self,
        nut: &str,
        body: PostBody,
        ambient_tif: Tif,
    ) -> ServerResponse {
        self.driver
            .handle(
                &mut OsRng,
                InboundRequest {
                    nut: nut.to_string(),
                    body,
                    ambient_tif,
                },
            )
            .await
            .expect("in-memory storage never fails")
    }

    /// Polls a nut as the waiting browser would.
    pub async fn poll(&self, nut: &str) -> Result<PollOutcome, StorageError> {
        self.driver.poll(nut).await
    }
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}

/// A simulated authenticating device holding one client identity.
pub struct TestDevice {
    client: SqrlClient,
    session: Option<ClientSession>,
}

impl TestDevice {
    /// Creates a device with a fresh identity.
    pub fn new() -> Self {
        Self {
            client: SqrlClient::generate(&mut OsRng),
            session: None,
        }
    }

    /// Returns the client.
    pub fn client(&self) -> &SqrlClient {
        &self.client
    }

    /// Returns the active session, if a URL has been scanned.
    pub fn session(&self) -> Option<&ClientSession> {
        self.session.as_ref()
    }

    /// Scans a login URL, starting a conversation.
    pub fn scan(&mut self, login_url: &str) {
        let session = self
            .client
            .begin(login_url)
            .expect("harness login URLs always carry a nut");
        info!(nut = session.nut(), "Device scanned login URL");
        self.session = Some(session);
    }

    /// Rotates the device to a fresh identity key.
    pub fn rekey(&mut self) {
        self.client.identity_mut().rekey(&mut OsRng);
    }

    /// Sends one command to the site and absorbs its response.
    pub async fn send(
        &mut self,
        site: &TestSite,
        command: SqrlCommand,
        options: OptionFlags,
    ) -> ServerResponse {
        let session = self.session.as_mut().expect("scan a login URL first");
        let body = self.client.build_request(session, command, options);

        let response_wire = site.post(session.nut(), body).await;
        let absorbed = self
            .client
            .absorb(session, &response_wire.to_body())
            .expect("site responses always parse");

        assert_eq!(absorbed, &response_wire);
        response_wire
    }
}

impl Default for TestDevice {
    fn default() -> Self {
        Self::new()
    }
}
