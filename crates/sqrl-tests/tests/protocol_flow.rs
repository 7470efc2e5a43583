//! End-to-end protocol conversations between a simulated device and an
//! in-process site.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sqrl_core::Tif;
use sqrl_engine::PollOutcome;
use sqrl_proto::{decode_fields, OptionFlags, SqrlCommand};
use sqrl_tests::{TestDevice, TestSite};

// ============================================================================
// First-time registration
// ============================================================================

#[tokio::test]
async fn test_first_time_registration() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    // query: the site has never seen this identity.
    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::NONE);
    assert_eq!(site.poll(&login.nut).await.unwrap(), PollOutcome::Pending);

    // ident: identity created, no match bits on creation.
    let response = device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::NONE);

    // The browser's poll now reports success with the new identity.
    assert_eq!(
        site.poll(&login.nut).await.unwrap(),
        PollOutcome::LoggedIn(device.client().identity().identity_key())
    );
    assert_eq!(site.storage().identity_count(), 1);
}

#[tokio::test]
async fn test_returning_user_login() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    // First conversation registers the identity.
    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    // Second conversation: the identity is known.
    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::CURRENT_ID_MATCH);

    let response = device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::CURRENT_ID_MATCH);
    assert_eq!(
        site.poll(&login.nut).await.unwrap(),
        PollOutcome::LoggedIn(device.client().identity().identity_key())
    );

    // Still exactly one identity stored.
    assert_eq!(site.storage().identity_count(), 1);
}

// ============================================================================
// Response body shape
// ============================================================================

#[tokio::test]
async fn test_response_body_is_wire_envelope() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    let body = response.to_body();

    // The body is base64url text whose decoded form is CRLF-joined
    // name=value lines.
    let decoded = URL_SAFE_NO_PAD.decode(&body).unwrap();
    let text = String::from_utf8(decoded).unwrap();
    assert!(text.ends_with("\r\n"));

    let fields = decode_fields(&body).unwrap();
    assert_eq!(fields.get("ver"), Some("1"));
    assert_eq!(fields.get("tif"), Some("0"));
    assert_eq!(fields.get("sfn"), Some("Example"));
    assert_eq!(fields.get("nut"), Some(response.nut.as_str()));
    assert_eq!(
        fields.get("qry"),
        Some(format!("/sqrl?nut={}", response.nut).as_str())
    );
}

#[tokio::test]
async fn test_tif_hex_on_wire() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    // Register, then query with an ambient CommandFailed-free match so the
    // wire value is a compound mask.
    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let session = device.session().unwrap();
    let body = device.client().build_request(
        session,
        SqrlCommand::Query,
        OptionFlags::default(),
    );
    let response = site
        .post_with_ambient(session.nut(), body, Tif::COMMAND_FAILED)
        .await;

    // 0x01 | 0x40 serializes as "41" and parses back.
    assert_eq!(response.tif.bits(), 0x41);
    let fields = decode_fields(&response.to_body()).unwrap();
    assert_eq!(fields.get("tif"), Some("41"));
    assert_eq!(Tif::from_hex(fields.get("tif").unwrap()).unwrap(), response.tif);
}

// ============================================================================
// CPS redirect
// ============================================================================

#[tokio::test]
async fn test_cps_redirect_on_ident() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let cps = OptionFlags {
        client_provided_session: true,
        ..Default::default()
    };
    let response = device.send(&site, SqrlCommand::Ident, cps).await;

    assert_eq!(
        response.redirect_url.as_deref(),
        Some("https://example.com/loggedin")
    );
    assert_eq!(
        response.cancel_url.as_deref(),
        Some("https://example.com/cancelled")
    );

    // query never returns the redirect.
    let response = device.send(&site, SqrlCommand::Query, cps).await;
    assert!(response.redirect_url.is_none());
}

// ============================================================================
// Disable / enable / remove acknowledgement
// ============================================================================

#[tokio::test]
async fn test_disable_against_unknown_identity_fails() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let response = device
        .send(&site, SqrlCommand::Disable, OptionFlags::default())
        .await;
    assert!(response.tif.contains(Tif::COMMAND_FAILED));
    assert!(response.tif.contains(Tif::CLIENT_FAILURE));
}

#[tokio::test]
async fn test_disable_acknowledged_for_known_identity() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    let response = device
        .send(&site, SqrlCommand::Disable, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::CURRENT_ID_MATCH);
}

// ============================================================================
// suk echo
// ============================================================================

#[tokio::test]
async fn test_query_returns_suk_when_requested() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let want_suk = OptionFlags {
        return_session_unlock_key: true,
        ..Default::default()
    };
    let response = device.send(&site, SqrlCommand::Query, want_suk).await;
    assert_eq!(
        response.server_unlock_key,
        Some(device.client().identity().unlock_key())
    );

    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert!(response.server_unlock_key.is_none());
}
