//! Identity rotation: previous-key matching and the retired-key list.

use sqrl_core::Tif;
use sqrl_engine::{PollOutcome, Storage};
use sqrl_proto::{OptionFlags, SqrlCommand};
use sqrl_tests::{TestDevice, TestSite};

#[tokio::test]
async fn test_rekeyed_device_rotates_identity() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    // Register under the original key.
    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;
    let old_key = device.client().identity().identity_key();

    // The device rotates to a new key and returns.
    device.rekey();
    let new_key = device.client().identity().identity_key();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    // query sees the previous key.
    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::PREVIOUS_ID_MATCH);
    // A previous-key match hands back the stored unlock key unprompted.
    assert!(response.server_unlock_key.is_some());

    // ident rotates the stored identity to the new key.
    let response = device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::PREVIOUS_ID_MATCH);

    // The login completed under the rotated identity.
    assert_eq!(
        site.poll(&login.nut).await.unwrap(),
        PollOutcome::LoggedIn(new_key)
    );

    // Storage now matches the new key as current and the old one as
    // previous; the retired key was appended to the list.
    let storage = site.storage();
    let (record, _) = storage
        .find_identity(&new_key, None)
        .await
        .unwrap()
        .expect("rotated identity present");
    assert_eq!(record.identity_key, new_key);
    assert_eq!(record.previous_identity_keys, vec![old_key]);
    assert_eq!(storage.identity_count(), 1);
}

#[tokio::test]
async fn test_subsequent_login_after_rotation_is_current_match() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    device.rekey();
    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    // Third conversation: the rotated key is simply current now.
    let login = site.issue_login_url().await;
    device.scan(&login.url);
    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::CURRENT_ID_MATCH);
}

#[tokio::test]
async fn test_retired_key_list_capped_at_four() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    let login = site.issue_login_url().await;
    device.scan(&login.url);
    device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;

    let mut retired = vec![device.client().identity().identity_key()];

    // Five rotations; the first retired key must fall off the list.
    for _ in 0..5 {
        device.rekey();
        retired.push(device.client().identity().identity_key());

        let login = site.issue_login_url().await;
        device.scan(&login.url);
        let response = device
            .send(&site, SqrlCommand::Ident, OptionFlags::default())
            .await;
        assert_eq!(response.tif, Tif::PREVIOUS_ID_MATCH);
    }

    let current = device.client().identity().identity_key();
    let (record, _) = site
        .storage()
        .find_identity(&current, None)
        .await
        .unwrap()
        .expect("identity present");

    // retired = [k0, k1, k2, k3, k4, k5=current]; the list keeps the four
    // most recently retired keys, oldest first.
    assert_eq!(record.previous_identity_keys.len(), 4);
    assert_eq!(record.previous_identity_keys, retired[1..5].to_vec());
    assert_eq!(site.storage().identity_count(), 1);
}

#[tokio::test]
async fn test_stale_previous_key_does_not_rotate() {
    let site = TestSite::new();
    let mut device = TestDevice::new();

    // Never registered: a rekeyed device presenting an unknown previous
    // key is just a fresh registration.
    device.rekey();

    let login = site.issue_login_url().await;
    device.scan(&login.url);

    let response = device
        .send(&site, SqrlCommand::Query, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::NONE);

    let response = device
        .send(&site, SqrlCommand::Ident, OptionFlags::default())
        .await;
    assert_eq!(response.tif, Tif::NONE);
    assert_eq!(site.storage().identity_count(), 1);
}
