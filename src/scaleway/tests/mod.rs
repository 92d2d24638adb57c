//! Tests for the Scaleway client.

use super::*;

mod create;

pub(super) fn config() -> ScalewayConfig {
    ScalewayConfig {
        access_key: None,
        secret_key: String::from("secret"),
        default_organization_id: None,
        default_project_id: String::from("proj"),
        default_zone: String::from("fr-par-1"),
    }
}

#[test]
fn new_rejects_missing_secret() {
    let mut invalid = config();
    invalid.secret_key = String::new();
    assert!(matches!(
        ScalewayClient::new(invalid),
        Err(ConfigError::MissingField(_))
    ));
}

#[test]
fn zone_urls_use_configured_base() {
    let client = ScalewayClient::new(config())
        .unwrap_or_else(|err| panic!("client should build: {err}"))
        .with_base_url("http://localhost:8080");
    assert_eq!(
        client.zone_url("nl-ams-1", "servers/abc"),
        "http://localhost:8080/zones/nl-ams-1/servers/abc"
    );
}

#[tokio::test]
async fn regions_list_known_zones() {
    let client =
        ScalewayClient::new(config()).unwrap_or_else(|err| panic!("client should build: {err}"));
    let zones = client
        .describe_regions()
        .await
        .unwrap_or_else(|err| panic!("zones should list: {err}"));
    assert!(zones.iter().any(|zone| zone == "fr-par-1"));
    assert_eq!(zones.len(), SCALEWAY_ZONES.len());
}

#[tokio::test]
async fn copy_is_reported_as_permanent() {
    let client =
        ScalewayClient::new(config()).unwrap_or_else(|err| panic!("client should build: {err}"));
    let spec = ImageCopySpec {
        source_image_id: String::from("img-1"),
        source_region: String::from("fr-par-1"),
        destination_region: String::from("nl-ams-1"),
        name: String::from("golden"),
        description: None,
    };
    let err = client
        .copy_image(&spec)
        .await
        .err()
        .unwrap_or_else(|| panic!("copy should fail"));
    assert!(!err.is_transient());
    assert_eq!(err.code, "unsupported_operation");
}
