//! Server creation against a loopback Instances API.

use rstest::rstest;

use crate::client::{
    CloudErrorKind, DiskMapping, InstanceSpec, NetworkMode, ResourceLifecycleClient,
};
use crate::scaleway::ScalewayClient;

use super::config;
use super::stub_api::{Route, StubApi};

const SOURCE_IMAGE: &str = "8f2c55b1-6f0a-4b8e-9a43-1e2f0c7d9b10";
const CREATED: &str = r#"{"server":{"id":"srv-1","state":"stopped","volumes":{"0":{"id":"vol-1"},"1":{"id":"vol-2"}}}}"#;
const REFUSED: &str = r#"{"type":"invalid_request_error","message":"refused"}"#;

const CREATE: &str = "POST /zones/fr-par-1/servers";
const ATTACH_NIC: &str = "POST /zones/fr-par-1/servers/srv-1/private_nics";
const POWER_ON: &str = "POST /zones/fr-par-1/servers/srv-1/action";
const DELETE_SERVER: &str = "DELETE /zones/fr-par-1/servers/srv-1";
const DELETE_ROOT: &str = "DELETE /zones/fr-par-1/volumes/vol-1";
const DELETE_DATA: &str = "DELETE /zones/fr-par-1/volumes/vol-2";

fn spec(network: NetworkMode) -> InstanceSpec {
    InstanceSpec {
        client_token: String::from("token-1"),
        name: String::from("golden-builder"),
        region: String::from("fr-par-1"),
        instance_type: String::from("DEV1-S"),
        source_image: String::from(SOURCE_IMAGE),
        architecture: String::from("x86_64"),
        io_optimized: false,
        system_disk: DiskMapping::default(),
        data_disks: Vec::new(),
        network,
        user_data: Some(String::from("#cloud-config\n")),
        tags: Vec::new(),
    }
}

fn private_network() -> NetworkMode {
    NetworkMode::Private {
        network_id: Some(String::from("pn-1")),
    }
}

fn public_network() -> NetworkMode {
    NetworkMode::Public {
        charge_type: String::from("PayByTraffic"),
        max_bandwidth_out_mbps: 100,
    }
}

fn client_for(api: &StubApi) -> ScalewayClient {
    ScalewayClient::new(config())
        .unwrap_or_else(|err| panic!("client should build: {err}"))
        .with_base_url(api.base_url())
}

fn healthy(method: &str, path: &str) -> (u16, &'static str) {
    match (method, path) {
        ("POST", "/zones/fr-par-1/servers") => (201, CREATED),
        _ => (200, "{}"),
    }
}

fn power_on_refused(method: &str, path: &str) -> (u16, &'static str) {
    match (method, path) {
        ("POST", "/zones/fr-par-1/servers") => (201, CREATED),
        ("POST", "/zones/fr-par-1/servers/srv-1/action") => (400, REFUSED),
        _ => (200, ""),
    }
}

fn nic_refused(method: &str, path: &str) -> (u16, &'static str) {
    match (method, path) {
        ("POST", "/zones/fr-par-1/servers") => (201, CREATED),
        ("POST", "/zones/fr-par-1/servers/srv-1/private_nics") => (400, REFUSED),
        _ => (200, ""),
    }
}

fn power_on_and_delete_refused(method: &str, path: &str) -> (u16, &'static str) {
    match (method, path) {
        ("POST", "/zones/fr-par-1/servers") => (201, CREATED),
        ("POST", "/zones/fr-par-1/servers/srv-1/action") => (400, REFUSED),
        ("DELETE", "/zones/fr-par-1/servers/srv-1") => (403, REFUSED),
        _ => (200, ""),
    }
}

#[tokio::test]
async fn server_is_created_stopped_then_powered_on() {
    let api = StubApi::start(healthy).await;
    let client = client_for(&api);

    let id = client
        .create_instance(&spec(public_network()))
        .await
        .unwrap_or_else(|err| panic!("server should be created: {err}"));

    assert_eq!(id, "srv-1");
    assert_eq!(api.calls(), [CREATE, POWER_ON]);
}

#[rstest]
#[case::power_on(power_on_refused, public_network(), vec![CREATE, POWER_ON])]
#[case::private_nic(nic_refused, private_network(), vec![CREATE, ATTACH_NIC])]
#[tokio::test]
async fn failed_setup_deletes_the_new_server(
    #[case] route: Route,
    #[case] network: NetworkMode,
    #[case] setup_calls: Vec<&str>,
) {
    let api = StubApi::start(route).await;
    let client = client_for(&api);

    let err = client
        .create_instance(&spec(network))
        .await
        .err()
        .unwrap_or_else(|| panic!("setup failure should surface"));

    assert_eq!(err.kind, CloudErrorKind::Permanent);
    let mut expected = setup_calls;
    expected.extend([DELETE_SERVER, DELETE_ROOT, DELETE_DATA]);
    assert_eq!(api.calls(), expected);
}

#[tokio::test]
async fn undeletable_server_is_named_in_the_error() {
    let api = StubApi::start(power_on_and_delete_refused).await;
    let client = client_for(&api);

    let err = client
        .create_instance(&spec(public_network()))
        .await
        .err()
        .unwrap_or_else(|| panic!("setup failure should surface"));

    assert_eq!(err.code, "invalid_request_error");
    assert!(
        err.message.contains("server srv-1 was left behind"),
        "unexpected message: {}",
        err.message
    );
    assert_eq!(api.calls(), [CREATE, POWER_ON, DELETE_SERVER]);
}
