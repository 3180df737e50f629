//! Behavioural tests for building Incus clients from configuration.

#[path = "common/fake_incus.rs"]
mod fake_incus;

use std::time::Duration;

use fake_incus::FakeIncus;
use garm_provider_incus::{ConnectError, IncusConfig, get_client_from_config};
use rstest::rstest;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

fn with_socket(path: &str) -> IncusConfig {
    IncusConfig {
        unix_socket_path: Some(path.to_owned()),
        ..IncusConfig::default()
    }
}

fn with_server_cert(path: &str) -> IncusConfig {
    IncusConfig {
        tls_server_certificate: Some(path.to_owned()),
        ..IncusConfig::default()
    }
}

fn with_ca(path: &str) -> IncusConfig {
    IncusConfig {
        tls_ca: Some(path.to_owned()),
        ..IncusConfig::default()
    }
}

fn with_client_cert(path: &str) -> IncusConfig {
    IncusConfig {
        client_certificate: Some(path.to_owned()),
        ..IncusConfig::default()
    }
}

fn with_client_key(path: &str) -> IncusConfig {
    IncusConfig {
        client_key: Some(path.to_owned()),
        ..IncusConfig::default()
    }
}

#[rstest]
#[case::nil_config(None, "no Incus configuration found")]
#[case::empty_config(Some(IncusConfig::default()), "connecting to Incus")]
#[case::invalid_unix_socket(Some(with_socket("invalid")), " dial unix invalid")]
#[case::invalid_tls_server_cert(Some(with_server_cert("invalid")), "reading TLSServerCert")]
#[case::invalid_tls_ca(Some(with_ca("invalid")), "reading TLSCA")]
#[case::invalid_client_certificate(Some(with_client_cert("invalid")), "reading ClientCertificate")]
#[case::invalid_client_key(Some(with_client_key("invalid")), "reading ClientKey")]
#[tokio::test]
async fn invalid_configurations_return_no_client(
    #[case] config: Option<IncusConfig>,
    #[case] expected: &str,
) {
    let cancel = CancellationToken::new();
    let result = get_client_from_config(&cancel, config.as_ref()).await;

    let err = result.expect_err("configuration should not produce a client");
    assert!(
        err.to_string().contains(expected),
        "expected error containing {expected:?}, got {err}"
    );
}

#[tokio::test]
async fn socket_connection_captures_server_info() {
    let fake = FakeIncus::start().await;
    let cancel = CancellationToken::new();

    let client = get_client_from_config(&cancel, Some(&fake.config()))
        .await
        .unwrap_or_else(|err| panic!("connect to fake incus: {err}"));

    assert_eq!(client.server_info().api_version, "1.0");
    assert_eq!(client.server_info().environment.server_version, "6.0.0");
    assert_eq!(client.project(), None);
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn unix_socket_takes_precedence_over_remote_settings() {
    let fake = FakeIncus::start().await;
    let cancel = CancellationToken::new();
    let config = IncusConfig {
        url: Some(String::from("https://incus.invalid:8443")),
        tls_server_certificate: Some(String::from("/nonexistent/server.crt")),
        project_name: Some(String::from("ci")),
        ..fake.config()
    };

    let client = get_client_from_config(&cancel, Some(&config))
        .await
        .unwrap_or_else(|err| panic!("socket should win: {err}"));

    assert_eq!(client.project(), Some("ci"));
}

#[tokio::test]
async fn project_scopes_requests() {
    let fake = FakeIncus::start().await;
    let cancel = CancellationToken::new();
    let config = IncusConfig {
        project_name: Some(String::from("ci")),
        ..fake.config()
    };

    let client = get_client_from_config(&cancel, Some(&config))
        .await
        .unwrap_or_else(|err| panic!("connect: {err}"));
    client
        .list_instances_full()
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));

    let requests = fake.requests();
    let list = requests
        .last()
        .unwrap_or_else(|| panic!("list request should be recorded"));
    assert_eq!(list.path, "/1.0/instances");
    assert_eq!(list.query, "recursion=2&project=ci");
}

#[tokio::test]
async fn cancelled_token_aborts_connection() {
    let fake = FakeIncus::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = get_client_from_config(&cancel, Some(&fake.config()))
        .await
        .expect_err("cancelled attempt should fail");

    assert_eq!(err, ConnectError::Cancelled);
    assert!(err.to_string().starts_with("connecting to Incus"));
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn cancelling_during_dial_aborts_connection() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let socket = dir.path().join("silent.socket");
    let listener = UnixListener::bind(&socket).unwrap_or_else(|err| panic!("bind: {err}"));
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    let socket_path = socket
        .to_str()
        .unwrap_or_else(|| panic!("socket path should be utf8: {}", socket.display()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        get_client_from_config(&cancel, Some(&with_socket(socket_path))),
    )
    .await
    .unwrap_or_else(|elapsed| panic!("cancellation should end the dial: {elapsed}"));

    let err = result.expect_err("cancelled dial should fail");
    assert_eq!(err, ConnectError::Cancelled);
    silent.abort();
}

#[tokio::test]
async fn remote_without_url_reports_connection_error() {
    let cancel = CancellationToken::new();
    let config = IncusConfig {
        project_name: Some(String::from("ci")),
        ..IncusConfig::default()
    };

    let err = get_client_from_config(&cancel, Some(&config))
        .await
        .expect_err("no endpoint configured");
    assert!(matches!(err, ConnectError::Connect { .. }), "unexpected: {err}");
}
