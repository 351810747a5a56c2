// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Verified HTTPS against a local rustls server whose leaf is signed by a test CA.

use std::error::Error as _;
use std::sync::Arc;

use carto_transport::{AsyncTransport, HttpRequest, TransportConfig, TransportError};
use carto_trust::{tls, TrustConfig, TrustStore};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

struct TestCa {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl TestCa {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// A leaf for `localhost` and `127.0.0.1` signed by this CA.
    fn issue_leaf(&self) -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "cartograph core");
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert, key)
    }

    /// Write the CA to a PEM file and return the directory holding it.
    fn write_pem(&self) -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, self.cert.pem()).unwrap();
        (dir, path)
    }
}

/// Serve `pong` over TLS with a leaf issued by `ca` and return the port.
async fn serve_pong(ca: &TestCa) -> u16 {
    let (leaf, leaf_key) = ca.issue_leaf();
    let config = rustls::ServerConfig::builder_with_provider(tls::provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![leaf.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
        )
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // A rejected handshake surfaces on the client side.
                let Ok(mut stream) = acceptor.accept(stream).await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\npong";
                let _ = stream.write_all(response).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    port
}

fn transport_trusting(ca_path: &std::path::Path, port: u16, verify: bool) -> AsyncTransport {
    let url = format!("https://127.0.0.1:{port}");
    let mut trust = TrustConfig::new(&url);
    trust.custom_ca_cert_path = Some(ca_path.to_path_buf());
    trust.include_public_roots = false;
    let store = TrustStore::from_config(&trust).unwrap();

    let mut config = TransportConfig::new(url);
    config.verify = verify;
    AsyncTransport::new(&config, Some(store)).unwrap()
}

fn error_chain(err: &TransportError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[tokio::test]
async fn test_handshake_succeeds_with_the_issuing_ca() {
    let ca = TestCa::new("cartograph test CA");
    let port = serve_pong(&ca).await;
    let (_dir, ca_path) = ca.write_pem();
    let transport = transport_trusting(&ca_path, port, true);

    let response = transport.call(HttpRequest::get("/system/ping")).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "pong");
    assert_eq!(transport.trust().unwrap().generation(), 1);
}

#[tokio::test]
async fn test_handshake_fails_with_another_ca() {
    let ca = TestCa::new("cartograph test CA");
    let port = serve_pong(&ca).await;
    let stranger = TestCa::new("somebody else");
    let (_dir, stranger_path) = stranger.write_pem();
    let transport = transport_trusting(&stranger_path, port, true);

    let err = transport.call(HttpRequest::get("/system/ping")).await.unwrap_err();
    assert!(matches!(err, TransportError::Http(_)), "{err:?}");
    assert!(error_chain(&err).to_lowercase().contains("certificate"), "{}", error_chain(&err));
}

#[tokio::test]
async fn test_disabled_verification_ignores_the_trust_store() {
    let ca = TestCa::new("cartograph test CA");
    let port = serve_pong(&ca).await;
    let stranger = TestCa::new("somebody else");
    let (_dir, stranger_path) = stranger.write_pem();
    let transport = transport_trusting(&stranger_path, port, false);

    let response = transport.call(HttpRequest::get("/system/ping")).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "pong");
    assert!(!transport.trust().unwrap().is_loaded());
}
