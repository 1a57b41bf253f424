// ============================================
// File: crates/debugport-server/tests/e2e.rs
// ============================================
//! End-to-end tests driving a real server over TCP with a plain
//! socket client, the way an external debugger would.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use debugport_server::services::dispatcher::HandlerError;
use debugport_server::{Server, ServerConfig, ServerEvent};

// ============================================
// Helpers
// ============================================

struct TestClient {
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
}

impl TestClient {
    async fn connect(server: &Server) -> TestClient {
        let addr = server.local_addr().expect("server not running");
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (reader, writer) = tokio::io::split(stream);
        TestClient {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Reads one line, with a timeout so a hung test fails fast.
    async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("read failed");
        assert!(n > 0, "connection closed while expecting a line");
        line.trim_end().to_string()
    }

    /// Expects the connection to close without further data.
    async fn expect_eof(&mut self) {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for close")
            .expect("read failed");
        assert_eq!(n, 0, "expected close, got data: {line:?}");
    }

    /// Expects the connection to drop. A server that discards the
    /// socket with our bytes still unread produces a reset rather
    /// than a clean EOF, so both count as dropped here.
    async fn expect_dropped(&mut self) {
        let mut line = String::new();
        let result = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for close");
        match result {
            Ok(0) => {}
            Ok(_) => panic!("expected close, got data: {line:?}"),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
            Err(e) => panic!("unexpected error while waiting for close: {e}"),
        }
    }
}

fn open_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.network.port = 0;
    config.auth.required = false;
    config
}

async fn start_server(config: ServerConfig) -> Server {
    let server = Server::new(config);
    server.start().await.expect("server failed to start");
    server
}

// ============================================
// Scenarios
// ============================================

#[tokio::test]
async fn ping_round_trip_without_auth() {
    let server = start_server(open_config()).await;

    let mut client = TestClient::connect(&server).await;
    client.send(r#"{"command":"ping","args":[]}"#).await;
    assert_eq!(client.recv().await, r#"{"result":"pong"}"#);

    server.stop().await;
}

#[tokio::test]
async fn wrong_token_is_rejected_and_commands_stay_gated() {
    let mut config = open_config();
    config.auth.required = true;
    config.auth.token = Some("secret123".to_string());
    let server = start_server(config).await;

    let mut client = TestClient::connect(&server).await;

    let challenge = client.recv().await;
    assert!(challenge.contains("auth_challenge"), "got: {challenge}");

    client.send(r#"{"type":"auth_response","token":"wrong"}"#).await;
    let result = client.recv().await;
    assert!(result.contains(r#""success":false"#), "got: {result}");

    // The rejected session answers further frames with an auth error
    // instead of dispatching them.
    client.send(r#"{"command":"ping","args":[]}"#).await;
    let reply = client.recv().await;
    assert!(reply.contains("authentication failed"), "got: {reply}");

    server.stop().await;
}

#[tokio::test]
async fn correct_token_unlocks_dispatch() {
    let mut config = open_config();
    config.auth.required = true;
    config.auth.token = Some("secret123".to_string());
    let server = start_server(config).await;

    let mut client = TestClient::connect(&server).await;
    let _challenge = client.recv().await;

    client.send(r#"{"type":"auth_response","token":"secret123"}"#).await;
    let result = client.recv().await;
    assert!(result.contains(r#""success":true"#), "got: {result}");

    client.send(r#"{"command":"ping","args":[]}"#).await;
    assert_eq!(client.recv().await, r#"{"result":"pong"}"#);

    server.stop().await;
}

#[tokio::test]
async fn generated_token_works_for_auth() {
    let mut config = open_config();
    config.auth.required = true;
    let server = start_server(config).await;
    assert!(server.auth_token_generated());
    let token = server.auth_token().expose().to_string();

    let mut client = TestClient::connect(&server).await;
    let _challenge = client.recv().await;
    client
        .send(&format!(r#"{{"type":"auth_response","token":"{token}"}}"#))
        .await;
    let result = client.recv().await;
    assert!(result.contains(r#""success":true"#), "got: {result}");

    server.stop().await;
}

#[tokio::test]
async fn pool_full_connection_closed_without_handshake_data() {
    let mut config = open_config();
    config.limits.max_clients = 2;
    let server = start_server(config).await;

    let _a = TestClient::connect(&server).await;
    let _b = TestClient::connect(&server).await;

    // Admission happens in a spawned task; give it a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.get_all_clients().len(), 2);

    let mut rejected = TestClient::connect(&server).await;
    rejected.expect_eof().await;

    server.stop().await;
}

#[tokio::test]
async fn idle_client_is_swept() {
    let mut config = open_config();
    config.limits.idle_timeout_secs = 1;
    config.limits.sweep_interval_secs = 1;
    let server = start_server(config).await;

    let mut client = TestClient::connect(&server).await;
    client.send(r#"{"command":"ping","args":[]}"#).await;
    assert_eq!(client.recv().await, r#"{"result":"pong"}"#);

    // Stay quiet past the idle timeout plus one sweep interval.
    client.expect_eof().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.get_all_clients().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn broadcast_reaches_connected_clients() {
    let server = start_server(open_config()).await;

    let mut a = TestClient::connect(&server).await;
    let mut b = TestClient::connect(&server).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let delivered = server.broadcast("maintenance in 5 minutes");
    assert_eq!(delivered, 2);
    assert_eq!(a.recv().await, "maintenance in 5 minutes");
    assert_eq!(b.recv().await, "maintenance in 5 minutes");

    server.stop().await;
}

#[tokio::test]
async fn disconnect_client_closes_socket() {
    let server = start_server(open_config()).await;

    let mut client = TestClient::connect(&server).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let clients = server.get_all_clients();
    assert_eq!(clients.len(), 1);
    server.disconnect_client(&clients[0].id).unwrap();

    client.expect_eof().await;

    server.stop().await;
}

#[tokio::test]
async fn pipelined_commands_answered_in_order() {
    let server = start_server(open_config()).await;
    server.registry().register(
        "echo",
        "echo arguments",
        Arc::new(|args: &[String]| -> Result<String, HandlerError> {
            Ok(args.join(" "))
        }),
    );

    let mut client = TestClient::connect(&server).await;

    // One write carrying several frames; replies must come back in
    // submission order.
    let mut batch = String::new();
    for i in 0..5 {
        batch.push_str(&format!(r#"{{"command":"echo","args":["{i}"]}}"#));
        batch.push('\n');
    }
    client.writer.write_all(batch.as_bytes()).await.unwrap();

    for i in 0..5 {
        assert_eq!(client.recv().await, format!(r#"{{"result":"{i}"}}"#));
    }

    server.stop().await;
}

#[tokio::test]
async fn partial_frames_are_reassembled() {
    let server = start_server(open_config()).await;

    let mut client = TestClient::connect(&server).await;
    let frame = br#"{"command":"ping","args":[]}"#;
    let (head, tail) = frame.split_at(10);

    client.writer.write_all(head).await.unwrap();
    client.writer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.writer.write_all(tail).await.unwrap();
    client.writer.write_all(b"\n").await.unwrap();

    assert_eq!(client.recv().await, r#"{"result":"pong"}"#);

    server.stop().await;
}

#[tokio::test]
async fn unknown_and_malformed_commands_get_error_payloads() {
    let server = start_server(open_config()).await;

    let mut client = TestClient::connect(&server).await;
    client.send(r#"{"command":"frobnicate"}"#).await;
    assert_eq!(
        client.recv().await,
        r#"{"result":"Unknown command: frobnicate"}"#
    );

    client.send("this is not json").await;
    assert_eq!(
        client.recv().await,
        r#"{"result":"Error: invalid command format"}"#
    );

    // The connection survives both.
    client.send(r#"{"command":"ping"}"#).await;
    assert_eq!(client.recv().await, r#"{"result":"pong"}"#);

    server.stop().await;
}

#[tokio::test]
async fn connection_events_are_published() {
    let server = start_server(open_config()).await;
    let mut events = server.subscribe();

    let client = TestClient::connect(&server).await;
    let connected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let ServerEvent::ClientConnected { id, .. } = events.recv().await.unwrap() {
                break id;
            }
        }
    })
    .await
    .expect("no connect event");

    drop(client);
    let disconnected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let ServerEvent::ClientDisconnected { id } = events.recv().await.unwrap() {
                break id;
            }
        }
    })
    .await
    .expect("no disconnect event");

    assert_eq!(connected, disconnected);
    server.stop().await;
}

#[tokio::test]
async fn performance_stats_count_traffic() {
    let server = start_server(open_config()).await;

    let mut client = TestClient::connect(&server).await;
    client.send(r#"{"command":"ping","args":[]}"#).await;
    client.recv().await;
    client.send(r#"{"command":"ping","args":[]}"#).await;
    client.recv().await;

    let stats = server.get_performance_stats();
    assert_eq!(stats.messages_processed, 2);
    assert_eq!(stats.active_clients, 1);
    // The second identical ping came from the response cache.
    assert_eq!(stats.cache_hits, 1);

    server.stop().await;
}

#[tokio::test]
async fn tls_client_connects_with_self_signed_cert() {
    use tokio_rustls::rustls::{self, pki_types::ServerName};

    let mut config = open_config();
    config.tls.enabled = true;
    config.tls.self_signed = true;
    let server = start_server(config).await;
    let addr = server.local_addr().unwrap();

    // Client that skips certificate verification; the server's cert
    // is ephemeral and unpinnable by design.
    #[derive(Debug)]
    struct NoVerify;
    impl rustls::client::danger::ServerCertVerifier for NoVerify {
        fn verify_server_cert(
            &self,
            _: &rustls::pki_types::CertificateDer<'_>,
            _: &[rustls::pki_types::CertificateDer<'_>],
            _: &ServerName<'_>,
            _: &[u8],
            _: rustls::pki_types::UnixTime,
        ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        }
        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &rustls::pki_types::CertificateDer<'_>,
            _: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }
        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &rustls::pki_types::CertificateDer<'_>,
            _: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }
        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            vec![
                rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
                rustls::SignatureScheme::ED25519,
                rustls::SignatureScheme::RSA_PKCS1_SHA256,
                rustls::SignatureScheme::RSA_PSS_SHA256,
            ]
        }
    }

    let tls_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerify))
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    let stream = connector.connect(name, tcp).await.unwrap();

    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    writer
        .write_all(b"{\"command\":\"ping\",\"args\":[]}\n")
        .await
        .unwrap();
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.trim_end(), r#"{"result":"pong"}"#);

    server.stop().await;
}

#[tokio::test]
async fn plaintext_on_tls_port_is_dropped() {
    let mut config = open_config();
    config.tls.enabled = true;
    config.tls.self_signed = true;
    let server = start_server(config).await;

    // Plain TCP write to the TLS port: the server names the
    // misconfiguration in its logs and closes the socket.
    let mut client = TestClient::connect(&server).await;
    client.send(r#"{"command":"ping","args":[]}"#).await;
    client.expect_dropped().await;

    server.stop().await;
}
