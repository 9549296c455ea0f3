//! HTTP transport against a local one-shot server

use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tradecost_core::{Request, RequestError, Transport};
use tradecost_network::{HttpTransport, HttpTransportConfig};

/// Serves one response and returns the request line it received
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        String::from_utf8_lossy(&received)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    });

    (base, task)
}

fn transport(base: &str) -> HttpTransport {
    let mut endpoints = BTreeMap::new();
    endpoints.insert("fees".to_string(), base.to_string());
    HttpTransport::new(HttpTransportConfig {
        timeout: Duration::from_secs(5),
        endpoints,
        ..HttpTransportConfig::default()
    })
    .expect("Failed to create transport")
}

#[tokio::test]
async fn test_json_body_is_decoded() {
    let (base, server) = serve_once("200 OK", r#"{"fee":1.25,"currency":"EUR"}"#).await;

    let value = transport(&base)
        .send(&Request::get("fees", "/brokers/ib"))
        .await
        .unwrap();

    assert_eq!(value, json!({"fee": 1.25, "currency": "EUR"}));
    assert_eq!(server.await.unwrap(), "GET /brokers/ib HTTP/1.1");
}

#[tokio::test]
async fn test_query_params_are_sent() {
    let (base, server) = serve_once("200 OK", "[]").await;

    let mut request = Request::get("fees", "/quotes");
    request.params.insert("symbol".to_string(), "AAPL".to_string());
    request.params.insert("venue".to_string(), "xnas".to_string());

    let value = transport(&base).send(&request).await.unwrap();

    assert_eq!(value, json!([]));
    assert_eq!(
        server.await.unwrap(),
        "GET /quotes?symbol=AAPL&venue=xnas HTTP/1.1"
    );
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let (base, _server) = serve_once("204 No Content", "").await;

    let value = transport(&base)
        .send(&Request::get("fees", "/ping"))
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (base, _server) = serve_once("503 Service Unavailable", "maintenance").await;

    let err = transport(&base)
        .send(&Request::get("fees", "/brokers"))
        .await
        .unwrap_err();

    assert_eq!(err, RequestError::server(503, "maintenance"));
    assert!(!err.is_terminal());
}

#[tokio::test]
async fn test_client_error_is_terminal() {
    let (base, _server) = serve_once("404 Not Found", "").await;

    let err = transport(&base)
        .send(&Request::get("fees", "/brokers/none"))
        .await
        .unwrap_err();

    assert_eq!(err, RequestError::client(404, "Not Found"));
    assert!(err.is_terminal());
}

#[tokio::test]
async fn test_malformed_json_is_invalid_response() {
    let (base, _server) = serve_once("200 OK", "{not json").await;

    let err = transport(&base)
        .send(&Request::get("fees", "/brokers"))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = transport(&base)
        .send(&Request::get("fees", "/brokers"))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Network { .. }));
}
