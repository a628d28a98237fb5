//! Connection-level behavior against a raw TCP peer: framing, response
//! ordering, stale-response skipping, and EOF handling.

use std::time::Duration;

use gregor::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use gregor::prelude::protocol::ApiKey;
use gregor::prelude::encode::ToByte;

struct HeartbeatBody;

impl ToByte for HeartbeatBody {
    fn encode<W: bytes::BufMut>(&self, buffer: &mut W) -> gregor::error::Result<()> {
        "g".encode(buffer)?;
        1i32.encode(buffer)?;
        "m".encode(buffer)
    }
}

/// A peer that answers every request frame with
/// `[correlation_id, error_code=0, seq]`, where `seq` counts responses.
async fn spawn_sequencing_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut seq: i32 = 0;
                loop {
                    let mut size_buf = [0u8; 4];
                    if socket.read_exact(&mut size_buf).await.is_err() {
                        return;
                    }
                    let size = i32::from_be_bytes(size_buf) as usize;
                    let mut frame = vec![0u8; size];
                    if socket.read_exact(&mut frame).await.is_err() {
                        return;
                    }
                    // api_key (2) + api_version (2), then correlation_id.
                    let correlation_id = i32::from_be_bytes(frame[4..8].try_into().unwrap());

                    let mut response = Vec::new();
                    response.extend_from_slice(&10i32.to_be_bytes()); // size
                    response.extend_from_slice(&correlation_id.to_be_bytes());
                    response.extend_from_slice(&0i16.to_be_bytes());
                    response.extend_from_slice(&seq.to_be_bytes());
                    seq += 1;
                    if socket.write_all(&response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    addr
}

fn config_for(addr: &str) -> ClientConfig {
    ClientConfig::new([addr])
        .unwrap()
        .with_connect_timeout(Duration::from_secs(2))
        .with_socket_timeout(Duration::from_secs(2))
}

fn seq_of(body: &bytes::Bytes) -> i32 {
    i32::from_be_bytes(body[2..6].try_into().unwrap())
}

#[tokio::test]
async fn test_responses_arrive_in_request_order() {
    let addr = spawn_sequencing_peer().await;
    let mut connection =
        BrokerConnection::new(BrokerAddr::parse(&addr).unwrap(), config_for(&addr));

    let first = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();
    let second = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();

    assert_eq!(seq_of(&first), 0);
    assert_eq!(seq_of(&second), 1);
}

#[tokio::test]
async fn test_fire_and_forget_response_is_skipped() {
    let addr = spawn_sequencing_peer().await;
    let mut connection =
        BrokerConnection::new(BrokerAddr::parse(&addr).unwrap(), config_for(&addr));

    // No response awaited; the peer still answers with seq 0.
    connection
        .send(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();

    // The next request must get its own response (seq 1), stepping over
    // the unclaimed one still sitting in the pipe.
    let response = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();
    assert_eq!(seq_of(&response), 1);
}

#[tokio::test]
async fn test_short_frame_is_unexpected_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut size_buf = [0u8; 4];
        let _ = socket.read_exact(&mut size_buf).await;
        let size = i32::from_be_bytes(size_buf) as usize;
        let mut frame = vec![0u8; size];
        let _ = socket.read_exact(&mut frame).await;

        // Declare 100 bytes, deliver 10, hang up.
        let _ = socket.write_all(&100i32.to_be_bytes()).await;
        let _ = socket.write_all(&[0u8; 10]).await;
    });

    let mut connection =
        BrokerConnection::new(BrokerAddr::parse(&addr).unwrap(), config_for(&addr));
    let err = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap_err();
    assert_eq!(err, Error::UnexpectedEof);
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    // Bind then immediately drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    drop(listener);

    let mut connection =
        BrokerConnection::new(BrokerAddr::parse(&addr).unwrap(), config_for(&addr));
    let err = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

#[tokio::test]
async fn test_close_then_redial_keeps_correlating() {
    let addr = spawn_sequencing_peer().await;
    let mut connection =
        BrokerConnection::new(BrokerAddr::parse(&addr).unwrap(), config_for(&addr));

    let first = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();
    assert_eq!(seq_of(&first), 0);

    connection.close();
    assert!(!connection.is_connected());

    // Correlation IDs keep counting across the re-dial; the peer echoes
    // whatever it receives, so matching still works on a fresh socket.
    let response = connection
        .request(ApiKey::Heartbeat, 0, &HeartbeatBody)
        .await
        .unwrap();
    assert_eq!(seq_of(&response), 0);
    assert!(connection.is_connected());
}
