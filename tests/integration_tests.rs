//! Integration tests for the AirLog hub

use airlog::client::SubmissionClient;
use airlog::config::ServerConfig;
use airlog::server::HubServer;
use airlog::types::CSV_HEADER;
use airlog::AirLogError;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Start a hub on an ephemeral port with the given capacity. Returns the
/// bound address, the tempdir holding the log, and the server task.
async fn start_test_server(
    max_clients: usize,
) -> (SocketAddr, TempDir, JoinHandle<airlog::Result<()>>) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ServerConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.max_clients = max_clients;
    config.storage.log_path = temp_dir.path().join("submissions.csv");

    let server = HubServer::new(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.start());

    (addr, temp_dir, handle)
}

#[tokio::test]
async fn test_greeting_and_initial_snapshot() {
    let (addr, _temp_dir, server_handle) = start_test_server(4).await;

    let mut client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let snapshot = timeout(Duration::from_secs(2), client.next_snapshot())
        .await
        .unwrap()
        .unwrap();

    // fresh log: header only
    assert_eq!(snapshot, vec![CSV_HEADER.to_string()]);

    client.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_submission_is_acknowledged_and_broadcast() {
    let (addr, temp_dir, server_handle) = start_test_server(4).await;

    let mut client_a = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let mut client_b = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client_a.next_snapshot().await.unwrap();
    client_b.next_snapshot().await.unwrap();

    let timestamp = client_a.submit("u1", "AB12", "450").await.unwrap();
    assert!(!timestamp.is_empty());

    // both the submitter and the bystander receive the updated log
    for client in [&mut client_a, &mut client_b] {
        let snapshot = timeout(Duration::from_secs(2), client.next_snapshot())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], CSV_HEADER);
        assert_eq!(snapshot[1], format!("u1,{},AB12,450", timestamp));
    }

    // on-disk log matches what was broadcast
    let content =
        tokio::fs::read_to_string(temp_dir.path().join("submissions.csv")).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], CSV_HEADER);

    client_a.disconnect().await.unwrap();
    client_b.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_capacity_rejection_and_slot_release() {
    let (addr, _temp_dir, server_handle) = start_test_server(2).await;

    let mut client_a = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let mut client_b = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client_a.next_snapshot().await.unwrap();
    client_b.next_snapshot().await.unwrap();

    // third connection is turned away without becoming a session
    match SubmissionClient::connect(&addr.to_string()).await {
        Err(AirLogError::Connection(msg)) => assert!(msg.contains("capacity")),
        other => panic!("expected capacity rejection, got {:?}", other.map(|_| ())),
    }

    // a submission still fans out to exactly the two live sessions
    let timestamp = client_a.submit("u1", "AB12", "450").await.unwrap();
    let snapshot = client_b.next_snapshot().await.unwrap();
    assert_eq!(snapshot[1], format!("u1,{},AB12,450", timestamp));

    // disconnecting frees a slot for a new client
    client_a.disconnect().await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let mut client_d = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let snapshot = client_d.next_snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);

    client_b.disconnect().await.unwrap();
    client_d.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_sentinel_releases_unused_slot() {
    let (addr, _temp_dir, server_handle) = start_test_server(1).await;

    // connect and leave without ever submitting
    let client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client.disconnect().await.unwrap();
    sleep(Duration::from_millis(200)).await;

    // the single slot must be free again
    let client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client.disconnect().await.unwrap();

    server_handle.abort();
}

#[tokio::test]
async fn test_abrupt_disconnect_releases_slot() {
    let (addr, _temp_dir, server_handle) = start_test_server(1).await;

    // drop the socket without sending the sentinel
    let stream = TcpStream::connect(addr).await.unwrap();
    drop(stream);
    sleep(Duration::from_millis(300)).await;

    let client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client.disconnect().await.unwrap();

    server_handle.abort();
}

#[tokio::test]
async fn test_malformed_submission_gets_error_and_no_broadcast() {
    let (addr, temp_dir, server_handle) = start_test_server(4).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    assert_eq!(reader.next_line().await.unwrap().unwrap(), "CONNECTED");
    assert_eq!(reader.next_line().await.unwrap().unwrap(), "DATA_START");
    assert_eq!(reader.next_line().await.unwrap().unwrap(), CSV_HEADER);
    assert_eq!(reader.next_line().await.unwrap().unwrap(), "DATA_END");

    // two fields instead of three
    write_half.write_all(b"u1|AB12\n").await.unwrap();
    assert_eq!(
        reader.next_line().await.unwrap().unwrap(),
        "ERROR:Invalid format"
    );

    // no log mutation
    let content =
        tokio::fs::read_to_string(temp_dir.path().join("submissions.csv")).await.unwrap();
    assert_eq!(content.lines().count(), 1);

    // session survives the error
    write_half.write_all(b"u1|AB12|450\n").await.unwrap();
    let reply = reader.next_line().await.unwrap().unwrap();
    assert!(reply.starts_with("SUCCESS:"), "got {}", reply);

    server_handle.abort();
}

#[tokio::test]
async fn test_concurrent_submissions_yield_uncorrupted_log() {
    let (addr, temp_dir, server_handle) = start_test_server(4).await;

    let mut handles = vec![];
    for i in 0..4 {
        let addr = addr.to_string();
        handles.push(tokio::spawn(async move {
            let mut client = SubmissionClient::connect(&addr).await.unwrap();
            client.next_snapshot().await.unwrap();
            for j in 0..5 {
                let user = format!("user-{}", i);
                let co2 = format!("{}", 400 + j);
                client.submit(&user, "AB12", &co2).await.unwrap();
            }
            client.disconnect().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    sleep(Duration::from_millis(200)).await;

    let content =
        tokio::fs::read_to_string(temp_dir.path().join("submissions.csv")).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 21); // header + 4 clients * 5 records
    assert_eq!(lines[0], CSV_HEADER);
    for line in &lines[1..] {
        assert_eq!(line.matches(',').count(), 3, "corrupted line: {}", line);
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_broadcast_snapshots_never_regress() {
    let (addr, _temp_dir, server_handle) = start_test_server(4).await;

    // one observer, three submitters racing
    let mut observer = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    observer.next_snapshot().await.unwrap();

    let mut handles = vec![];
    for i in 0..3 {
        let addr = addr.to_string();
        handles.push(tokio::spawn(async move {
            let mut client = SubmissionClient::connect(&addr).await.unwrap();
            client.next_snapshot().await.unwrap();
            for j in 0..5 {
                let user = format!("user-{}", i);
                let co2 = format!("{}", 400 + j);
                client.submit(&user, "AB12", &co2).await.unwrap();
            }
            client.disconnect().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // every submission fans out; the observed log must only ever grow
    let mut previous = 0;
    loop {
        let snapshot = timeout(Duration::from_secs(2), observer.next_snapshot())
            .await
            .unwrap()
            .unwrap();
        assert!(
            snapshot.len() >= previous,
            "snapshot regressed: {} lines after {}",
            snapshot.len(),
            previous
        );
        previous = snapshot.len();
        if previous == 16 {
            break; // header + 3 clients * 5 records
        }
    }

    observer.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_unreadable_log_reports_error_inside_frame() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ServerConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    // a directory passes the existence check but cannot be read or
    // appended to, so every store operation fails
    config.storage.log_path = temp_dir.path().to_path_buf();

    let server = HubServer::new(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_handle = tokio::spawn(server.start());

    // greeting still completes; the failure travels as a framed error
    let mut client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let snapshot = client.next_snapshot().await.unwrap();
    assert_eq!(snapshot, vec!["ERROR:Failed to read server log".to_string()]);

    // persistence failures surface as error replies, session survives
    match client.submit("u1", "AB12", "450").await {
        Err(AirLogError::Client(_)) => {}
        other => panic!("expected persistence error, got {:?}", other.map(|_| ())),
    }

    client.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_fields_needing_csv_escaping_round_trip() {
    let (addr, _temp_dir, server_handle) = start_test_server(4).await;

    let mut client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client.next_snapshot().await.unwrap();

    let timestamp = client.submit("u1", "AB, 12 \"east\"", "450").await.unwrap();
    let snapshot = client.next_snapshot().await.unwrap();

    let last = snapshot.last().unwrap();
    assert_eq!(
        last,
        &format!("u1,{},\"AB, 12 \"\"east\"\"\",450", timestamp)
    );

    client.disconnect().await.unwrap();
    server_handle.abort();
}

#[tokio::test]
async fn test_log_survives_server_restart() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("submissions.csv");

    let mut config = ServerConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config.storage.log_path = log_path.clone();

    // first run: one submission
    let server = HubServer::new(config.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.start());

    let mut client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    client.next_snapshot().await.unwrap();
    let timestamp = client.submit("u1", "AB12", "450").await.unwrap();
    client.next_snapshot().await.unwrap();
    client.disconnect().await.unwrap();
    handle.abort();
    sleep(Duration::from_millis(100)).await;

    // second run over the same file: new client sees the old record
    let server = HubServer::new(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(server.start());

    let mut client = SubmissionClient::connect(&addr.to_string()).await.unwrap();
    let snapshot = client.next_snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1], format!("u1,{},AB12,450", timestamp));

    client.disconnect().await.unwrap();
    handle.abort();
}
