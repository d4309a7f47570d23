use super::*;

#[tokio::test]
async fn test_wait_before_any_run() {
    let (downloader, _client, _server, _temp_dir) = create_test_downloader().await;
    assert_eq!(downloader.wait().await, None);
}

#[tokio::test]
async fn test_wait_returns_run_summary() {
    let (downloader, _client, _server, _temp_dir) = create_test_downloader_with(
        |_| {},
        |c| c.with_latency(Duration::from_millis(50)),
    )
    .await;
    downloader.enqueue([reel("A"), reel("B")]).await;

    let run = downloader.start().await.unwrap();
    let waited = downloader.wait().await.unwrap();
    let joined = run.await.unwrap();

    assert_eq!(waited, joined);
    assert_eq!(waited.succeeded, 2);

    // Still available once the run is over
    assert_eq!(downloader.wait().await, Some(joined));
}

#[tokio::test]
async fn test_wait_from_clone() {
    let (downloader, _client, _server, _temp_dir) = create_test_downloader_with(
        |_| {},
        |c| c.with_latency(Duration::from_millis(50)),
    )
    .await;
    downloader.enqueue([reel("A")]).await;
    let _run = downloader.start().await.unwrap();

    let other = downloader.clone();
    let waiter = tokio::spawn(async move { other.wait().await });

    let summary = waiter.await.unwrap().unwrap();
    assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn test_shutdown_idle_writes_snapshot() {
    let (downloader, _client, _server, _temp_dir) = create_test_downloader().await;
    downloader.enqueue([reel("A"), reel("B")]).await;
    let path = downloader.get_config().persistence.queue_path();
    std::fs::remove_file(&path).unwrap();

    downloader.shutdown().await.unwrap();

    let snapshot = SnapshotStore::new(path);
    assert_eq!(snapshot.load(), vec![reel("A"), reel("B")]);
}

#[tokio::test]
async fn test_shutdown_stops_active_run() {
    let (downloader, client, _server, _temp_dir) = create_test_downloader_with(
        |config| config.download.max_concurrent_downloads = 1,
        |c| c.with_latency(Duration::from_millis(200)),
    )
    .await;
    let mut events = downloader.subscribe();
    downloader.enqueue([reel("A"), reel("B"), reel("C")]).await;
    let run = downloader.start().await.unwrap();

    // Let the first item get going
    loop {
        match events.recv().await.unwrap() {
            Event::ItemStarted { .. } => break,
            _ => continue,
        }
    }

    downloader.shutdown().await.unwrap();
    let summary = run.await.unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.completed, 1);
    assert_eq!(client.calls(), 1);

    let stats = downloader.queue_stats().await;
    assert_eq!(stats.run_state, RunState::Finished);
    assert_eq!(stats.in_flight, 0);

    let snapshot = SnapshotStore::new(downloader.get_config().persistence.queue_path());
    assert_eq!(snapshot.load(), vec![reel("B"), reel("C")]);
}

#[tokio::test]
async fn test_restart_restores_snapshot() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let server = media_server().await;
    let config = test_config(temp_dir.path());

    {
        let client = Arc::new(MockClient::new(&server.uri()));
        let downloader = ReelDownloader::new(config.clone(), client).await.unwrap();
        downloader.enqueue([reel("A"), reel("B")]).await;
        downloader.shutdown().await.unwrap();
    }

    let client = Arc::new(MockClient::new(&server.uri()));
    let downloader = ReelDownloader::new(config, client).await.unwrap();
    assert_eq!(downloader.pending_items().await, vec![reel("A"), reel("B")]);

    let summary = downloader.start().await.unwrap().await.unwrap();
    assert_eq!(summary.succeeded, 2);
}
