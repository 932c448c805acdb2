//! End-to-end link preview tests
//!
//! Runs the previewer against a throwaway HTTP server on localhost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use linkpool::cache::CacheConfig;
use linkpool::link::HttpConfig;
use linkpool::pool::PoolConfig;
use linkpool::preview::LinkPreviewer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Minimal HTTP/1.1 server: `/slow*` answers after a delay, `/missing` is 404,
/// everything else is a small HTML page. Counts requests per server.
async fn spawn_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let _ = serve(stream, counter).await;
            });
        }
    });

    (base, hits)
}

async fn serve(mut stream: TcpStream, hits: Arc<AtomicUsize>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    hits.fetch_add(1, Ordering::SeqCst);

    let text = String::from_utf8_lossy(&request);
    let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();

    if path.starts_with("/slow") {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    let response = if path.starts_with("/missing") {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    } else {
        let body = "<html></html>";
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn previewer(max_concurrency: usize, cache_enabled: bool) -> LinkPreviewer {
    let cache = CacheConfig {
        enabled: cache_enabled,
        ..Default::default()
    };
    LinkPreviewer::new(PoolConfig::new(max_concurrency), HttpConfig::default(), &cache).unwrap()
}

#[tokio::test]
async fn test_preview_reports_headers() {
    let (base, _) = spawn_server().await;
    let previewer = previewer(2, false);

    let metadata = previewer.preview(&format!("{base}/page")).await.unwrap().unwrap();

    assert_eq!(metadata.status, 200);
    assert_eq!(metadata.content_type.as_deref(), Some("text/html"));
    assert_eq!(metadata.content_length, Some(13));
    assert_eq!(metadata.url, format!("{base}/page"));
}

#[tokio::test]
async fn test_failed_fetch_yields_none() {
    let (base, _) = spawn_server().await;
    let previewer = previewer(2, true);

    let result = previewer.preview(&format!("{base}/missing")).await.unwrap();

    assert!(result.is_none());
    assert!(previewer.cache().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicates_share_one_request() {
    let (base, hits) = spawn_server().await;
    let previewer = previewer(2, false);
    let url = format!("{base}/slow");

    let url_again = format!("{url}#again");
    let (first, second) = tokio::join!(previewer.preview(&url), previewer.preview(&url_again));

    assert_eq!(first.unwrap().map(|m| m.status), Some(200));
    assert_eq!(second.unwrap().map(|m| m.status), Some(200));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let stats = previewer.snapshot().await.unwrap().stats;
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.deduplicated, 1);
}

#[tokio::test]
async fn test_cached_result_skips_network() {
    let (base, hits) = spawn_server().await;
    let previewer = previewer(2, true);
    let url = format!("{base}/page");

    previewer.preview(&url).await.unwrap().unwrap();
    previewer.preview(&url).await.unwrap().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(previewer.cache().unwrap().len(), 1);
}

#[tokio::test]
async fn test_preempted_request_still_resolves() {
    let (base, _) = spawn_server().await;
    let previewer = previewer(1, false);

    let older = format!("{base}/slow?n=1");
    let newer = format!("{base}/slow?n=2");
    let (a, b) = tokio::join!(previewer.preview(&older), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        previewer.preview(&newer).await
    });

    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    let stats = previewer.snapshot().await.unwrap().stats;
    assert_eq!(stats.preempted, 1);
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn test_cancel_resolves_preview_to_none() {
    let (base, _) = spawn_server().await;
    let previewer = previewer(1, false);
    let url = format!("{base}/slow");

    let (result, _) = tokio::join!(previewer.preview(&url), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        previewer.cancel(&url).unwrap();
    });

    assert!(result.unwrap().is_none());
    let snapshot = previewer.snapshot().await.unwrap();
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.stats.canceled, 1);
}

#[tokio::test]
async fn test_shutdown_rejects_new_requests() {
    let previewer = previewer(1, false);
    previewer.shutdown().await.unwrap();

    assert!(previewer.preview("http://127.0.0.1:9/").await.is_err());
}
