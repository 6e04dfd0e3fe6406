//! End-to-end crawl tests against a local HTTP stub server.

use async_trait::async_trait;
use iawic::core::config::{IawicConfig, RenderMode};
use iawic::core::engine::CrawlEngine;
use iawic::core::page::PageRecord;
use iawic::scraping::renderer::{PageRenderer, RenderRequest, RenderResult};
use iawic::storage::PageSink;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

type Routes = Arc<HashMap<String, (u16, String)>>;

/// Minimal HTTP/1.1 responder: one request per connection, fixed routes.
async fn serve(routes: Routes) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                let (status, body) = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, "<html><body>not found</body></html>".to_string()));
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    429 => "Too Many Requests",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

fn routes(entries: &[(&str, u16, &str)]) -> Routes {
    Arc::new(
        entries
            .iter()
            .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
            .collect(),
    )
}

struct CollectSink {
    pages: Mutex<Vec<PageRecord>>,
}

impl CollectSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PageSink for CollectSink {
    fn name(&self) -> &str {
        "collect"
    }

    async fn save_page(&self, page: &PageRecord) -> anyhow::Result<()> {
        self.pages.lock().await.push(page.clone());
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FailingRenderer {
    invoked: AtomicBool,
}

#[async_trait]
impl PageRenderer for FailingRenderer {
    async fn render(&self, request: RenderRequest) -> RenderResult {
        self.invoked.store(true, Ordering::SeqCst);
        RenderResult {
            url: request.url.clone(),
            final_url: request.url,
            error: Some("browser unavailable".to_string()),
            ..Default::default()
        }
    }

    async fn close(&self) {}
}

fn test_config(seed: &str) -> IawicConfig {
    let mut config = IawicConfig::default();
    config.crawl.url = seed.to_string();
    config.crawl.requests_per_second = 50.0;
    config.crawl.min_delay = 0.01;
    config.crawl.max_delay = 0.05;
    config.crawl.page_timeout = 5;
    config.crawl.render_mode = RenderMode::Static;
    config.crawl.respect_robots_txt = false;
    config.crawl.enable_dedup = false;
    config.workers = 2;
    config
}

#[tokio::test]
async fn test_crawl_respects_depth_limit() {
    let addr = serve(routes(&[
        ("/", 200, r#"<html><body><a href="/p1">p1</a></body></html>"#),
        ("/p1", 200, r#"<html><body><a href="/p2">p2</a></body></html>"#),
        ("/p2", 200, "<html><body>too deep</body></html>"),
    ]))
    .await;
    let seed = format!("http://{addr}/");

    let mut config = test_config(&seed);
    config.crawl.crawl_depth = 1;

    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(config)
            .unwrap()
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    assert_eq!(summary.pages_crawled, 2);
    assert!(engine.frontier().is_crawled(&seed).await);
    assert!(
        engine
            .frontier()
            .is_crawled(&format!("http://{addr}/p1"))
            .await
    );
    // Depth 2 never enters the frontier.
    assert!(
        !engine
            .frontier()
            .is_seen(&format!("http://{addr}/p2"))
            .await
    );
}

#[tokio::test]
async fn test_duplicate_urls_enqueued_once() {
    let addr = serve(routes(&[
        (
            "/",
            200,
            r#"<html><body>
                <a href="/x">one</a>
                <a href="/x?utm_campaign=k">two</a>
                <a href="/x#h">three</a>
            </body></html>"#,
        ),
        ("/x", 200, "<html><body>the x page</body></html>"),
    ]))
    .await;
    let seed = format!("http://{addr}/");

    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(test_config(&seed))
            .unwrap()
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    // Seed plus the one canonical /x; the two variants are duplicates.
    assert_eq!(summary.frontier.total_added, 2);
    assert_eq!(summary.pages_crawled, 2);
}

#[tokio::test]
async fn test_robots_disallow_drops_url() {
    let addr = serve(routes(&[
        ("/robots.txt", 200, "User-agent: *\nDisallow: /private"),
        (
            "/",
            200,
            r#"<html><body><a href="/private/x">secret</a><a href="/public">open</a></body></html>"#,
        ),
        ("/public", 200, "<html><body>public page</body></html>"),
        ("/private/x", 200, "<html><body>should never fetch</body></html>"),
    ]))
    .await;
    let seed = format!("http://{addr}/");

    let mut config = test_config(&seed);
    config.crawl.respect_robots_txt = true;

    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(config)
            .unwrap()
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(summary.robots_denied, 1);
    let saved = sink.pages.lock().await;
    assert!(saved.iter().all(|p| !p.url.contains("/private")));
}

#[tokio::test]
async fn test_auto_render_falls_back_to_static_html() {
    // Short body without any anchor: auto mode decides JS rendering is
    // needed; the stub renderer fails and static HTML must survive.
    let addr = serve(routes(&[(
        "/",
        200,
        r#"<html><body><div id="app">Loading shell</div></body></html>"#,
    )]))
    .await;
    let seed = format!("http://{addr}/");

    let mut config = test_config(&seed);
    config.crawl.render_mode = RenderMode::Auto;

    let renderer = Arc::new(FailingRenderer {
        invoked: AtomicBool::new(false),
    });
    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(config)
            .unwrap()
            .with_renderer(renderer.clone() as Arc<dyn PageRenderer>)
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    assert!(renderer.invoked.load(Ordering::SeqCst));
    assert_eq!(summary.pages_crawled, 1);

    let saved = sink.pages.lock().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].status, 200);
    assert!(saved[0].text_content.contains("Loading shell"));
}

#[tokio::test]
async fn test_dedup_gates_sink_writes() {
    let filler = "shared body text that is comfortably long enough to fingerprint and compare across pages. "
        .repeat(5);
    let page = format!("<html><body><p>{filler}</p></body></html>");
    let index = r#"<html><body><a href="/a">a</a><a href="/b">b</a></body></html>"#.to_string();

    let routes: Routes = Arc::new(HashMap::from([
        ("/".to_string(), (200u16, index)),
        ("/a".to_string(), (200u16, page.clone())),
        ("/b".to_string(), (200u16, page)),
    ]));
    let addr = serve(routes).await;
    let seed = format!("http://{addr}/");

    let mut config = test_config(&seed);
    config.crawl.enable_dedup = true;
    // Serialize fetches so /a is stored before /b is checked.
    config.workers = 1;

    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(config)
            .unwrap()
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    assert_eq!(summary.pages_crawled, 3);
    assert_eq!(summary.duplicates_skipped, 1);
    // The duplicate page is crawled but not saved.
    assert_eq!(sink.pages.lock().await.len(), 2);
}

#[tokio::test]
async fn test_failed_fetches_are_terminal_after_retries() {
    let addr = serve(routes(&[(
        "/",
        200,
        r#"<html><body><a href="/missing">gone</a></body></html>"#,
    )]))
    .await;
    let seed = format!("http://{addr}/");

    let sink = CollectSink::new();
    let engine = Arc::new(
        CrawlEngine::new(test_config(&seed))
            .unwrap()
            .with_sink(sink.clone() as Arc<dyn PageSink>),
    );
    let summary = Arc::clone(&engine).start(&seed).await.unwrap();

    assert_eq!(summary.pages_crawled, 1);
    // /missing 404s on every attempt: initial try plus retries, then terminal.
    assert_eq!(summary.pages_failed, 3);
}
