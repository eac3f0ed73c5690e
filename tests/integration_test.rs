use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use vod_uploader::config::{LbryConfig, RumbleConfig, ThumbnailConfig};
use vod_uploader::core::{MemoryRecordSink, ProgressLabels, UploadRatioGauge};
use vod_uploader::{
    Hooks, LbryUploader, RumbleUploader, Services, UploadError, UploadManager, UploadOutcome,
    Uploader, Vod,
};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

struct Harness {
    sink: Arc<MemoryRecordSink>,
    gauge: Arc<UploadRatioGauge>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            sink: Arc::new(MemoryRecordSink::new()),
            gauge: Arc::new(UploadRatioGauge::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn hooks(&self) -> Hooks {
        let progress = self.events.clone();
        let insert = self.events.clone();
        let finish = self.events.clone();
        Hooks::new()
            .on_progress(move |percent| {
                progress.lock().unwrap().push(format!("progress {percent}"));
                Ok(())
            })
            .on_insert(move |vod, success| {
                insert.lock().unwrap().push(format!("insert {} {success}", vod.id));
                Ok(())
            })
            .on_finish(move |vod, success| {
                finish.lock().unwrap().push(format!("finish {} {success}", vod.id));
                Ok(())
            })
    }

    fn services(&self) -> Services {
        Services {
            sink: self.sink.clone(),
            gauge: self.gauge.clone(),
            hooks: self.hooks(),
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

fn vod(path: &str) -> Vod {
    Vod {
        id: "abc".to_string(),
        platform: "youtube".to_string(),
        title: "Stream".to_string(),
        start_time: "2024-01-01T00:00:00Z".to_string(),
        end_time: String::new(),
        duration: 90,
        path: path.to_string(),
        thumbnail_path: "/nonexistent/abc.jpg".to_string(),
        thumbnail: "https://i.ytimg.com/vi/abc/0.jpg".to_string(),
    }
}

// Daemon mock

#[derive(Clone, Copy)]
enum CdnReply {
    Success,
    Status(u16),
    Rejected,
}

struct DaemonMock {
    progress: Vec<i64>,
    polls: AtomicUsize,
    delete_result: bool,
    publish_response: Option<Value>,
    file_list_items: usize,
    cdn: CdnReply,
    requests: Mutex<Vec<Value>>,
}

impl DaemonMock {
    fn new(progress: Vec<i64>, delete_result: bool) -> Arc<Self> {
        Arc::new(Self::build(progress, delete_result))
    }

    fn build(progress: Vec<i64>, delete_result: bool) -> Self {
        Self {
            progress,
            polls: AtomicUsize::new(0),
            delete_result,
            publish_response: None,
            file_list_items: 1,
            cdn: CdnReply::Success,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers `publish` with `response` instead of a good claim.
    fn publishing(response: Value) -> Arc<Self> {
        Arc::new(Self {
            publish_response: Some(response),
            ..Self::build(Vec::new(), true)
        })
    }

    /// Lists `items` files for the claim on every poll.
    fn listing(items: usize) -> Arc<Self> {
        Arc::new(Self {
            file_list_items: items,
            ..Self::build(vec![100], true)
        })
    }

    fn with_cdn(cdn: CdnReply) -> Arc<Self> {
        Arc::new(Self {
            cdn,
            ..Self::build(vec![100], true)
        })
    }

    fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn published_thumbnail(&self) -> Value {
        self.requests.lock().unwrap()[0]["params"]["thumbnail_url"].clone()
    }
}

async fn daemon(State(mock): State<Arc<DaemonMock>>, Json(request): Json<Value>) -> Json<Value> {
    mock.requests.lock().unwrap().push(request.clone());

    let response = match request["method"].as_str().unwrap_or_default() {
        "publish" => match &mock.publish_response {
            Some(response) => response.clone(),
            None => json!({"result": {"outputs": [
                {"claim_id": "", "name": "support"},
                {
                    "claim_id": "claim1",
                    "name": "abc-r-youtube1",
                    "normalized_name": "abc-r-youtube1",
                    "permanent_url": "lbry://abc-r-youtube1#claim1"
                }
            ]}}),
        },
        "file_list" => {
            let poll = mock.polls.fetch_add(1, Ordering::SeqCst);
            let progress = mock.progress.get(poll).copied().unwrap_or(100);
            let item = json!({
                "uploading_to_reflector": progress < 100,
                "is_fully_reflected": progress == 100,
                "reflector_progress": progress
            });
            json!({"result": {"items": vec![item; mock.file_list_items]}})
        }
        "file_delete" => json!({"result": mock.delete_result}),
        "blob_clean" => json!({"result": true}),
        _ => json!({"error": {"code": -32601, "message": "unknown method"}}),
    };

    Json(response)
}

async fn thumbnail_cdn(State(mock): State<Arc<DaemonMock>>, _body: Bytes) -> axum::response::Response {
    match mock.cdn {
        CdnReply::Success => Json(json!({
            "url": "https://thumbs.odycdn.com/abc.webp",
            "file_name": "abc.webp",
            "type": "success",
            "message": ""
        }))
        .into_response(),
        CdnReply::Status(code) => {
            let status = axum::http::StatusCode::from_u16(code).unwrap();
            (status, "upstream unavailable").into_response()
        }
        CdnReply::Rejected => Json(json!({
            "url": "",
            "type": "error",
            "message": "unsupported image"
        }))
        .into_response(),
    }
}

async fn lbry_uploader(mock: Arc<DaemonMock>, services: Services) -> LbryUploader {
    let base = spawn(
        Router::new()
            .route("/", post(daemon))
            .route("/thumbs", post(thumbnail_cdn))
            .with_state(mock),
    )
    .await;

    let config = LbryConfig {
        enabled: true,
        uri: format!("{base}/"),
        author: "Archiver".to_string(),
        channel_name: "@archive".to_string(),
        poll_interval: Duration::from_millis(10),
    };
    let thumbnail = ThumbnailConfig {
        endpoint: format!("{base}/thumbs"),
        timeout: Duration::from_secs(5),
    };
    LbryUploader::new(&config, &thumbnail, services).unwrap()
}

fn labels() -> ProgressLabels {
    ProgressLabels {
        id: "abc".to_string(),
        channel_name: "@archive".to_string(),
        vod_title: "Stream".to_string(),
    }
}

fn vod_with_thumbnail(dir: &std::path::Path) -> Vod {
    let thumbnail = dir.join("abc.jpg");
    std::fs::write(&thumbnail, b"\xff\xd8\xff\xe0 not really a jpeg").unwrap();

    let mut vod = vod("/vods/abc.mp4");
    vod.thumbnail_path = thumbnail.to_string_lossy().to_string();
    vod
}

#[tokio::test]
async fn test_lbry_publish_monitor_cleanup() {
    let harness = Harness::new();
    let mock = DaemonMock::new(vec![40, 100], true);
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let outcome = uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.identifiers, vec!["claim1", "lbry://abc-r-youtube1#claim1"]);
    assert_eq!(
        mock.methods(),
        vec!["publish", "file_list", "file_list", "file_delete"]
    );

    let requests = mock.requests.lock().unwrap().clone();
    let publish = &requests[0]["params"];
    assert_eq!(publish["title"], "[youtube:abc] Stream");
    assert_eq!(publish["description"], "2024-01-01T00:00:00Z\n2024-01-01T00:01:30Z");
    assert_eq!(publish["thumbnail_url"], "https://i.ytimg.com/vi/abc/0.jpg");
    assert_eq!(publish["wallet_id"], "default_wallet");
    assert_eq!(requests[1]["params"]["claim_id"], "claim1");

    assert_eq!(harness.gauge.get(&labels()), Some(100.0));
    assert_eq!(
        harness.events(),
        vec!["progress 40", "progress 100", "insert abc true"]
    );

    let records = harness.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].hosting_platform, "lbry");
    assert_eq!(records[0].hosting_channel, "@archive");
    assert_eq!(records[0].hosting_name, "abc-r-youtube1");
    assert_eq!(records[0].hosting_url, "lbry://abc-r-youtube1#claim1");
    assert_eq!(records[0].hosting_additional_info, br#"{"Claim":"claim1"}"#.to_vec());
    assert_eq!(records[0].vod.end_time, "2024-01-01T00:01:30Z");
}

#[tokio::test]
async fn test_lbry_gauge_tracks_each_poll() {
    let gauge = Arc::new(UploadRatioGauge::new());
    let readings = Arc::new(Mutex::new(Vec::new()));

    let observed = gauge.clone();
    let seen = readings.clone();
    let services = Services {
        sink: Arc::new(MemoryRecordSink::new()),
        gauge: gauge.clone(),
        hooks: Hooks::new().on_progress(move |percent| {
            seen.lock().unwrap().push((percent, observed.get(&labels())));
            Ok(())
        }),
    };

    let mock = DaemonMock::new(vec![40, 75, 100], true);
    let uploader = lbry_uploader(mock, services).await;
    uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap();

    assert_eq!(
        *readings.lock().unwrap(),
        vec![(40, Some(40.0)), (75, Some(75.0)), (100, Some(100.0))]
    );
}

#[tokio::test]
async fn test_lbry_relays_thumbnail() {
    let harness = Harness::new();
    let mock = DaemonMock::new(vec![100], true);
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let dir = tempfile::tempdir().unwrap();
    uploader
        .upload(&CancellationToken::new(), &vod_with_thumbnail(dir.path()))
        .await
        .unwrap();

    assert_eq!(mock.published_thumbnail(), "https://thumbs.odycdn.com/abc.webp");
}

#[tokio::test]
async fn test_lbry_thumbnail_falls_back_on_cdn_error_status() {
    let harness = Harness::new();
    let mock = DaemonMock::with_cdn(CdnReply::Status(502));
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = uploader
        .upload(&CancellationToken::new(), &vod_with_thumbnail(dir.path()))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(mock.published_thumbnail(), "https://i.ytimg.com/vi/abc/0.jpg");
}

#[tokio::test]
async fn test_lbry_thumbnail_falls_back_when_cdn_rejects() {
    let harness = Harness::new();
    let mock = DaemonMock::with_cdn(CdnReply::Rejected);
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = uploader
        .upload(&CancellationToken::new(), &vod_with_thumbnail(dir.path()))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(mock.published_thumbnail(), "https://i.ytimg.com/vi/abc/0.jpg");
}

#[tokio::test]
async fn test_lbry_cleans_blobs_when_delete_keeps_file() {
    let harness = Harness::new();
    let mock = DaemonMock::new(vec![100], false);
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let outcome = uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(
        mock.methods(),
        vec!["publish", "file_list", "file_delete", "blob_clean"]
    );
    assert_eq!(harness.sink.records().await.len(), 1);
}

#[tokio::test]
async fn test_lbry_daemon_error_fails_upload() {
    let harness = Harness::new();
    let mock = DaemonMock::publishing(json!({
        "result": null,
        "error": {"code": -32500, "data": null, "message": "insufficient funds"}
    }));
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let err = uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Daemon { code: -32500, .. }));
    assert_eq!(mock.methods(), vec!["publish"]);
    assert!(harness.sink.records().await.is_empty());
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_lbry_empty_outputs_fail_upload() {
    let harness = Harness::new();
    let mock = DaemonMock::publishing(json!({"result": {"outputs": []}}));
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let err = uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::NoOutputs));
    assert_eq!(mock.methods(), vec!["publish"]);
    assert!(harness.sink.records().await.is_empty());
}

#[tokio::test]
async fn test_lbry_outputs_without_claim_fail_upload() {
    let harness = Harness::new();
    let mock = DaemonMock::publishing(json!({"result": {"outputs": [
        {"claim_id": "", "name": "support"},
        {"claim_id": "", "name": "fee"}
    ]}}));
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let err = uploader
        .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::NoClaim));
    assert_eq!(mock.methods(), vec!["publish"]);
    assert!(harness.sink.records().await.is_empty());
}

#[tokio::test]
async fn test_lbry_claim_must_list_one_file() {
    for items in [0, 2] {
        let harness = Harness::new();
        let mock = DaemonMock::listing(items);
        let uploader = lbry_uploader(mock.clone(), harness.services()).await;

        let err = uploader
            .upload(&CancellationToken::new(), &vod("/vods/abc.mp4"))
            .await
            .unwrap_err();

        match err {
            UploadError::ClaimNotFound { claim, count } => {
                assert_eq!(claim, "claim1");
                assert_eq!(count, items);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(mock.methods(), vec!["publish", "file_list"]);
        assert!(harness.events().is_empty());
        assert!(harness.sink.records().await.is_empty());
    }
}

#[tokio::test]
async fn test_lbry_cancelled_while_monitoring() {
    let harness = Harness::new();
    // never reaches 100 on its own
    let mock = DaemonMock::new(vec![10; 10_000], true);
    let uploader = lbry_uploader(mock.clone(), harness.services()).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = uploader.upload(&cancel, &vod("/vods/abc.mp4")).await.unwrap_err();
    assert!(matches!(err, UploadError::Cancelled));
    assert!(!mock.methods().contains(&"file_delete".to_string()));
    assert!(harness.sink.records().await.is_empty());
}

// Web upload mock

const LOGIN_HASHES: &str = "b4272c38474c3cdbde00d00d0ecc47c5,30b83de3ed308d3eb6804e9825f1749e,salt1";
const COMMIT_PAGE: &str = r#"<div>Uploaded! <a href="https://rumble.com/v4abc-stream.html">watch</a>
<textarea><iframe src="https://rumble.com/embed/v4xyz/?pub=4"></iframe></textarea>
<a href="https://rumble.com/v9other.html">other</a></div>"#;

#[derive(Debug, Clone)]
struct Hit {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    body: Bytes,
    cookie: Option<String>,
}

#[derive(Default)]
struct WebMock {
    logged_in: Mutex<bool>,
    hits: Mutex<Vec<Hit>>,
}

impl WebMock {
    fn record(&self, method: Method, path: &str, query: HashMap<String, String>, headers: &HeaderMap, body: Bytes) {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.hits.lock().unwrap().push(Hit {
            method,
            path: path.to_string(),
            query,
            body,
            cookie,
        });
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    fn hits_on(&self, path: &str) -> Vec<Hit> {
        self.hits().into_iter().filter(|h| h.path == path).collect()
    }
}

async fn browse(State(mock): State<Arc<WebMock>>, headers: HeaderMap) -> String {
    mock.record(Method::GET, "/browse", HashMap::new(), &headers, Bytes::new());
    let logged_in = *mock.logged_in.lock().unwrap();
    format!(
        r#"<html><body><script>Rumble.init({{username:"archiver",logged_in:{logged_in}}});</script></body></html>"#
    )
}

async fn service(
    State(mock): State<Arc<WebMock>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    mock.record(Method::POST, "/service.php", query.clone(), &headers, body.clone());
    let form: HashMap<String, String> = url::form_urlencoded::parse(&body).into_owned().collect();

    match query.get("name").map(String::as_str) {
        Some("user.get_salts") => (
            [(header::SET_COOKIE, "visit=1; Path=/")],
            Json(json!({"data": {"salts": ["salt0", "salt1", "salt2"]}})),
        )
            .into_response(),
        Some("user.login") if form.get("password_hashes").map(String::as_str) == Some(LOGIN_HASHES) => {
            *mock.logged_in.lock().unwrap() = true;
            (
                [(header::SET_COOKIE, "u_s=session1; Path=/")],
                Json(json!({"user": {"logged_in": true}})),
            )
                .into_response()
        }
        _ => (axum::http::StatusCode::FORBIDDEN, "bad login").into_response(),
    }
}

async fn upload_page(State(mock): State<Arc<WebMock>>, headers: HeaderMap) -> String {
    mock.record(Method::GET, "/upload.php", HashMap::new(), &headers, Bytes::new());
    r#"<form><input type="hidden" id="upload_server" value="web17"></form>"#.to_string()
}

async fn upload_server(
    State(mock): State<Arc<WebMock>>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> String {
    mock.record(method.clone(), "/web17/upload.php", query.clone(), &headers, body);

    if query.contains_key("duration") {
        "5400.5".to_string()
    } else if query.contains_key("thumbnails") {
        json!({"thumb_b": "https://sp.rmbl.ws/b.jpg", "thumb_a": "https://sp.rmbl.ws/a.jpg"}).to_string()
    } else if query.contains_key("form") {
        COMMIT_PAGE.to_string()
    } else if query.contains_key("merge") {
        "merged-0a1b2c.mp4\n".to_string()
    } else if method == Method::PUT {
        String::new()
    } else {
        "single-0a1b2c.mp4".to_string()
    }
}

async fn rumble_uploader(
    mock: Arc<WebMock>,
    services: Services,
    cookie_file: &std::path::Path,
) -> RumbleUploader {
    let base = spawn(
        Router::new()
            .route("/browse", get(browse))
            .route("/service.php", post(service))
            .route("/upload.php", get(upload_page))
            .route("/web17/upload.php", any(upload_server))
            .layer(DefaultBodyLimit::disable())
            .with_state(mock),
    )
    .await;

    let config = RumbleConfig {
        enabled: true,
        login: "archiver".to_string(),
        password: "hunter2".to_string(),
        base_url: base.clone(),
        upload_server_template: format!("{base}/{{server}}/upload.php"),
        cookie_file: cookie_file.to_path_buf(),
    };
    RumbleUploader::new(&config, services).unwrap()
}

fn form_of(hit: &Hit) -> HashMap<String, String> {
    url::form_urlencoded::parse(&hit.body).into_owned().collect()
}

#[tokio::test]
async fn test_rumble_login_and_single_upload() {
    let harness = Harness::new();
    let mock = Arc::new(WebMock::default());
    let dir = tempfile::tempdir().unwrap();
    let cookie_file = dir.path().join("cookiejar.json");
    let uploader = rumble_uploader(mock.clone(), harness.services(), &cookie_file).await;

    let video = dir.path().join("abc.mp4");
    std::fs::write(&video, vec![7u8; 1_000]).unwrap();

    let outcome = uploader
        .upload(&CancellationToken::new(), &vod(&video.to_string_lossy()))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(
        outcome.identifiers,
        vec!["https://rumble.com/v4abc-stream.html", "https://rumble.com/embed/v4xyz/"]
    );

    // salts, then login with the derived hashes
    let service = mock.hits_on("/service.php");
    assert_eq!(service.len(), 2);
    assert_eq!(form_of(&service[0])["username"], "archiver");
    assert_eq!(form_of(&service[1])["password_hashes"], LOGIN_HASHES);

    // session cookie is sent on later requests and saved to disk
    let page = &mock.hits_on("/upload.php")[0];
    assert!(page.cookie.as_deref().unwrap_or_default().contains("u_s=session1"));
    let saved = std::fs::read_to_string(&cookie_file).unwrap();
    assert!(saved.contains("user.login"));
    assert!(saved.contains("session1"));

    let upload = mock.hits_on("/web17/upload.php");
    let methods: Vec<_> = upload.iter().map(|h| h.method.clone()).collect();
    assert_eq!(methods, vec![Method::POST, Method::GET, Method::GET, Method::POST]);
    assert_eq!(upload[0].query["api"], "1.3");
    assert!(String::from_utf8_lossy(&upload[0].body).contains("name=\"Filedata\""));
    assert_eq!(upload[1].query["duration"], "single-0a1b2c.mp4");
    assert_eq!(upload[2].query["thumbnails"], "single-0a1b2c.mp4");

    let form = form_of(&upload[3]);
    assert_eq!(upload[3].query["form"], "1");
    assert_eq!(form["title"], "[youtube:abc] Stream");
    assert_eq!(form["description"], "2024-01-01T00:00:00Z\n2024-01-01T00:01:30Z");
    assert_eq!(form["video[]"], "single-0a1b2c.mp4");
    assert_eq!(form["thumb"], "thumb_a");
    assert_eq!(form["visibility"], "private");
    assert_eq!(form["sideChannelId"], "15");
    let meta: Value = serde_json::from_str(&form["file_meta"]).unwrap();
    assert_eq!(meta["name"], "abc.mp4");
    assert_eq!(meta["size"], 1_000);
    assert_eq!(meta["num_chunks"], 1);
    assert_eq!(meta["type"], "video/mp4");

    let records = harness.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].hosting_platform, "rumble");
    assert_eq!(records[0].hosting_channel, "archiver");
    assert_eq!(
        records[0].hosting_url,
        "https://rumble.com/v4abc-stream.html https://rumble.com/embed/v4xyz/"
    );
    assert_eq!(harness.events(), vec!["insert abc true"]);
}

#[tokio::test]
async fn test_rumble_chunked_upload_skips_login() {
    let harness = Harness::new();
    let mock = Arc::new(WebMock::default());
    *mock.logged_in.lock().unwrap() = true;
    let dir = tempfile::tempdir().unwrap();
    let uploader =
        rumble_uploader(mock.clone(), harness.services(), &dir.path().join("cookiejar.json")).await;

    let video = dir.path().join("abc.mp4");
    std::fs::File::create(&video).unwrap().set_len(12_000_000).unwrap();

    let mut vod = vod(&video.to_string_lossy());
    vod.title = "a very long stream title ".repeat(8);
    uploader.upload(&CancellationToken::new(), &vod).await.unwrap();

    assert!(mock.hits_on("/service.php").is_empty());

    let upload = mock.hits_on("/web17/upload.php");
    let puts: Vec<_> = upload.iter().filter(|h| h.method == Method::PUT).collect();
    assert_eq!(puts.len(), 2);

    let base = puts[0].query["chunk"].trim_start_matches("0_").to_string();
    assert!(base.ends_with(".mp4"));
    assert_eq!(puts[1].query["chunk"], format!("1_{base}"));
    for put in &puts {
        assert_eq!(put.query["chunkSz"], "5000000");
        assert_eq!(put.query["chunkQty"], "2");
    }
    // last chunk carries the remainder
    assert_eq!(puts[0].body.len(), 5_000_000);
    assert_eq!(puts[1].body.len(), 7_000_000);

    let merges: Vec<_> = upload.iter().filter(|h| h.query.contains_key("merge")).collect();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].query["merge"], "1");
    assert_eq!(merges[0].query["chunk"], base);

    let commit = upload.iter().find(|h| h.query.contains_key("form")).unwrap();
    let form = form_of(commit);
    assert_eq!(form["video[]"], "merged-0a1b2c.mp4");
    assert!(form["title"].chars().count() <= 99);
    assert!(form["title"].starts_with("[youtube:abc] a very long"));
    let meta: Value = serde_json::from_str(&form["file_meta"]).unwrap();
    assert_eq!(meta["num_chunks"], 2);
    assert_eq!(meta["size"], 12_000_000);
}

#[tokio::test]
async fn test_rumble_missing_upload_server() {
    let harness = Harness::new();
    let mock = Arc::new(WebMock::default());
    *mock.logged_in.lock().unwrap() = true;
    let dir = tempfile::tempdir().unwrap();

    let base = spawn(
        Router::new()
            .route("/browse", get(browse))
            .route("/upload.php", get(|| async { "<form>maintenance</form>" }))
            .with_state(mock.clone()),
    )
    .await;
    let config = RumbleConfig {
        base_url: base,
        cookie_file: dir.path().join("cookiejar.json"),
        ..Default::default()
    };
    let uploader = RumbleUploader::new(&config, harness.services()).unwrap();

    let video = dir.path().join("abc.mp4");
    std::fs::write(&video, b"tiny").unwrap();

    let err = uploader
        .upload(&CancellationToken::new(), &vod(&video.to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NoUploadServer));
    assert!(harness.sink.records().await.is_empty());
}

// Orchestration

struct RecordingUploader {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Uploader for RecordingUploader {
    fn name(&self) -> &str {
        "recording"
    }

    async fn upload(&self, _cancel: &CancellationToken, vod: &Vod) -> vod_uploader::Result<UploadOutcome> {
        self.calls.lock().unwrap().push(vod.id.clone());
        Ok(UploadOutcome::succeeded("recording", vec![vod.id.clone()]))
    }
}

#[tokio::test]
async fn test_oversize_file_fails_only_its_destination() {
    let harness = Harness::new();
    let mock = Arc::new(WebMock::default());
    let dir = tempfile::tempdir().unwrap();
    let rumble = rumble_uploader(mock.clone(), harness.services(), &dir.path().join("cookiejar.json")).await;

    let video = dir.path().join("huge.mp4");
    std::fs::File::create(&video).unwrap().set_len(15_000_000_001).unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let manager = UploadManager::new(
        vec![
            Arc::new(rumble),
            Arc::new(RecordingUploader { calls: calls.clone() }),
        ],
        harness.hooks(),
    )
    .with_destination_delay(Duration::from_millis(5));

    let outcomes = manager
        .process(&CancellationToken::new(), &vod(&video.to_string_lossy()))
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].destination, "rumble");
    assert!(!outcomes[0].success);
    assert!(outcomes[0].error.as_deref().unwrap().starts_with("File too large"));
    assert!(outcomes[1].success);

    assert!(mock.hits().is_empty());
    assert_eq!(*calls.lock().unwrap(), vec!["abc"]);
    assert_eq!(harness.events(), vec!["finish abc false", "finish abc true"]);
}

#[tokio::test]
async fn test_manager_runs_lbry_then_rumble() {
    let harness = Harness::new();
    let daemon = DaemonMock::new(vec![100], true);
    let web = Arc::new(WebMock::default());
    *web.logged_in.lock().unwrap() = true;
    let dir = tempfile::tempdir().unwrap();

    let lbry = lbry_uploader(daemon.clone(), harness.services()).await;
    let rumble = rumble_uploader(web.clone(), harness.services(), &dir.path().join("cookiejar.json")).await;

    let video = dir.path().join("abc.mp4");
    std::fs::write(&video, vec![1u8; 2_048]).unwrap();

    let manager = UploadManager::new(vec![Arc::new(lbry), Arc::new(rumble)], harness.hooks())
        .with_destination_delay(Duration::from_millis(5));
    assert_eq!(manager.destinations(), vec!["lbry", "rumble"]);

    let outcomes = manager
        .process(&CancellationToken::new(), &vod(&video.to_string_lossy()))
        .await;

    assert!(outcomes.iter().all(|o| o.success));
    let platforms: Vec<_> = harness
        .sink
        .records()
        .await
        .into_iter()
        .map(|r| r.hosting_platform)
        .collect();
    assert_eq!(platforms, vec!["lbry", "rumble"]);
    assert_eq!(
        harness.events(),
        vec![
            "progress 100",
            "insert abc true",
            "insert abc true",
            "finish abc true",
            "finish abc true",
        ]
    );
}
