//! In-process upstream server for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use ckan_mirror::cache::parse_http_date;

pub const T0: &str = "Tue, 20 Oct 2015 07:28:00 GMT";
pub const T1: &str = "Wed, 21 Oct 2015 07:28:00 GMT";
pub const T2: &str = "Thu, 22 Oct 2015 07:28:00 GMT";

/// An artifact served under `/files/<name>`
#[derive(Clone)]
pub struct Artifact {
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
    /// Non-200 status to fail with
    pub status: u16,
    /// Answer 304 to a matching `If-Modified-Since`
    pub honor_if_modified_since: bool,
    /// Only the first this many requests fail with `status`; 0 means all of them
    pub fail_first: usize,
    /// Wait before answering
    pub delay: Option<Duration>,
}

impl Artifact {
    pub fn new(body: &[u8], last_modified: Option<&str>) -> Self {
        Self {
            body: body.to_vec(),
            last_modified: last_modified.map(str::to_string),
            status: 200,
            honor_if_modified_since: false,
            fail_first: 0,
            delay: None,
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            status,
            ..Self::new(b"", None)
        }
    }

    /// Fail the first `times` requests with `status`, then serve normally
    pub fn failing_first(mut self, status: u16, times: usize) -> Self {
        self.status = status;
        self.fail_first = times;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
pub struct Upstream {
    pub artifacts: HashMap<String, Artifact>,
    pub catalog: Vec<u8>,
    /// Requests per artifact name
    pub hits: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<Upstream>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(Upstream::default()));
        let app = Router::new()
            .route("/catalog.zip", get(serve_catalog))
            .route("/files/:name", get(serve_artifact))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn artifact_url(&self, name: &str) -> String {
        self.url(&format!("/files/{}", name))
    }

    pub fn set_artifact(&self, name: &str, artifact: Artifact) {
        self.state
            .lock()
            .unwrap()
            .artifacts
            .insert(name.to_string(), artifact);
    }

    pub fn set_catalog(&self, bytes: Vec<u8>) {
        self.state.lock().unwrap().catalog = bytes;
    }

    pub fn hits(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

async fn serve_catalog(State(state): State<Arc<Mutex<Upstream>>>) -> Response {
    let catalog = state.lock().unwrap().catalog.clone();
    if catalog.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    (StatusCode::OK, catalog).into_response()
}

async fn serve_artifact(
    State(state): State<Arc<Mutex<Upstream>>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let (artifact, hits) = {
        let mut upstream = state.lock().unwrap();
        let hits = upstream.hits.entry(name.clone()).or_default();
        *hits += 1;
        let hits = *hits;
        (upstream.artifacts.get(&name).cloned(), hits)
    };

    let Some(artifact) = artifact else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(delay) = artifact.delay {
        tokio::time::sleep(delay).await;
    }

    let failing = artifact.fail_first == 0 || hits <= artifact.fail_first;
    if artifact.status != 200 && failing {
        return StatusCode::from_u16(artifact.status)
            .unwrap()
            .into_response();
    }

    if artifact.honor_if_modified_since {
        let since = headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let modified = artifact.last_modified.as_deref().and_then(parse_http_date);
        if let (Some(since), Some(modified)) = (since, modified) {
            if modified <= since {
                return StatusCode::NOT_MODIFIED.into_response();
            }
        }
    }

    let mut response = (StatusCode::OK, artifact.body).into_response();
    if let Some(last_modified) = artifact.last_modified {
        response
            .headers_mut()
            .insert(header::LAST_MODIFIED, last_modified.parse().unwrap());
    }
    response
}

/// A minimal metadata document
pub fn document(identifier: &str, version: &str, license: &str, download: &str) -> String {
    format!(
        r#"{{
    "spec_version": 1,
    "identifier": "{identifier}",
    "name": "{identifier} mod",
    "version": "{version}",
    "license": "{license}",
    "download": "{download}"
}}"#
    )
}

/// Build a zip catalog from (path, contents) pairs
pub fn catalog_zip(files: &[(String, String)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(name.as_str(), zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
