use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::Duration;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use trackvault::auth::{CredentialSigner, generate_secret};
use trackvault::config::DEFAULT_MAX_UPLOAD_BYTES;
use trackvault::server::{AppState, create_router};
use trackvault::store::{SqliteStore, Store};

const BOUNDARY: &str = "trackvault-test-boundary";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub struct TestServer {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    router: Router,
}

/// One field of a multipart form.
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(name: &'a str, file_name: &'a str, content: &'a [u8]) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content,
        }
    }

    pub fn field(name: &'a str, content: &'a [u8]) -> Self {
        Self {
            name,
            file_name: None,
            content,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("parse json body")
    }

    pub fn header(&self, name: header::HeaderName) -> &str {
        self.headers
            .get(name)
            .expect("header present")
            .to_str()
            .expect("ascii header")
    }
}

impl TestServer {
    pub fn start() -> Self {
        Self::with_max_upload_bytes(DEFAULT_MAX_UPLOAD_BYTES)
    }

    pub fn with_max_upload_bytes(max_upload_bytes: usize) -> Self {
        Self::build(max_upload_bytes, Duration::hours(1))
    }

    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self::build(DEFAULT_MAX_UPLOAD_BYTES, token_ttl)
    }

    fn build(max_upload_bytes: usize, token_ttl: Duration) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let store = SqliteStore::new(temp_dir.path().join("trackvault.db")).expect("open store");
        store.initialize().expect("initialize store");

        let credentials =
            CredentialSigner::from_hex(&generate_secret(), token_ttl).expect("signer");

        let state = Arc::new(
            AppState::new(Arc::new(store), temp_dir.path(), credentials)
                .with_max_upload_bytes(max_upload_bytes),
        );
        let router = create_router(state.clone());

        Self {
            temp_dir,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn builder(method: Method, path: &str, token: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(path);
        match token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let request = Self::builder(Method::GET, path, token)
            .body(Body::empty())
            .expect("build request");
        self.send(request).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        let request = Self::builder(Method::DELETE, path, token)
            .body(Body::empty())
            .expect("build request");
        self.send(request).await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        let request = Self::builder(Method::POST, path, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request");
        self.send(request).await
    }

    /// Uploads `content` as the `file` field of a multipart form.
    pub async fn upload(&self, token: Option<&str>, file_name: &str, content: &[u8]) -> TestResponse {
        self.upload_parts(token, &[Part::file("file", file_name, content)])
            .await
    }

    /// Posts an arbitrary multipart form to the upload route.
    pub async fn upload_parts(&self, token: Option<&str>, parts: &[Part<'_>]) -> TestResponse {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match part.file_name {
                Some(file_name) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n",
                    part.name
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: application/gpx+xml\r\n\r\n");
            body.extend_from_slice(part.content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Self::builder(Method::POST, "/api/v1/tracks", token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build request");
        self.send(request).await
    }

    /// Registers an account and returns its user id.
    pub async fn register(&self, email: &str) -> String {
        let resp = self
            .post_json(
                "/api/v1/users/register",
                None,
                serde_json::json!({"email": email, "password": TEST_PASSWORD}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register {email}");
        resp.json()["data"]["id"]
            .as_str()
            .expect("user id")
            .to_string()
    }

    pub async fn login(&self, email: &str) -> String {
        let resp = self
            .post_json(
                "/api/v1/users/login",
                None,
                serde_json::json!({"email": email, "password": TEST_PASSWORD}),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "login {email}");
        resp.json()["data"]["token"]
            .as_str()
            .expect("token")
            .to_string()
    }

    /// Registers and logs in, returning a bearer credential.
    pub async fn new_user(&self, email: &str) -> String {
        self.register(email).await;
        self.login(email).await
    }
}

pub fn sample_gpx(name: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trackvault-tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>{name}</name>
    <type>cycling</type>
    <trkseg>
      <trkpt lat="59.3293" lon="18.0686"><ele>10.0</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="59.3300" lon="18.0700"><ele>14.5</ele><time>2024-05-01T08:01:00Z</time></trkpt>
      <trkpt lat="59.3310" lon="18.0720"><ele>12.0</ele><time>2024-05-01T08:02:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>
"#
    )
    .into_bytes()
}
