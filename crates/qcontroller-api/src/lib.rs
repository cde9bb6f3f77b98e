//! Typed Rust client for the qcontroller REST gateway.
//!
//! Covers the subset needed to manage a single VM:
//! controller (info, create, start, stop, remove) and
//! image service (list, upload).

mod types;

use std::path::{Path, PathBuf};

pub use reqwest::StatusCode;
pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("qcontroller request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("qcontroller {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// HTTP status of a non-success response, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status(),
            Self::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api { endpoint, status, body });
    }
    Ok(resp)
}

/// Client for the controller service (VM lifecycle).
#[derive(Clone)]
pub struct ControllerClient {
    base: String,
    http: reqwest::Client,
}

impl ControllerClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: base_url(host, port),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base)
    }

    pub async fn info(&self, name: &str) -> Result<InfoResponse> {
        let resp = self.info_request(name).send().await?;

        check(resp, "info").await?.json().await.map_err(Error::from)
    }

    pub async fn create(&self, req: &CreateRequest) -> Result<()> {
        let resp = self.create_request(req).send().await?;

        check(resp, "create").await?;
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        let resp = self.start_request(name).send().await?;

        check(resp, "start").await?;
        Ok(())
    }

    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let resp = self.stop_request(name, force).send().await?;

        check(resp, "stop").await?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let resp = self.remove_request(name).send().await?;

        check(resp, "remove").await?;
        Ok(())
    }

    // ── Request builders ─────────────────────────────────────────────

    fn info_request(&self, name: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(&format!("/info/{name}")))
    }

    fn create_request(&self, req: &CreateRequest) -> reqwest::RequestBuilder {
        self.http.post(self.url("/create")).json(req)
    }

    fn start_request(&self, name: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(&format!("/start/{name}")))
            .json(&StartRequest { name: name.to_string() })
    }

    fn stop_request(&self, name: &str, force: bool) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(&format!("/stop/{name}")))
            .json(&StopRequest {
                name: name.to_string(),
                force,
            })
    }

    fn remove_request(&self, name: &str) -> reqwest::RequestBuilder {
        self.http.delete(self.url(&format!("/remove/{name}")))
    }
}

/// Client for the image registry.
#[derive(Clone)]
pub struct ImageClient {
    base: String,
    http: reqwest::Client,
}

impl ImageClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: base_url(host, port),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base)
    }

    pub async fn list_images(&self) -> Result<ListImagesResponse> {
        let resp = self.http.get(self.url("/images")).send().await?;

        check(resp, "list images")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Upload the file at `path` under `id`, replacing any image with that id.
    pub async fn upload_image(&self, id: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());

        let resp = self.upload_request(id, file_name, bytes).send().await?;

        check(resp, "upload image").await?;
        Ok(())
    }

    fn upload_request(&self, id: &str, file_name: String, bytes: Vec<u8>) -> reqwest::RequestBuilder {
        let form = reqwest::multipart::Form::new()
            .text("id", id.to_string())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        self.http.post(self.url("/images")).multipart(form)
    }
}
