//! put.io v2 client implementing [`RemoteStore`]

use crate::remote::{RemoteError, RemoteStore};
use async_trait::async_trait;
use pullsync_types::{RemoteEntry, RemoteId, ROOT_ID};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.put.io";

const FOLDER_FILE_TYPE: &str = "FOLDER";
const PAGE_SIZE: u32 = 1000;

#[derive(Clone)]
pub struct PutioClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl PutioClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .user_agent(concat!("pullsync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    async fn list_with_parent(
        &self,
        folder_id: RemoteId,
    ) -> Result<(PutioFile, Vec<PutioFile>), RemoteError> {
        let mut url = self.endpoint("/v2/files/list")?;
        url.query_pairs_mut()
            .append_pair("parent_id", &folder_id.to_string())
            .append_pair("per_page", &PAGE_SIZE.to_string());
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let page: ListResponse = Self::handle_response(response).await?;

        let parent = page.parent;
        let mut files = page.files;
        let mut cursor = page.cursor;
        while let Some(next) = cursor.filter(|c| !c.is_empty()) {
            let url = self.endpoint("/v2/files/list/continue")?;
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.token)
                .form(&[("cursor", next.as_str())])
                .send()
                .await?;
            let page: ContinueResponse = Self::handle_response(response).await?;
            files.extend(page.files);
            cursor = page.cursor;
        }

        Ok((parent, files))
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::Api { status, body })
        }
    }
}

#[async_trait]
impl RemoteStore for PutioClient {
    async fn list_root(&self) -> Result<(RemoteEntry, Vec<RemoteEntry>), RemoteError> {
        let (parent, files) = self.list_with_parent(ROOT_ID).await?;
        Ok((
            parent.into_entry(),
            files.into_iter().map(PutioFile::into_entry).collect(),
        ))
    }

    async fn list(&self, folder_id: RemoteId) -> Result<Vec<RemoteEntry>, RemoteError> {
        let (_, files) = self.list_with_parent(folder_id).await?;
        Ok(files.into_iter().map(PutioFile::into_entry).collect())
    }

    async fn download_url(&self, file_id: RemoteId) -> Result<Url, RemoteError> {
        let url = self.endpoint(&format!("/v2/files/{}/url", file_id))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let payload: UrlResponse = Self::handle_response(response).await?;
        Ok(Url::parse(&payload.url)?)
    }

    async fn delete(&self, id: RemoteId) -> Result<(), RemoteError> {
        let url = self.endpoint("/v2/files/delete")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .form(&[("file_ids", id.to_string())])
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::Api { status, body })
        }
    }
}

#[derive(Debug, Deserialize)]
struct PutioFile {
    id: RemoteId,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    crc32: Option<String>,
}

impl PutioFile {
    fn into_entry(self) -> RemoteEntry {
        RemoteEntry {
            id: self.id,
            name: self.name,
            is_directory: self.file_type == FOLDER_FILE_TYPE,
            size: self.size,
            checksum: self.crc32.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    files: Vec<PutioFile>,
    parent: PutioFile,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContinueResponse {
    files: Vec<PutioFile>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_root_returns_parent_and_children() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/files/list"))
            .and(query_param("parent_id", "0"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "parent": {"id": 0, "name": "Your Files", "file_type": "FOLDER", "size": 0},
                "files": [
                    {"id": 11, "name": "movies", "file_type": "FOLDER", "size": 2048},
                    {"id": 12, "name": "a.mkv", "file_type": "VIDEO", "size": 5, "crc32": "3610a686"}
                ],
                "cursor": null
            })))
            .mount(&server)
            .await;

        let client = PutioClient::with_base_url(&server.uri(), "test-token").unwrap();
        let (root, children) = client.list_root().await.unwrap();

        assert_eq!(root.id, ROOT_ID);
        assert!(root.is_directory);
        assert_eq!(children.len(), 2);
        assert!(children[0].is_directory);
        assert_eq!(children[1].checksum.as_deref(), Some("3610a686"));
        assert_eq!(children[1].size, 5);
    }

    #[tokio::test]
    async fn list_follows_cursor_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/files/list"))
            .and(query_param("parent_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parent": {"id": 7, "name": "tv", "file_type": "FOLDER"},
                "files": [{"id": 1, "name": "one", "file_type": "VIDEO", "size": 1}],
                "cursor": "next-page"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/files/list/continue"))
            .and(body_string_contains("cursor=next-page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": 2, "name": "two", "file_type": "VIDEO", "size": 2}],
                "cursor": null
            })))
            .mount(&server)
            .await;

        let client = PutioClient::with_base_url(&server.uri(), "test-token").unwrap();
        let children = client.list(7).await.unwrap();

        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn download_url_parses_url_field() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/files/12/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "https://cdn.example/a.mkv?token=xyz"
            })))
            .mount(&server)
            .await;

        let client = PutioClient::with_base_url(&server.uri(), "test-token").unwrap();
        let url = client.download_url(12).await.unwrap();

        assert_eq!(url.as_str(), "https://cdn.example/a.mkv?token=xyz");
    }

    #[tokio::test]
    async fn delete_posts_file_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/files/delete"))
            .and(body_string_contains("file_ids=12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = PutioClient::with_base_url(&server.uri(), "test-token").unwrap();
        client.delete(12).await.unwrap();
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/files/list"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = PutioClient::with_base_url(&server.uri(), "test-token").unwrap();
        let err = client.list(3).await.unwrap_err();

        match &err {
            RemoteError::Api { status, body } => {
                assert_eq!(*status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());
    }
}
