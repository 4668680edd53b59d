use crate::error::SyncError;
use crate::models::{OpenFlag, UNSYNCED_ID};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

/// One remote collection in the selection listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: i64,
    pub subject: String,
}

/// A remote page with its ordered children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePage {
    pub id: i64,
    pub subject: String,
    #[serde(default = "default_parent_id")]
    pub parent_id: i64,
    #[serde(default)]
    pub open_yn: OpenFlag,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<RemotePage>,
}

/// A remote collection with its full page tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBook {
    pub id: i64,
    pub subject: String,
    #[serde(default)]
    pub pages: Vec<RemotePage>,
}

/// Payload of a page update. `id == UNSYNCED_ID` asks the server to create
/// the page and hand back its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageUpdate {
    pub id: i64,
    pub book_id: i64,
    pub parent_id: i64,
    pub subject: String,
    pub content: String,
    pub open_yn: OpenFlag,
}

fn default_parent_id() -> i64 {
    UNSYNCED_ID
}

#[derive(Debug, Deserialize)]
struct PageUpdateResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    url: String,
}

/// Boundary to the remote document-hosting service.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Fetch a collection including its ordered page tree.
    async fn fetch_book(&self, book_id: i64) -> Result<RemoteBook, SyncError>;

    /// Create or update a page; returns the (possibly newly assigned) id.
    async fn push_page(&self, page: &PageUpdate) -> Result<i64, SyncError>;

    /// Upload an embedded image tagged with its owning page; returns the
    /// hosted URL.
    async fn upload_image(&self, page_id: i64, name: &str, bytes: Vec<u8>)
        -> Result<String, SyncError>;

    /// List collections for selection prompts.
    async fn list_books(&self) -> Result<Vec<BookSummary>, SyncError>;
}

/// HTTP implementation of [`Transport`] carrying the configured token.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    /// Build a transport from configuration. Fails with `MissingToken`
    /// before any network call when no token is configured.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, SyncError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SyncError::MissingToken)?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(SyncError::RemoteFetch {
                status: response.status().as_u16(),
                url: response.url().to_string(),
            })
        }
    }
}

impl Transport for HttpTransport {
    async fn fetch_book(&self, book_id: i64) -> Result<RemoteBook, SyncError> {
        let url = self.endpoint(&format!("/collections/{}/", book_id));
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn push_page(&self, page: &PageUpdate) -> Result<i64, SyncError> {
        let url = self.endpoint(&format!("/pages/{}/", page.id));
        let response = self.authorized(self.client.put(&url)).json(page).send().await?;
        let parsed: PageUpdateResponse = Self::check(response).await?.json().await?;
        Ok(parsed.id)
    }

    async fn upload_image(
        &self,
        page_id: i64,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, SyncError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("page_id", page_id.to_string())
            .part("file", part);
        let url = self.endpoint("/images/upload/");
        let response = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;
        let parsed: ImageUploadResponse = Self::check(response).await?.json().await?;
        Ok(parsed.url)
    }

    async fn list_books(&self) -> Result<Vec<BookSummary>, SyncError> {
        let url = self.endpoint("/collections/");
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
