use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use tracing::debug;

use snitchr_types::ValidationError;
use snitchr_types::api::{ErrorBody, ListQuery, NewConfession, PageQuery, Stats};
use snitchr_types::models::{Confession, Reactions};

use crate::error::{ClientError, Result, StoreError};
use crate::store::{ConfessionStore, Page};

/// `ConfessionStore` backed by the snitchr REST API.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: Url,
}

impl HttpStore {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(raw.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Appends `segments` to the base path, percent-encoding each one so an
    /// id can never reach a different route.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl ConfessionStore for HttpStore {
    async fn query(&self, query: &ListQuery, page: u32, page_size: u32) -> Result<Page> {
        if page_size == 0 {
            return Err(ValidationError::InvalidPageSize.into());
        }
        let params = PageQuery::new(query, page, page_size);
        debug!("GET /confessions page={} filter={}", page, params.filter);
        let response = self
            .client
            .get(self.url(&["confessions"]))
            .query(&params)
            .send()
            .await?;
        Ok(check(response, None).await?.json().await?)
    }

    async fn get(&self, id: &str) -> Result<Confession> {
        let response = self
            .client
            .get(self.url(&["confessions", id]))
            .send()
            .await?;
        Ok(check(response, Some(id)).await?.json().await?)
    }

    async fn create(&self, draft: NewConfession) -> Result<Confession> {
        let response = self
            .client
            .post(self.url(&["confessions"]))
            .json(&draft)
            .send()
            .await?;
        Ok(check(response, None).await?.json().await?)
    }

    async fn update_reactions(&self, id: &str, reactions: Reactions) -> Result<Confession> {
        let response = self
            .client
            .put(self.url(&["confessions", id, "reactions"]))
            .json(&reactions)
            .send()
            .await?;
        Ok(check(response, Some(id)).await?.json().await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&["confessions", id]))
            .send()
            .await?;
        check(response, Some(id)).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let response = self.client.get(self.url(&["stats"])).send().await?;
        Ok(check(response, None).await?.json().await?)
    }
}

/// Passes successful responses through and turns the rest into errors,
/// using the server's `ErrorBody` message when there is one.
async fn check(response: Response, id: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(classify(status, message, id))
}

fn classify(status: StatusCode, message: String, id: Option<&str>) -> ClientError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ValidationError::Rejected(message).into()
        }
        StatusCode::NOT_FOUND => StoreError::NotFound(id.unwrap_or(&message).to_string()).into(),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ClientError::Network(message),
        s if s.is_server_error() => ClientError::Network(message),
        _ => StoreError::Rejected(message).into(),
    }
}
