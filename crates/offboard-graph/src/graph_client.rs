//! Microsoft Graph HTTP client with retry handling and pagination.

use std::collections::HashSet;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::TokenCache;
use crate::models::{GraphObject, ODataPage};
use crate::retry::RetryPolicy;
use crate::service_principals::ServicePrincipalCache;
use crate::{GraphCredentials, GraphError, GraphResult, GraphSettings};

/// Microsoft Graph API client.
///
/// Every request carries the configured timeout, a bearer token from the
/// [`TokenCache`], and goes through the shared [`RetryPolicy`].
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: TokenCache,
    base_url: Url,
    retry: RetryPolicy,
    pub(crate) sp_cache: ServicePrincipalCache,
}

impl GraphClient {
    /// Creates a client from settings and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the HTTP client
    /// cannot be created.
    pub fn new(settings: &GraphSettings, credentials: GraphCredentials) -> GraphResult<Self> {
        settings.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(&settings.base_url())?;

        let token_cache = TokenCache::new(
            credentials,
            settings.login_host(),
            settings.graph_host(),
            http_client.clone(),
        );

        Ok(Self {
            http_client,
            token_cache,
            base_url,
            retry: RetryPolicy::from_settings(settings),
            sp_cache: ServicePrincipalCache::new(
                settings.service_principal_cache_capacity,
                settings.service_principal_cache_ttl,
            ),
        })
    }

    /// Creates a client from settings, returning `Ok(None)` when the
    /// settings carry no credentials.
    pub fn from_settings(settings: &GraphSettings) -> GraphResult<Option<Self>> {
        match settings.credentials.clone() {
            Some(credentials) => Self::new(settings, credentials).map(Some),
            None => Ok(None),
        }
    }

    /// Base URL for Graph requests.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded.
    pub(crate) fn url(&self, segments: &[&str]) -> GraphResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GraphError::Config("Graph base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request, retrying throttling and gateway failures, and returns
    /// the successful response. Non-success responses become typed errors.
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> GraphResult<reqwest::Response> {
        let mut throttle_attempts = 0u32;
        let mut transient_attempts = 0u32;

        loop {
            let token = self.token_cache.get_token().await?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token);
            if let Some(b) = body {
                request = request.json(b);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(RetryPolicy::parse_retry_after);

                if throttle_attempts >= self.retry.max_retries {
                    return Err(GraphError::RateLimited {
                        operation,
                        attempts: throttle_attempts + 1,
                        retry_after_secs: retry_after,
                    });
                }
                self.retry
                    .wait(operation, retry_after, throttle_attempts)
                    .await;
                throttle_attempts += 1;
                continue;
            }

            if matches!(
                status,
                StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ) && transient_attempts < self.retry.max_retries
            {
                warn!(
                    operation,
                    %status,
                    attempt = transient_attempts + 1,
                    max = self.retry.max_retries,
                    "Transient Graph error, retrying"
                );
                self.retry.wait(operation, None, transient_attempts).await;
                transient_attempts += 1;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                // Next call re-authenticates; a rotated secret shows up here.
                self.token_cache.invalidate().await;
            }

            let error_body = response.text().await.unwrap_or_default();
            return Err(GraphError::from_response(operation, status, &error_body));
        }
    }

    /// GET returning a JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> GraphResult<T> {
        let response = self.send(operation, Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    /// GET that maps upstream 404 to `Ok(None)`.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> GraphResult<Option<T>> {
        match self.get_json(operation, url).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// POST with a JSON body, returning a JSON body.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        body: &serde_json::Value,
    ) -> GraphResult<T> {
        let response = self.send(operation, Method::POST, url, Some(body)).await?;
        Ok(response.json().await?)
    }

    /// PATCH with a JSON body; Graph answers `204 No Content`.
    pub(crate) async fn patch(
        &self,
        operation: &'static str,
        url: &str,
        body: &serde_json::Value,
    ) -> GraphResult<()> {
        self.send(operation, Method::PATCH, url, Some(body)).await?;
        Ok(())
    }

    /// DELETE that treats "already gone" as success.
    pub(crate) async fn delete_idempotent(
        &self,
        operation: &'static str,
        url: &str,
    ) -> GraphResult<()> {
        match self.send(operation, Method::DELETE, url, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(operation, url, "Resource already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Follows `@odata.nextLink` until exhausted and returns every item in
    /// first-seen order. Items repeated across pages (Graph can shift page
    /// boundaries under concurrent writes) are kept once.
    ///
    /// A next link that points back at a page already fetched, or a listing
    /// longer than [`MAX_PAGES`], fails with [`GraphError::Api`].
    #[instrument(skip(self))]
    pub async fn get_all_pages<T>(
        &self,
        operation: &'static str,
        initial_url: &str,
    ) -> GraphResult<Vec<T>>
    where
        T: DeserializeOwned + GraphObject,
    {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        let mut next = Some(initial_url.to_string());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages >= MAX_PAGES {
                warn!(operation, pages, "Pagination exceeded page limit");
                return Err(pagination_error(
                    operation,
                    format!("more than {MAX_PAGES} pages"),
                ));
            }
            if !visited.insert(url.clone()) {
                warn!(operation, pages, url = %url, "Next link repeats a fetched page");
                return Err(pagination_error(
                    operation,
                    format!("next link repeats a page already fetched: {url}"),
                ));
            }

            debug!(operation, page = pages, "Fetching page");
            let page: ODataPage<T> = self.get_json(operation, &url).await?;
            pages += 1;

            for item in page.value {
                if seen.insert(item.object_id().to_string()) {
                    items.push(item);
                }
            }
            next = page.next_link;
        }

        debug!(operation, pages, items = items.len(), "Pagination complete");
        Ok(items)
    }

    /// Fetches the first page only, ignoring any next link.
    pub(crate) async fn get_first_page<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> GraphResult<Vec<T>> {
        let page: ODataPage<T> = self.get_json(operation, url).await?;
        Ok(page.value)
    }
}

/// Upper bound on pages followed by one listing.
pub const MAX_PAGES: usize = 1_000;

fn pagination_error(operation: &'static str, message: String) -> GraphError {
    GraphError::Api {
        operation,
        status: 200,
        code: "PaginationLoop".to_string(),
        message,
    }
}
