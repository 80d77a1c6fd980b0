//! HTTP and local-file loading of dataset text.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

// Errors drop the request URL since auth wrappers may have added a key to it.
async fn get<C: HttpClient>(client: &C, url: reqwest::Url) -> Result<reqwest::Response> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.clone());

    let resp = client
        .execute(req)
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Non-success status from {url}"))?;

    Ok(resp)
}

/// Fetches `url` and returns the body as text.
///
/// # Errors
///
/// Fails on an invalid URL, a transport error, or a non-success status.
pub async fn fetch_text<C: HttpClient>(client: &C, url: &str) -> Result<String> {
    let url: reqwest::Url = url.parse()?;
    let text = get(client, url).await?.text().await?;
    debug!(bytes = text.len(), "Fetched text");
    Ok(text)
}

/// Fetches `url` and decodes the body as JSON.
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(
    client: &C,
    url: reqwest::Url,
) -> Result<T> {
    Ok(get(client, url).await?.json::<T>().await?)
}

/// Loads dataset text from a URL (`http…`) or a local path.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<String> {
    if source.starts_with("http") {
        fetch_text(client, source).await
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("reading {source}"))
    }
}
