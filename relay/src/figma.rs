//! Figma REST client used by the bridge's local tools

use figbridge_shared::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const FIGMA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct FigmaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl FigmaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FIGMA_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// `GET /v1/files/{key}`
    pub async fn get_file(&self, file_key: &str, depth: Option<u32>) -> Result<Value> {
        if !is_file_key(file_key) {
            return Err(Error::InvalidRequest(format!("invalid Figma file key: {}", file_key)));
        }
        let url = format!("{}/v1/files/{}", self.base_url, file_key);
        debug!(file_key = %file_key, depth = ?depth, "fetching figma file");

        let mut request = self
            .http
            .get(&url)
            .header("X-Figma-Token", &self.token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "figbridge/0.1");
        if let Some(depth) = depth {
            request = request.query(&[("depth", depth)]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Figma request failed: {}", e)))?;

        match resp.status().as_u16() {
            200 => resp
                .json()
                .await
                .map_err(|e| Error::Upstream(format!("Invalid Figma response: {}", e))),
            403 => Err(Error::Upstream("Access denied to Figma file".into())),
            404 => Err(Error::Upstream(format!("Figma file not found: {}", file_key))),
            s => Err(Error::Upstream(format!("Figma API error: {}", s))),
        }
    }
}

static FIGMA_FILE_URL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^https://(?:www\.)?figma\.com/(?:file|design|proto|board)/([A-Za-z0-9]+)(?:[/?#]|$)").ok()
});

static FIGMA_FILE_KEY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").ok());

/// Pull the file key out of a Figma URL (`/file/<key>`, `/design/<key>`, ...)
pub fn extract_file_key(url: &str) -> Option<String> {
    FIGMA_FILE_URL
        .as_ref()?
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|key| key.as_str().to_string())
}

/// File keys are plain alphanumerics; anything else never reaches the URL
pub fn is_file_key(key: &str) -> bool {
    FIGMA_FILE_KEY.as_ref().is_some_and(|re| re.is_match(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_file_key() {
        assert_eq!(
            extract_file_key("https://www.figma.com/file/AbC123/My-Design?node-id=1-2").as_deref(),
            Some("AbC123")
        );
        assert_eq!(
            extract_file_key("https://figma.com/design/XyZ789/Landing").as_deref(),
            Some("XyZ789")
        );
        assert_eq!(extract_file_key("https://www.figma.com/community/plugin/1"), None);
        assert_eq!(extract_file_key("https://example.com/file/AbC123"), None);
        assert_eq!(extract_file_key("not a url"), None);
        assert_eq!(extract_file_key("https://notfigma.com/file/AbC123"), None);
        assert_eq!(extract_file_key("https://evil.example/?r=figma.com/file/AbC123"), None);
        assert_eq!(extract_file_key("https://www.figma.com/file/..%2Fme/x"), None);
    }

    #[test]
    fn test_file_key_shape() {
        assert!(is_file_key("AbC123"));
        assert!(!is_file_key("../me"));
        assert!(!is_file_key("AbC123/nodes"));
        assert!(!is_file_key("AbC?x=1"));
        assert!(!is_file_key(""));
    }

    #[tokio::test]
    async fn test_get_file_rejects_path_in_key() {
        // Unroutable base: the key check must fail before any request is made
        let client = FigmaClient::new("http://127.0.0.1:9", "tok");
        assert!(matches!(
            client.get_file("../me", None).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = FigmaClient::new("https://api.figma.com/", "tok");
        assert_eq!(client.base_url, "https://api.figma.com");
    }
}
