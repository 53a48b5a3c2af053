use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use usm_core::update::{Fetcher, HttpRequest, HttpResponse};
use usm_core::FetchError;

/// `reqwest`-backed fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("usm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

fn map_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

fn build_headers(request: &HttpRequest) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::Network(format!("Invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::Network(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| FetchError::Network(format!("Invalid method {:?}: {}", request.method, e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(build_headers(request)?);
        if let Some(data) = &request.data {
            builder = builder.body(data.clone());
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\r\n");
        let response_text = response.text().await.map_err(map_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            response_text,
            response_headers,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_build_headers() {
        let mut request = HttpRequest::get("https://example.com/");
        request.headers = BTreeMap::from([("X-Test".to_string(), "1".to_string())]);
        let headers = build_headers(&request).unwrap();
        assert_eq!(headers.get("x-test").unwrap(), "1");

        request.headers = BTreeMap::from([("bad header".to_string(), "1".to_string())]);
        assert!(build_headers(&request).is_err());
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
