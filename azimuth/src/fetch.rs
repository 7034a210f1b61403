//! Remote data fetching for layers whose content is loaded by the crate itself.

use geojson::GeoJson;
use thiserror::Error;

use crate::value::OptionValue;

/// Error fetching remote layer data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Could not reach the server.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// The server answered with a non-success status.
    #[error("{url} responded with status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The response body is not GeoJSON.
    #[error("invalid GeoJSON from {url}: {message}")]
    Decoding {
        /// Requested URL.
        url: String,
        /// Parser error description.
        message: String,
    },
}

/// A GET request for layer data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Resource URL.
    pub url: String,
    /// Query parameters.
    pub params: Vec<(String, String)>,
}

impl FetchRequest {
    /// Creates a request. `params` is expected to be an object; anything else adds no parameters.
    pub fn new(url: impl Into<String>, params: Option<&OptionValue>) -> Self {
        let params = params
            .and_then(OptionValue::as_object)
            .map(|object| {
                object
                    .iter()
                    .filter(|(_, value)| !matches!(value, OptionValue::Null))
                    .map(|(key, value)| (key.clone(), value.to_param_string()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            url: url.into(),
            params,
        }
    }
}

/// Loads GeoJSON documents.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait DataFetcher: Send + Sync {
    /// Performs the request and decodes the response body.
    async fn fetch_geojson(&self, request: &FetchRequest) -> Result<GeoJson, FetchError>;
}

/// Fetcher using an HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher using the given client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl DataFetcher for HttpFetcher {
    async fn fetch_geojson(&self, request: &FetchRequest) -> Result<GeoJson, FetchError> {
        let url = request.url.clone();
        let network = |err: reqwest::Error| FetchError::Network {
            url: url.clone(),
            message: err.to_string(),
        };

        log::debug!("Fetching GeoJSON from {}", request.url);
        let response = self
            .client
            .get(&request.url)
            .query(&request.params)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(network)?;
        log::trace!("Loaded {} bytes from {}", body.len(), request.url);

        body.parse::<GeoJson>()
            .map_err(|err| FetchError::Decoding {
                url: request.url.clone(),
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OptionMap;

    #[test]
    fn request_params_come_from_object() {
        let mut params = OptionMap::new();
        params.insert("bbox".into(), OptionValue::List(vec![1.into(), 2.into()]));
        params.insert("limit".into(), 10.into());
        params.insert("skip".into(), OptionValue::Null);

        let request = FetchRequest::new("http://example.com/data", Some(&params.into()));
        assert_eq!(
            request.params,
            vec![
                ("bbox".to_string(), "1,2".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn non_object_params_are_ignored() {
        let request = FetchRequest::new("u", Some(&OptionValue::from("a=b")));
        assert!(request.params.is_empty());
        assert!(FetchRequest::new("u", None).params.is_empty());
    }
}
