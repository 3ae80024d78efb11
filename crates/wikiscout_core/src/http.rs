//! Blocking HTTP transport used by the catalog client and the endpoint verifier.
//!
//! The core only needs three things from a transport: issue a GET, read the
//! status code, and learn where redirects finally landed. [`HttpFetcher`] is
//! that seam; [`ReqwestFetcher`] is the production implementation.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{DiscoveryError, TransportError};

/// Status line of a completed GET, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    pub code: u16,
    pub final_url: String,
}

impl HttpStatus {
    pub fn is_ok(&self) -> bool {
        self.code == 200
    }

    /// Host the request resolved to after redirects, when the final URL parses.
    pub fn final_host(&self) -> Option<String> {
        reqwest::Url::parse(&self.final_url)
            .ok()
            .and_then(|url| url.host_str().map(ToString::to_string))
    }

    /// `scheme://host[:port]` of the URL redirects ended on, without path or trailing slash.
    pub fn final_base(&self) -> Option<String> {
        let url = reqwest::Url::parse(&self.final_url).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        })
    }
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: HttpStatus,
    pub body: String,
}

pub trait HttpFetcher: Send + Sync {
    /// GET `url` and report the status without reading the body.
    fn get_status(&self, url: &str) -> Result<HttpStatus, TransportError>;

    /// GET `url` and read the body as text, whatever the status.
    fn get_text(&self, url: &str) -> Result<FetchedPage, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|error| DiscoveryError::Client(error.to_string()))?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, TransportError> {
        self.client
            .get(url)
            .header("User-Agent", self.user_agent.clone())
            .send()
            .map_err(|error| {
                if error.is_builder() {
                    TransportError::InvalidTarget {
                        url: url.to_string(),
                        message: error.to_string(),
                    }
                } else {
                    TransportError::Request {
                        url: url.to_string(),
                        message: error.to_string(),
                    }
                }
            })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get_status(&self, url: &str) -> Result<HttpStatus, TransportError> {
        let response = self.send(url)?;
        Ok(HttpStatus {
            code: response.status().as_u16(),
            final_url: response.url().to_string(),
        })
    }

    fn get_text(&self, url: &str) -> Result<FetchedPage, TransportError> {
        let response = self.send(url)?;
        let status = HttpStatus {
            code: response.status().as_u16(),
            final_url: response.url().to_string(),
        };
        let body = response.text().map_err(|error| TransportError::Body {
            url: url.to_string(),
            message: error.to_string(),
        })?;
        Ok(FetchedPage { status, body })
    }
}
