//! Ownership handshake of http push endpoints.
//!
//! The endpoint owner proves control by serving the subscription's
//! verification hash at `{scheme}://{host}/ams_verification_hash`.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use log::error;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("Could not retrieve push endpoint host")]
    NoEndpoint,
    #[error("Invalid push endpoint: {0}")]
    InvalidUrl(String),
    #[error("Wrong response status code")]
    WrongStatus,
    #[error("Wrong verification hash")]
    WrongHash,
    #[error("{0}")]
    Request(String),
}

pub fn verification_url(endpoint: &str) -> Result<Url, VerifyError> {
    if endpoint.is_empty() {
        return Err(VerifyError::NoEndpoint);
    }

    let mut url = Url::parse(endpoint).map_err(|err| VerifyError::InvalidUrl(err.to_string()))?;
    url.set_path("ams_verification_hash");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Compares the endpoint's answer with the expected hash.
pub fn check_response(status: u16, body: &str, expected_hash: &str) -> Result<(), VerifyError> {
    if !(200..300).contains(&status) {
        return Err(VerifyError::WrongStatus);
    }

    if body != expected_hash {
        return Err(VerifyError::WrongHash);
    }

    Ok(())
}

#[async_trait]
pub trait EndpointVerifier: Send + Sync {
    async fn verify(&self, endpoint: &str, expected_hash: &str) -> Result<(), VerifyError>;
}

pub struct HttpVerifier {
    client: reqwest::Client,
}

impl HttpVerifier {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointVerifier for HttpVerifier {
    async fn verify(&self, endpoint: &str, expected_hash: &str) -> Result<(), VerifyError> {
        let url = verification_url(endpoint)?;

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| VerifyError::Request(err.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|err| VerifyError::Request(err.to_string()))?;

        check_response(status, &body, expected_hash).map_err(|err| {
            error!(
                "Failed to verify push endpoint {} (status {}): {}",
                url, status, err
            );
            err
        })
    }
}

/// Verifier answering with a canned response, recording the urls it was asked for.
pub struct MockVerifier {
    response: Mutex<(u16, String)>,
    requested: Mutex<Vec<String>>,
}

impl MockVerifier {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            response: Mutex::new((status, body.to_string())),
            requested: Mutex::new(vec![]),
        }
    }

    pub fn respond_with(&self, status: u16, body: &str) {
        if let Ok(mut response) = self.response.lock() {
            *response = (status, body.to_string());
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|requested| requested.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EndpointVerifier for MockVerifier {
    async fn verify(&self, endpoint: &str, expected_hash: &str) -> Result<(), VerifyError> {
        let url = verification_url(endpoint)?;
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.to_string());
        }

        let (status, body) = self
            .response
            .lock()
            .map(|response| response.clone())
            .map_err(|err| VerifyError::Request(err.to_string()))?;

        check_response(status, &body, expected_hash)
    }
}
