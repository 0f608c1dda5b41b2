// iRODS HTTP API gateway
// Basic-auth login for a bearer token, then collection and data-object operations

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

use super::{IrodsAccount, IrodsError, IrodsGateway, IrodsObject};

const API_PATH: &str = "irods-http-api/0.5.0";

#[derive(Debug, Deserialize)]
struct IrodsStatus {
    status_code: i64,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    irods_response: IrodsStatus,
    #[serde(rename = "type", default)]
    object_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    irods_response: IrodsStatus,
    #[serde(default)]
    entries: Vec<String>,
}

pub struct HttpIrodsGateway {
    http: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpIrodsGateway {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, IrodsError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| IrodsError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: None,
            token: None,
        })
    }

    pub fn base_url_for(account: &IrodsAccount) -> String {
        format!("https://{}:{}/{}", account.host, account.port, API_PATH)
    }

    fn endpoint(&self, resource: &str) -> Result<String, IrodsError> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, resource))
            .ok_or_else(|| IrodsError::Unauthorized("No iRODS session".to_string()))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, IrodsError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| IrodsError::Unauthorized("No iRODS session".to_string()))?;
        Ok(builder.bearer_auth(token))
    }

    fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, IrodsError> {
        let response = self
            .authorized(builder)?
            .send()
            .map_err(|e| IrodsError::Transport(e.to_string()))?;
        check_status(response, path)
    }

    fn stat_as(&self, resource: &str, path: &str) -> Result<Option<IrodsObject>, IrodsError> {
        let url = self.endpoint(resource)?;
        let body: StatResponse = self
            .send(self.http.get(url).query(&[("op", "stat"), ("lpath", path)]), path)?
            .json()
            .map_err(|e| IrodsError::Transport(format!("Malformed stat response: {}", e)))?;
        if body.irods_response.status_code != 0 {
            debug!(
                path = %path,
                resource = resource,
                status = body.irods_response.status_code,
                message = ?body.irods_response.status_message,
                "Stat rejected"
            );
            return Ok(None);
        }
        Ok(Some(IrodsObject {
            path: path.to_string(),
            is_collection: resource == "collections"
                || body.object_type.as_deref() == Some("collection"),
            size: body.size.unwrap_or(0),
            modified: body
                .modified_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }))
    }
}

fn check_status(response: Response, path: &str) -> Result<Response, IrodsError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(IrodsError::Unauthorized(format!(
            "Token rejected for {}",
            path
        ))),
        StatusCode::NOT_FOUND => Err(IrodsError::NotFound(path.to_string())),
        status => Err(IrodsError::Transport(format!("HTTP {} for {}", status, path))),
    }
}

impl IrodsGateway for HttpIrodsGateway {
    fn authenticate(&mut self, account: &IrodsAccount) -> Result<(), IrodsError> {
        let base = Self::base_url_for(account);
        let response = self
            .http
            .post(format!("{}/authenticate", base))
            .basic_auth(&account.username, Some(&account.password))
            .send()
            .map_err(|e| IrodsError::Transport(e.to_string()))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(IrodsError::Unauthorized(format!(
                "iRODS rejected user {}",
                account.username
            )));
        }
        let token = check_status(response, &account.home_dir)?
            .text()
            .map_err(|e| IrodsError::Transport(e.to_string()))?;
        self.token = Some(token.trim().to_string());
        self.base_url = Some(base);
        Ok(())
    }

    fn stat(&mut self, logical_path: &str) -> Result<IrodsObject, IrodsError> {
        if let Some(object) = self.stat_as("data-objects", logical_path)? {
            return Ok(object);
        }
        self.stat_as("collections", logical_path)?
            .ok_or_else(|| IrodsError::NotFound(logical_path.to_string()))
    }

    fn list_collection(&mut self, logical_path: &str) -> Result<Vec<IrodsObject>, IrodsError> {
        let url = self.endpoint("collections")?;
        let body: ListResponse = self
            .send(
                self.http
                    .get(url)
                    .query(&[("op", "list"), ("lpath", logical_path)]),
                logical_path,
            )?
            .json()
            .map_err(|e| IrodsError::Transport(format!("Malformed list response: {}", e)))?;
        if body.irods_response.status_code != 0 {
            return Err(IrodsError::NotFound(format!(
                "{} (status {})",
                logical_path, body.irods_response.status_code
            )));
        }

        let mut members = Vec::with_capacity(body.entries.len());
        for entry in body.entries {
            match self.stat(&entry) {
                Ok(object) => members.push(object),
                Err(IrodsError::Unauthorized(message)) => {
                    return Err(IrodsError::Unauthorized(message))
                }
                Err(e) => warn!(error = %e, path = %entry, "Skipping unreadable member"),
            }
        }
        Ok(members)
    }

    fn read(&mut self, logical_path: &str) -> Result<Box<dyn Read + Send>, IrodsError> {
        let url = self.endpoint("data-objects")?;
        let response = self.send(
            self.http
                .get(url)
                .query(&[("op", "read"), ("lpath", logical_path)]),
            logical_path,
        )?;
        Ok(Box::new(response))
    }

    fn close(&mut self) {
        self.token = None;
        self.base_url = None;
    }
}
