// Simulator REST client
//
// Wraps `reqwest::Client` with URL construction for the simulator web
// API and a single status check: anything but HTTP 200 is an error.
// There is no retry here; the engine drops failed writes.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{
    ActivateRequest, CommandId, DatarefId, LookupResponse, SetValueRequest, WriteValue,
};
use crate::transport::TransportConfig;

/// HTTP client for the simulator's REST surface.
///
/// `base_url` is the API root, e.g. `http://localhost:8086/api/v2`.
#[derive(Clone)]
pub struct SimClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SimClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Resolve a dataref name to its session ID.
    pub async fn lookup_dataref(&self, name: &str) -> Result<DatarefId, Error> {
        let id = self.lookup("datarefs", "dataref", name).await?;
        Ok(DatarefId(id))
    }

    /// Resolve a command name to its session ID.
    pub async fn lookup_command(&self, name: &str) -> Result<CommandId, Error> {
        let id = self.lookup("commands", "command", name).await?;
        Ok(CommandId(id))
    }

    async fn lookup(&self, collection: &str, kind: &'static str, name: &str) -> Result<u64, Error> {
        let mut url = self.url(collection)?;
        url.query_pairs_mut().append_pair("filter[name]", name);
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await?;
        let body: LookupResponse = parse_json(resp).await?;

        body.data
            .first()
            .map(|entry| entry.id)
            .ok_or_else(|| Error::NotFound {
                kind,
                name: name.to_owned(),
            })
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write a value to a dataref, optionally into a single array slot.
    pub async fn set_dataref(
        &self,
        id: DatarefId,
        value: f64,
        index: Option<u32>,
    ) -> Result<(), Error> {
        let mut url = self.url(&format!("datarefs/{id}/value"))?;
        if let Some(index) = index {
            url.query_pairs_mut()
                .append_pair("index", &index.to_string());
        }
        let body = SetValueRequest {
            data: WriteValue(value),
        };
        debug!("PATCH {}", url);

        let resp = self.http.patch(url).json(&body).send().await?;
        check_status(resp).await
    }

    /// Activate a command for `duration`. The simulator releases it on its own.
    pub async fn activate_command(&self, id: CommandId, duration: Duration) -> Result<(), Error> {
        let url = self.url(&format!("command/{id}/activate"))?;
        let body = ActivateRequest {
            duration: duration.as_secs_f64(),
        };
        debug!("POST {}", url);

        let resp = self.http.post(url).json(&body).send().await?;
        check_status(resp).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn check_status(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status == reqwest::StatusCode::OK {
        trace!(%status, "request accepted");
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: preview(&body),
    })
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            message: preview(&body),
        });
    }

    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
