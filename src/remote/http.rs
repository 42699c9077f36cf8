use super::RemoteApi;
use crate::core::{Bounds, MutationKind, Result, StoreError, ValueSnapshot, snapshot_from_json};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// Response envelope used by every counter endpoint.
#[derive(Debug, Deserialize)]
struct CounterEnvelope {
    success: bool,
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: String,
}

/// `RemoteApi` over the counter REST endpoints.
///
/// | call            | endpoint                                   |
/// |-----------------|--------------------------------------------|
/// | `fetch_current` | `GET  /api/counter`                        |
/// | `save`          | `PUT  /api/counter`                        |
/// | `mutate`        | `POST /api/counter/{increment,decrement,reset}` |
/// | `health`        | `GET  /api/health`                         |
///
/// The stock counter service only exposes the GET and POST routes. `save`
/// needs a server that also accepts `PUT /api/counter` with a
/// `{value, timestamp}` body and answers with the stored snapshot. Against a
/// server without that route every save fails as `RemoteUnavailable`, so the
/// counter stays pending and keeps its state in the local cache.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    bounds: Bounds,
}

impl HttpRemote {
    pub fn new(base_url: &str, bounds: Bounds) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, bounds)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, bounds: Bounds) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bounds,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode(&self, response: reqwest::Response) -> Result<Option<ValueSnapshot>> {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::RemoteUnavailable(format!(
                "remote answered {}",
                status
            )));
        }
        let envelope: CounterEnvelope = response.json().await.map_err(transport)?;
        if !envelope.success {
            return Err(StoreError::RemoteUnavailable(format!(
                "remote reported failure: {}",
                envelope.message
            )));
        }
        envelope
            .data
            .filter(|data| !data.is_null())
            .map(|data| snapshot_from_json(data, &self.bounds))
            .transpose()
    }

    async fn expect_snapshot(&self, response: reqwest::Response) -> Result<ValueSnapshot> {
        self.decode(response).await?.ok_or_else(|| {
            StoreError::MalformedSnapshot("remote response carried no data".to_string())
        })
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::RemoteUnavailable(err.to_string())
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn fetch_current(&self) -> Result<Option<ValueSnapshot>> {
        let response = self
            .client
            .get(self.url("/api/counter"))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.decode(response).await
    }

    async fn save(&self, snapshot: &ValueSnapshot) -> Result<ValueSnapshot> {
        debug!(value = snapshot.value, version = snapshot.version, "saving counter remotely");
        let response = self
            .client
            .put(self.url("/api/counter"))
            .json(snapshot)
            .send()
            .await
            .map_err(transport)?;
        self.expect_snapshot(response).await
    }

    async fn mutate(&self, kind: MutationKind) -> Result<ValueSnapshot> {
        let response = self
            .client
            .post(self.url(&format!("/api/counter/{}", kind.as_str())))
            .send()
            .await
            .map_err(transport)?;
        self.expect_snapshot(response).await
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::RemoteUnavailable(format!(
                "health check answered {}",
                response.status()
            )))
        }
    }
}
