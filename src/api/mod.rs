//! Inventory backend client
//!
//! Thin JSON wrappers over the remote inventory API. Every request
//! carries the proxy interstitial skip header (the backend is fronted by
//! an ngrok tunnel in the field). Read calls fall back to a local
//! fixture store when the backend is unreachable so the tool remains
//! usable offline; writes never fall back.

pub mod fixtures;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write as _;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::scan::SubmitPayload;

pub use fixtures::FallbackStore;

/// Header suppressing the ngrok browser interstitial on every call.
const PROXY_SKIP_HEADER: &str = "ngrok-skip-browser-warning";

/// A scan record as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRow {
    pub id: i64,
    pub part_number: String,
    pub location: String,
    pub date_added: String,
    #[serde(default)]
    pub scan_type: Option<String>,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub scanned_by: Option<String>,
    #[serde(default)]
    pub scan_method: Option<String>,
}

/// Fields the server-side OCR endpoint extracted from an image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrFields {
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
}

#[derive(Deserialize)]
struct VehicleEnvelope {
    vehicle: Value,
}

#[derive(Deserialize, Default)]
struct PartsEnvelope {
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct VehiclesEnvelope {
    #[serde(default)]
    vehicles: Vec<Value>,
}

/// Client for the inventory backend.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: String,
    fallback: Option<FallbackStore>,
}

impl InventoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(PROXY_SKIP_HEADER, HeaderValue::from_static("true"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback: None,
        })
    }

    /// Attach the fixture store serving read calls when the backend is
    /// down.
    pub fn with_fallback(mut self, fallback: FallbackStore) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /scans?limit=N`
    pub async fn list_scans(&self, limit: u32) -> Result<Vec<ScanRow>> {
        let result: Result<Vec<ScanRow>> = async {
            let resp = self
                .http
                .get(self.url(&format!("/scans?limit={limit}")))
                .send()
                .await?;
            Ok(Self::expect_success(resp).await?.json().await?)
        }
        .await;

        match result {
            Ok(rows) => Ok(rows),
            Err(err) => match &self.fallback {
                Some(store) => {
                    warn!(error = %err, "scan list unavailable, serving local fixture");
                    Ok(store.sample_scans())
                }
                None => Err(err),
            },
        }
    }

    /// `GET /vehicle/{vin}`
    pub async fn vehicle_by_vin(&self, vin: &str) -> Result<Value> {
        let result: Result<Value> = async {
            let resp = self.http.get(self.url(&format!("/vehicle/{vin}"))).send().await?;
            let envelope: VehicleEnvelope = Self::expect_success(resp).await?.json().await?;
            Ok(envelope.vehicle)
        }
        .await;

        match result {
            Ok(vehicle) => Ok(vehicle),
            Err(err) => match &self.fallback {
                Some(store) => {
                    warn!(error = %err, "vehicle lookup unavailable, serving local fixture");
                    Ok(store.sample_vehicle(vin))
                }
                None => Err(err),
            },
        }
    }

    /// `GET /vehicle/{vin}/parts`
    pub async fn parts_by_vin(&self, vin: &str) -> Result<Vec<Value>> {
        self.read_parts(&format!("/vehicle/{vin}/parts")).await
    }

    /// `GET /parts/{part_number}`
    pub async fn parts_by_part_number(&self, part_number: &str) -> Result<Vec<Value>> {
        self.read_parts(&format!("/parts/{part_number}")).await
    }

    async fn read_parts(&self, path: &str) -> Result<Vec<Value>> {
        let result: Result<Vec<Value>> = async {
            let resp = self.http.get(self.url(path)).send().await?;
            let envelope: PartsEnvelope = Self::expect_success(resp).await?.json().await?;
            Ok(envelope.parts)
        }
        .await;

        match result {
            Ok(parts) => Ok(parts),
            Err(err) => match &self.fallback {
                Some(store) => {
                    warn!(error = %err, "parts lookup unavailable, serving local fixture");
                    Ok(store.sample_parts())
                }
                None => Err(err),
            },
        }
    }

    /// `GET /part/{part_number}/vehicles`
    pub async fn vehicles_by_part_number(&self, part_number: &str) -> Result<Vec<Value>> {
        let result: Result<Vec<Value>> = async {
            let resp = self
                .http
                .get(self.url(&format!("/part/{part_number}/vehicles")))
                .send()
                .await?;
            let envelope: VehiclesEnvelope = Self::expect_success(resp).await?.json().await?;
            Ok(envelope.vehicles)
        }
        .await;

        match result {
            Ok(vehicles) => Ok(vehicles),
            Err(err) => match &self.fallback {
                Some(store) => {
                    warn!(error = %err, "vehicle lookup unavailable, serving local fixture");
                    Ok(store.sample_vehicles())
                }
                None => Err(err),
            },
        }
    }

    /// `POST /send_scan`. Never falls back: a failed write surfaces as
    /// [`ScanError::SubmissionFailed`] with the backend's message, and
    /// the record stays resubmittable.
    pub async fn submit_scan(&self, payload: &SubmitPayload) -> Result<(), ScanError> {
        let resp = self
            .http
            .post(self.url("/send_scan"))
            .json(payload)
            .send()
            .await
            .map_err(|err| ScanError::SubmissionFailed(format!("network error: {err}")))?;

        if resp.status().is_success() {
            debug!(part_number = %payload.part_number, "scan submitted");
            Ok(())
        } else {
            Err(ScanError::SubmissionFailed(
                Self::failure_message(resp).await,
            ))
        }
    }

    /// `DELETE /scan/{id}` (204 on success)
    pub async fn delete_scan(&self, id: i64) -> Result<()> {
        self.delete(&format!("/scan/{id}")).await
    }

    /// `DELETE /part/number/{part_number}` (204 on success)
    pub async fn delete_part(&self, part_number: &str) -> Result<()> {
        self.delete(&format!("/part/number/{part_number}")).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp = self.http.delete(self.url(path)).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            anyhow::bail!(Self::failure_message(resp).await)
        }
    }

    /// `POST /ocr/process_image` with a multipart PNG upload.
    pub async fn process_image(&self, png: Vec<u8>) -> Result<OcrFields> {
        let part = Part::bytes(png)
            .file_name("region.png")
            .mime_str("image/png")?;
        let form = Form::new().part("image", part);

        let resp = self
            .http
            .post(self.url("/ocr/process_image"))
            .multipart(form)
            .send()
            .await?;
        Ok(Self::expect_success(resp).await?.json().await?)
    }

    /// `GET /admin/reports/generate_inventory_excel`, streamed to disk.
    pub async fn download_inventory_report(&self, out_path: &Path) -> Result<()> {
        let resp = self
            .http
            .get(self.url("/admin/reports/generate_inventory_excel"))
            .send()
            .await
            .context("Failed to request inventory report")?;
        let resp = Self::expect_success(resp).await?;

        let temp_path = out_path.with_extension("tmp");
        let mut file =
            std::fs::File::create(&temp_path).context("Failed to create report file")?;

        let mut downloaded: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading report stream")?;
            file.write_all(&chunk)
                .context("Failed to write report chunk")?;
            downloaded += chunk.len() as u64;
        }
        file.flush().context("Failed to flush report file")?;
        drop(file);

        std::fs::rename(&temp_path, out_path)
            .context("Failed to move report to final location")?;

        info!(bytes = downloaded, path = %out_path.display(), "inventory report saved");
        Ok(())
    }

    /// 204 is success-with-no-body; other non-2xx statuses become an
    /// error carrying the body's `message` field when one exists.
    async fn expect_success(resp: Response) -> Result<Response> {
        if resp.status() == StatusCode::NO_CONTENT || resp.status().is_success() {
            Ok(resp)
        } else {
            anyhow::bail!(Self::failure_message(resp).await)
        }
    }

    async fn failure_message(resp: Response) -> String {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match parse_message(&body) {
            Some(message) => message,
            None if body.trim().is_empty() => format!("request failed with status {status}"),
            None => format!("request failed with status {status}: {body}"),
        }
    }
}

/// Pull a human-readable `message` field out of a JSON error body.
fn parse_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}
