//! Scan Orchestrator
//!
//! Sequences a full part scan: a location context is established first
//! (decoded or typed), then exactly one part entry is taken via barcode
//! or the capture session, previewed and edited, validated, and
//! submitted to the inventory backend. Resetting the location discards
//! whatever capture is in flight.

pub mod barcode;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::InventoryClient;
use crate::config::FieldMapping;
use crate::error::ScanError;
use crate::session::CaptureOutcome;
use crate::vision::REGION_ERROR_SENTINEL;

/// How a part identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMethod {
    Barcode,
    #[serde(rename = "OCR")]
    Ocr,
}

/// A client-side scan record. Mutable only while in the editable
/// preview; submission consumes it, and corrections need a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub part_number: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub scan_method: ScanMethod,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scanned_by: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// The minimal subset of a record the backend accepts. A missing VIN is
/// an explicit null on the wire, never an absent key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitPayload {
    pub part_number: String,
    pub location: String,
    pub vin: Option<String>,
}

/// Drives the location -> part -> preview -> submit workflow.
pub struct ScanOrchestrator {
    location: Option<String>,
    pending: Option<ScanRecord>,
    field_mapping: FieldMapping,
    scanned_by: Option<String>,
}

impl ScanOrchestrator {
    pub fn new(field_mapping: FieldMapping, scanned_by: Option<String>) -> Self {
        Self {
            location: None,
            pending: None,
            field_mapping,
            scanned_by,
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The record awaiting confirmation, if any.
    pub fn pending(&self) -> Option<&ScanRecord> {
        self.pending.as_ref()
    }

    /// Editable access to the preview record.
    pub fn pending_mut(&mut self) -> Option<&mut ScanRecord> {
        self.pending.as_mut()
    }

    /// Establish (or replace) the location context. Any in-progress
    /// part capture is discarded.
    pub fn set_location(&mut self, location: &str) -> Result<(), ScanError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ScanError::ValidationFailed(
                "location must not be empty".to_string(),
            ));
        }
        if self.pending.take().is_some() {
            debug!("location changed, discarding in-progress scan");
        }
        info!(location, "scan location set");
        self.location = Some(location.to_string());
        Ok(())
    }

    /// Clear the location and any in-progress capture.
    pub fn reset_location(&mut self) {
        self.location = None;
        self.pending = None;
    }

    /// Drop the record awaiting confirmation.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Record a barcode-decoded part number as the pending scan.
    pub fn record_barcode(&mut self, part_number: String) -> Result<&ScanRecord, ScanError> {
        let location = self.require_location()?;
        self.require_no_pending()?;

        let record = ScanRecord {
            id: Uuid::new_v4().to_string(),
            part_number,
            location,
            timestamp: Utc::now(),
            scan_method: ScanMethod::Barcode,
            vin: None,
            status: Some("Pending".to_string()),
            scanned_by: self.scanned_by.clone(),
            image_url: None,
        };
        Ok(&*self.pending.insert(record))
    }

    /// Record a confirmed capture-session outcome as the pending scan,
    /// resolving boxes to fields through the configured mapping.
    pub fn record_capture(&mut self, outcome: CaptureOutcome) -> Result<&ScanRecord, ScanError> {
        let location = self.require_location()?;
        self.require_no_pending()?;

        let record = ScanRecord {
            id: Uuid::new_v4().to_string(),
            part_number: field_text(&outcome, &self.field_mapping.part_number_box),
            location,
            // The scan happened when the frame was frozen, not when the
            // operator finished confirming it
            timestamp: outcome.captured_at.unwrap_or_else(Utc::now),
            scan_method: ScanMethod::Ocr,
            vin: normalize_vin(field_text(&outcome, &self.field_mapping.vin_box)),
            status: Some("Pending".to_string()),
            scanned_by: self.scanned_by.clone(),
            image_url: outcome.image_url,
        };
        Ok(&*self.pending.insert(record))
    }

    /// Validate the pending record into a submission payload. Fails
    /// locally with [`ScanError::ValidationFailed`] before any network
    /// traffic when a required field is missing.
    pub fn build_payload(&self) -> Result<SubmitPayload, ScanError> {
        let record = self.pending.as_ref().ok_or_else(|| {
            ScanError::ValidationFailed("no scan awaiting submission".to_string())
        })?;
        if record.part_number.trim().is_empty() {
            return Err(ScanError::ValidationFailed(
                "part number is required".to_string(),
            ));
        }
        if record.location.trim().is_empty() {
            return Err(ScanError::ValidationFailed(
                "location is required".to_string(),
            ));
        }
        Ok(SubmitPayload {
            part_number: record.part_number.trim().to_string(),
            location: record.location.trim().to_string(),
            vin: record
                .vin
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }

    /// Validate and submit the pending record. On success the record is
    /// consumed and returned immutable; on submission failure it stays
    /// pending and editable for a retry without re-capturing.
    pub async fn submit(&mut self, client: &InventoryClient) -> Result<ScanRecord, ScanError> {
        let payload = self.build_payload()?;
        client.submit_scan(&payload).await?;

        let mut record = self.pending.take().ok_or_else(|| {
            ScanError::ValidationFailed("no scan awaiting submission".to_string())
        })?;
        record.status = Some("Completed".to_string());
        info!(part_number = %record.part_number, location = %record.location, "scan submitted");
        Ok(record)
    }

    fn require_location(&self) -> Result<String, ScanError> {
        self.location.clone().ok_or_else(|| {
            ScanError::ValidationFailed("scan a location before scanning parts".to_string())
        })
    }

    fn require_no_pending(&self) -> Result<(), ScanError> {
        if self.pending.is_some() {
            return Err(ScanError::ValidationFailed(
                "a scan is already awaiting confirmation".to_string(),
            ));
        }
        Ok(())
    }
}

/// Box text resolved to a usable field value. Error sentinels mark a
/// failed region and are never valid field content.
fn field_text(outcome: &CaptureOutcome, box_id: &str) -> String {
    match outcome.texts.get(box_id) {
        Some(text) if text != REGION_ERROR_SENTINEL => text.clone(),
        _ => String::new(),
    }
}

/// Empty or whitespace VIN becomes an explicit absence.
fn normalize_vin(vin: String) -> Option<String> {
    let vin = vin.trim().to_string();
    if vin.is_empty() {
        None
    } else {
        Some(vin)
    }
}
