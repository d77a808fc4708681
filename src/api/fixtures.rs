//! Local fixture dataset for disconnected operation
//!
//! When the backend is unreachable, read-type calls serve this fixed
//! sample so the history and search views stay populated. Injected into
//! the client as a capability, not reached for implicitly.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::ScanRow;

/// Read-through fixture store used when backend reads fail.
#[derive(Debug, Clone, Default)]
pub struct FallbackStore;

impl FallbackStore {
    /// Sample scan history.
    pub fn sample_scans(&self) -> Vec<ScanRow> {
        let now = Utc::now();
        vec![
            ScanRow {
                id: 1,
                part_number: "LP-2456".to_string(),
                location: "WH-A123".to_string(),
                date_added: (now - Duration::minutes(30)).to_rfc3339(),
                scan_type: Some("part".to_string()),
                vin: None,
                scanned_by: Some("John Doe".to_string()),
                scan_method: Some("Barcode".to_string()),
            },
            ScanRow {
                id: 2,
                part_number: "LP-7890".to_string(),
                location: "WH-B456".to_string(),
                date_added: (now - Duration::hours(2)).to_rfc3339(),
                scan_type: Some("part".to_string()),
                vin: Some("1HGCM82633A123456".to_string()),
                scanned_by: Some("Jane Smith".to_string()),
                scan_method: Some("OCR".to_string()),
            },
            ScanRow {
                id: 3,
                part_number: "LP-1234".to_string(),
                location: "WH-C789".to_string(),
                date_added: (now - Duration::hours(5)).to_rfc3339(),
                scan_type: Some("part".to_string()),
                vin: None,
                scanned_by: Some("John Doe".to_string()),
                scan_method: Some("Barcode".to_string()),
            },
            ScanRow {
                id: 4,
                part_number: "LP-5678".to_string(),
                location: "WH-A123".to_string(),
                date_added: (now - Duration::days(1)).to_rfc3339(),
                scan_type: Some("part".to_string()),
                vin: Some("5XYZU3LB5DG123456".to_string()),
                scanned_by: Some("Jane Smith".to_string()),
                scan_method: Some("OCR".to_string()),
            },
        ]
    }

    /// Sample vehicle for VIN lookups.
    pub fn sample_vehicle(&self, vin: &str) -> Value {
        json!({
            "vin": vin,
            "make": "Honda",
            "model": "Accord",
            "year": 2003,
            "status": "dismantled"
        })
    }

    /// Sample parts list for VIN or part-number lookups.
    pub fn sample_parts(&self) -> Vec<Value> {
        vec![
            json!({"part_number": "LP-2456", "name": "Left headlamp", "condition": "good"}),
            json!({"part_number": "LP-7890", "name": "Door mirror", "condition": "fair"}),
        ]
    }

    /// Sample vehicles list for part-number lookups.
    pub fn sample_vehicles(&self) -> Vec<Value> {
        vec![json!({
            "vin": "1HGCM82633A123456",
            "make": "Honda",
            "model": "Accord",
            "year": 2003
        })]
    }
}
