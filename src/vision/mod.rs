//! Vision Layer
//!
//! Turns one captured frame into per-region text: display-to-frame
//! coordinate mapping, region cropping, preprocessing, and best-effort
//! recognition. Per-region failures degrade to an error sentinel so a
//! capture step always completes with something the operator can edit.

pub mod extract;
pub mod geometry;
pub mod ocr;
pub mod preprocess;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::capture::{DisplayGeometry, Frame};
use crate::config::{BoundingBox, PreprocessSettings};

pub use ocr::{NullRecognizer, RemoteOcr, TextRecognizer};

/// Placeholder text for a region whose geometry or extraction failed.
/// Shown in the editable preview; never a valid field value.
pub const REGION_ERROR_SENTINEL: &str = "<region error>";

/// Field-extraction pipeline for captured frames.
pub struct CapturePipeline {
    recognizer: Arc<dyn TextRecognizer>,
    preprocess: PreprocessSettings,
    ocr_timeout: Duration,
}

impl CapturePipeline {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        preprocess: PreprocessSettings,
        ocr_timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            preprocess,
            ocr_timeout,
        }
    }

    /// Process every configured box against one frame.
    ///
    /// Always returns an entry per box: recognized text (possibly
    /// empty), or [`REGION_ERROR_SENTINEL`] when mapping or cropping
    /// failed for that box alone. Recognition runs concurrently across
    /// boxes and the step completes only after all of them settle.
    pub async fn process(
        &self,
        frame: &Frame,
        display: &DisplayGeometry,
        boxes: &[BoundingBox],
    ) -> HashMap<String, String> {
        let start = std::time::Instant::now();
        let mut results = HashMap::new();
        let mut regions = Vec::new();

        for bbox in boxes {
            let rect = match geometry::map_to_frame(frame.width(), frame.height(), display, bbox)
            {
                Ok(rect) => rect,
                Err(err) => {
                    warn!(box_id = %bbox.id, error = %err, "region mapping failed");
                    results.insert(bbox.id.clone(), REGION_ERROR_SENTINEL.to_string());
                    continue;
                }
            };

            match extract::extract_region(frame, &bbox.id, &rect) {
                Ok(region) => {
                    regions.push(preprocess::prepare_region(region, &self.preprocess))
                }
                Err(err) => {
                    warn!(box_id = %bbox.id, error = %err, "region extraction failed");
                    results.insert(bbox.id.clone(), REGION_ERROR_SENTINEL.to_string());
                }
            }
        }

        let recognizer = self.recognizer.as_ref();
        let jobs = regions.into_iter().map(|region| async move {
            let text = ocr::recognize_with_timeout(recognizer, &region, self.ocr_timeout).await;
            (region.box_id, text)
        });
        for (box_id, text) in join_all(jobs).await {
            results.insert(box_id, text);
        }

        debug!(
            engine = recognizer.name(),
            boxes = boxes.len(),
            elapsed = ?start.elapsed(),
            "capture step processed"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoxUnits;
    use ocr::ScriptedRecognizer;

    fn bbox(id: &str, x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        BoundingBox {
            id: id.to_string(),
            x,
            y,
            width: w,
            height: h,
            units: BoxUnits::Pixels,
        }
    }

    /// Frame and display of identical 100x100 geometry: identity mapping.
    fn frame() -> (Frame, DisplayGeometry) {
        (
            Frame::new(vec![128u8; 100 * 100 * 4], 100, 100),
            DisplayGeometry {
                width: 100,
                height: 100,
            },
        )
    }

    fn pipeline(recognizer: ScriptedRecognizer) -> CapturePipeline {
        CapturePipeline::new(
            Arc::new(recognizer),
            PreprocessSettings {
                enabled: false,
                ..PreprocessSettings::default()
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_all_boxes_recognized() {
        let (frame, display) = frame();
        let recognizer = Arc::new(ScriptedRecognizer::new([
            ("part_number", "LP-9999"),
            ("vin", "1HGCM82633A123456"),
        ]));
        let pipeline = CapturePipeline::new(
            recognizer.clone(),
            PreprocessSettings {
                enabled: false,
                ..PreprocessSettings::default()
            },
            Duration::from_secs(5),
        );
        let boxes = [
            bbox("part_number", 10.0, 10.0, 40.0, 20.0),
            bbox("vin", 10.0, 50.0, 80.0, 20.0),
        ];

        let results = pipeline.process(&frame, &display, &boxes).await;

        assert_eq!(results["part_number"], "LP-9999");
        assert_eq!(results["vin"], "1HGCM82633A123456");
        let mut calls = recognizer.calls();
        calls.sort();
        assert_eq!(calls, ["part_number", "vin"]);
    }

    #[tokio::test]
    async fn test_out_of_bounds_box_degrades_alone() {
        let (frame, display) = frame();
        let recognizer = ScriptedRecognizer::new([("part_number", "LP-9999")]);
        let pipeline = pipeline(recognizer);
        let boxes = [
            bbox("part_number", 10.0, 10.0, 40.0, 20.0),
            bbox("vin", 90.0, 90.0, 40.0, 20.0), // hangs off the frame
        ];

        let results = pipeline.process(&frame, &display, &boxes).await;

        assert_eq!(results["part_number"], "LP-9999");
        assert_eq!(results["vin"], REGION_ERROR_SENTINEL);
    }

    #[tokio::test]
    async fn test_empty_recognition_still_completes() {
        let (frame, display) = frame();
        let pipeline = pipeline(ScriptedRecognizer::new::<[(&str, &str); 0], _, _>([]));
        let boxes = [
            bbox("part_number", 10.0, 10.0, 40.0, 20.0),
            bbox("vin", 10.0, 50.0, 80.0, 20.0),
        ];

        let results = pipeline.process(&frame, &display, &boxes).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["part_number"], "");
        assert_eq!(results["vin"], "");
    }

    #[tokio::test]
    async fn test_zero_display_marks_every_box() {
        let frame = Frame::new(vec![0u8; 100 * 100 * 4], 100, 100);
        let display = DisplayGeometry {
            width: 0,
            height: 0,
        };
        let pipeline = pipeline(ScriptedRecognizer::new([("part_number", "unused")]));
        let boxes = [bbox("part_number", 10.0, 10.0, 40.0, 20.0)];

        let results = pipeline.process(&frame, &display, &boxes).await;
        assert_eq!(results["part_number"], REGION_ERROR_SENTINEL);
    }
}
