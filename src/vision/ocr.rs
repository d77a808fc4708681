//! Text Recognition Adapter
//!
//! Wraps an OCR engine behind the [`TextRecognizer`] port. Recognition
//! is best-effort, not safety-critical: engine failures and timeouts
//! degrade to empty text and are only logged, never surfaced as errors.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::api::InventoryClient;
use crate::vision::extract::RegionImage;

/// An OCR engine able to read text out of a cropped image region.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Best-effort recognition of the region's text.
    async fn recognize(&self, region: &RegionImage) -> Result<String>;

    /// Engine name, for logging.
    fn name(&self) -> &'static str;
}

/// Run a recognizer with a bounded timeout, degrading every failure
/// mode to an empty string. The capture step never stalls or aborts on
/// recognition problems.
pub async fn recognize_with_timeout(
    recognizer: &dyn TextRecognizer,
    region: &RegionImage,
    limit: Duration,
) -> String {
    match tokio::time::timeout(limit, recognizer.recognize(region)).await {
        Ok(Ok(text)) => text.trim().to_string(),
        Ok(Err(err)) => {
            warn!(
                engine = recognizer.name(),
                box_id = %region.box_id,
                error = %err,
                "recognition failed, treating as empty text"
            );
            String::new()
        }
        Err(_) => {
            warn!(
                engine = recognizer.name(),
                box_id = %region.box_id,
                timeout = ?limit,
                "recognition timed out, treating as empty text"
            );
            String::new()
        }
    }
}

/// Server-side OCR through the inventory backend's image endpoint.
pub struct RemoteOcr {
    client: InventoryClient,
}

impl RemoteOcr {
    pub fn new(client: InventoryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextRecognizer for RemoteOcr {
    async fn recognize(&self, region: &RegionImage) -> Result<String> {
        let png = region.to_png()?;
        let fields = self.client.process_image(png).await?;
        // The endpoint reads the whole crop and reports the field it
        // found; a single region contains one field.
        Ok(fields
            .part_number
            .filter(|s| !s.trim().is_empty())
            .or(fields.vin)
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Recognizer that never reads anything; the operator types the fields.
pub struct NullRecognizer;

#[async_trait]
impl TextRecognizer for NullRecognizer {
    async fn recognize(&self, _region: &RegionImage) -> Result<String> {
        Ok(String::new())
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Scripted recognizer answering by box id, recording what it was asked.
#[cfg(test)]
pub struct ScriptedRecognizer {
    replies: std::collections::HashMap<String, String>,
    failing: std::collections::HashSet<String>,
    delay: Option<Duration>,
    calls: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedRecognizer {
    pub fn new<I, K, V>(replies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            replies: replies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            failing: Default::default(),
            delay: None,
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Make recognition fail for one box id.
    pub fn failing_on(mut self, box_id: &str) -> Self {
        self.failing.insert(box_id.to_string());
        self
    }

    /// Delay every recognition, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Box ids this recognizer was called with.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(&self, region: &RegionImage) -> Result<String> {
        self.calls.lock().push(region.box_id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&region.box_id) {
            anyhow::bail!("scripted engine failure for '{}'", region.box_id);
        }
        Ok(self
            .replies
            .get(&region.box_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(box_id: &str) -> RegionImage {
        RegionImage {
            box_id: box_id.to_string(),
            data: vec![0u8; 16],
            width: 2,
            height: 2,
        }
    }

    #[tokio::test]
    async fn test_recognized_text_is_trimmed() {
        let recognizer = ScriptedRecognizer::new([("part_number", "  LP-9999 \n")]);
        let text =
            recognize_with_timeout(&recognizer, &region("part_number"), Duration::from_secs(5))
                .await;
        assert_eq!(text, "LP-9999");
    }

    #[tokio::test]
    async fn test_engine_failure_degrades_to_empty() {
        let recognizer = ScriptedRecognizer::new([("vin", "ignored")]).failing_on("vin");
        let text =
            recognize_with_timeout(&recognizer, &region("vin"), Duration::from_secs(5)).await;
        assert_eq!(text, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_engine_times_out_to_empty() {
        let recognizer =
            ScriptedRecognizer::new([("vin", "too late")]).with_delay(Duration::from_secs(60));
        let text =
            recognize_with_timeout(&recognizer, &region("vin"), Duration::from_secs(1)).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_null_recognizer_is_always_empty() {
        let text =
            recognize_with_timeout(&NullRecognizer, &region("part_number"), Duration::from_secs(1))
                .await;
        assert_eq!(text, "");
    }
}
