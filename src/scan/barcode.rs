//! Barcode decoding collaborator
//!
//! The decoder continuously examines camera frames and yields the first
//! symbol it reads. Individual misses are normal while the operator
//! lines the barcode up and are ignored; a failure to start the scanner
//! at all ends the scanning session.

use async_trait::async_trait;

use crate::error::ScanError;

/// One poll of the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeAttempt {
    /// A symbol was decoded
    Decoded(String),
    /// Nothing readable in this frame; keep scanning
    Miss,
    /// The scanner could not run (permission, device); session ends
    Fatal(String),
}

/// A continuously scanning barcode reader.
#[async_trait]
pub trait BarcodeDecoder: Send {
    async fn poll(&mut self) -> DecodeAttempt;
}

/// Scan until the first decoded symbol. Transient misses keep the loop
/// going; a fatal start failure is surfaced and ends the session.
pub async fn scan_first(decoder: &mut dyn BarcodeDecoder) -> Result<String, ScanError> {
    loop {
        match decoder.poll().await {
            DecodeAttempt::Decoded(symbol) => return Ok(symbol),
            DecodeAttempt::Miss => continue,
            DecodeAttempt::Fatal(message) => {
                return Err(ScanError::CameraUnavailable(message));
            }
        }
    }
}

/// Decoder double fed a fixed sequence of attempts.
pub struct ScriptedDecoder {
    attempts: std::collections::VecDeque<DecodeAttempt>,
}

impl ScriptedDecoder {
    pub fn new(attempts: impl IntoIterator<Item = DecodeAttempt>) -> Self {
        Self {
            attempts: attempts.into_iter().collect(),
        }
    }

    /// Decoder that immediately yields one symbol.
    pub fn decoding(symbol: &str) -> Self {
        Self::new([DecodeAttempt::Decoded(symbol.to_string())])
    }
}

#[async_trait]
impl BarcodeDecoder for ScriptedDecoder {
    async fn poll(&mut self) -> DecodeAttempt {
        self.attempts
            .pop_front()
            .unwrap_or_else(|| DecodeAttempt::Fatal("decoder exhausted".to_string()))
    }
}
