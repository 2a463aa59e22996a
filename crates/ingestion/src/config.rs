//! Runtime configuration for the ingestion pipeline.

use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use archive_reader::DEFAULT_MEMBER_SIZE_LIMIT;

use crate::error::{IngestionError, Result};
use crate::metrics::DEFAULT_PASS_RATE_THRESHOLD;

/// Cipher key the device firmware ships with. Deployments override it via
/// `ARCHIVE_KEY_B64`.
pub const DEFAULT_CIPHER_KEY: &[u8; 16] = b"pulse-device-k01";
/// Cipher IV the device firmware ships with. Overridden via
/// `ARCHIVE_IV_B64`.
pub const DEFAULT_CIPHER_IV: &[u8; 16] = b"pulse-device-iv0";

const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;
const DEFAULT_REINGEST_PARALLELISM: usize = 4;

/// Configuration for one ingester instance.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Decryption key for encrypted members.
    pub cipher_key: Vec<u8>,
    /// Decryption IV for encrypted members.
    pub cipher_iv: Vec<u8>,
    /// Per-member uncompressed size ceiling in bytes.
    pub member_size_limit: u64,
    /// Pass-rate threshold below which a statistics row flags the
    /// measurement.
    pub pass_rate_threshold: f64,
    /// How long an upload may stay incomplete before it is failed.
    pub upload_timeout: Duration,
    /// Parallel archives during bulk re-ingestion.
    pub reingest_parallelism: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cipher_key: DEFAULT_CIPHER_KEY.to_vec(),
            cipher_iv: DEFAULT_CIPHER_IV.to_vec(),
            member_size_limit: DEFAULT_MEMBER_SIZE_LIMIT,
            pass_rate_threshold: DEFAULT_PASS_RATE_THRESHOLD,
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            reingest_parallelism: DEFAULT_REINGEST_PARALLELISM,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables, falling back to the
    /// firmware defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(key) = env::var("ARCHIVE_KEY_B64") {
            config.cipher_key = decode_b64("ARCHIVE_KEY_B64", &key)?;
        }
        if let Ok(iv) = env::var("ARCHIVE_IV_B64") {
            config.cipher_iv = decode_b64("ARCHIVE_IV_B64", &iv)?;
        }
        if let Ok(limit) = env::var("MEMBER_SIZE_LIMIT_BYTES") {
            config.member_size_limit = parse_var("MEMBER_SIZE_LIMIT_BYTES", &limit)?;
        }
        if let Ok(threshold) = env::var("PASS_RATE_THRESHOLD") {
            config.pass_rate_threshold = parse_var("PASS_RATE_THRESHOLD", &threshold)?;
        }
        if let Ok(secs) = env::var("UPLOAD_TIMEOUT_SECS") {
            config.upload_timeout = Duration::from_secs(parse_var("UPLOAD_TIMEOUT_SECS", &secs)?);
        }
        if let Ok(parallelism) = env::var("REINGEST_PARALLELISM") {
            config.reingest_parallelism = parse_var("REINGEST_PARALLELISM", &parallelism)?;
        }

        Ok(config)
    }
}

fn decode_b64(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value.as_bytes())
        .map_err(|e| IngestionError::InvalidConfig(format!("{name}: {e}")))
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IngestionError::InvalidConfig(format!("{name}: cannot parse '{value}'")))
}
