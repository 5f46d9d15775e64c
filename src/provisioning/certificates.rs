//! # Machine Certificates
//!
//! Self-signed RSA certificates used as column master keys. A generated
//! certificate is installed into a [`CertificateStore`] and referenced from
//! then on only by its thumbprint: the uppercase hex SHA-1 of the DER
//! encoding, matching how the platform certificate store names it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DnType, KeyPair, KeyUsagePurpose, PKCS_RSA_SHA256};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{MAX_CERTIFICATE_VALIDITY_YEARS, MIN_RSA_KEY_BITS};
use crate::error::{FarmError, Result};
use crate::logging::log_provisioning_operation;

const THUMBPRINT_HEX_LEN: usize = 40;

/// One installed certificate with its key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub thumbprint: String,
    pub purpose: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub certificate_pem: String,
    pub public_key_pem: String,
    /// PKCS#8
    pub private_key_pem: String,
}

impl CertificateRecord {
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_pem(&self.public_key_pem)
            .map_err(|e| FarmError::certificate(&self.thumbprint, format!("unreadable public key: {e}")))
    }

    pub fn private_key(&self) -> Result<RsaPrivateKey> {
        RsaPrivateKey::from_pkcs8_pem(&self.private_key_pem)
            .map_err(|e| FarmError::certificate(&self.thumbprint, format!("unreadable private key: {e}")))
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }
}

/// Machine-scoped certificate store
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn install(&self, record: &CertificateRecord) -> Result<()>;

    async fn find(&self, thumbprint: &str) -> Result<Option<CertificateRecord>>;

    /// Returns false when nothing was installed under the thumbprint
    async fn remove(&self, thumbprint: &str) -> Result<bool>;
}

/// Certificate store keeping one JSON record per thumbprint in a directory
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    root: PathBuf,
}

impl FileCertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, thumbprint: &str) -> PathBuf {
        self.root.join(format!("{thumbprint}.json"))
    }
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn install(&self, record: &CertificateRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(self.record_path(&record.thumbprint), json).await?;
        debug!(thumbprint = %record.thumbprint, root = %self.root.display(), "Certificate installed");
        Ok(())
    }

    async fn find(&self, thumbprint: &str) -> Result<Option<CertificateRecord>> {
        let thumbprint = normalize_thumbprint(thumbprint)?;
        match tokio::fs::read(self.record_path(&thumbprint)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, thumbprint: &str) -> Result<bool> {
        let thumbprint = normalize_thumbprint(thumbprint)?;
        match tokio::fs::remove_file(self.record_path(&thumbprint)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Canonical thumbprint form: 40 uppercase hex digits
///
/// Spaces and colons, as copied from certificate viewers, are ignored.
pub fn normalize_thumbprint(value: &str) -> Result<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase();

    if cleaned.len() != THUMBPRINT_HEX_LEN || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FarmError::certificate(
            value,
            format!("thumbprint must be {THUMBPRINT_HEX_LEN} hexadecimal characters"),
        ));
    }
    Ok(cleaned)
}

pub fn thumbprint_of(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}

fn to_offset(at: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp()).map_err(|e| {
        FarmError::certificate("(new)", format!("validity bound {at} cannot be encoded: {e}"))
    })
}

/// Generate a self-signed certificate for `purpose`, install it, return its thumbprint
///
/// Configuration is not touched; callers persist the thumbprint.
pub async fn register_certificate(
    store: &dyn CertificateStore,
    purpose: &str,
    validity_years: u32,
    key_bits: usize,
) -> Result<String> {
    let purpose = purpose.trim();
    if purpose.is_empty() {
        return Err(FarmError::certificate("(new)", "certificate purpose must not be empty"));
    }
    if validity_years == 0 || validity_years > MAX_CERTIFICATE_VALIDITY_YEARS {
        return Err(FarmError::certificate(
            "(new)",
            format!(
                "validity must be between 1 and {MAX_CERTIFICATE_VALIDITY_YEARS} years, got {validity_years}"
            ),
        ));
    }
    if key_bits < MIN_RSA_KEY_BITS {
        return Err(FarmError::certificate(
            "(new)",
            format!("RSA keys must be at least {MIN_RSA_KEY_BITS} bits, got {key_bits}"),
        ));
    }

    let purpose_owned = purpose.to_string();
    let record = tokio::task::spawn_blocking(move || {
        generate_certificate(&purpose_owned, validity_years, key_bits)
    })
    .await
    .map_err(|e| FarmError::certificate("(new)", format!("key generation task failed: {e}")))??;

    store.install(&record).await?;
    log_provisioning_operation("register_certificate", Some(purpose), Some(&record.thumbprint), "installed");
    info!(
        thumbprint = %record.thumbprint,
        purpose = %record.purpose,
        not_after = %record.not_after,
        "Certificate registered"
    );
    Ok(record.thumbprint)
}

fn failed(e: impl std::fmt::Display) -> FarmError {
    FarmError::certificate("(new)", e.to_string())
}

fn generate_certificate(purpose: &str, validity_years: u32, key_bits: usize) -> Result<CertificateRecord> {
    let mut rng = rsa::rand_core::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, key_bits).map_err(failed)?;
    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(failed)?
        .to_string();
    let public_key_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(failed)?;

    let key_pair =
        KeyPair::from_pem_and_sign_algo(&private_key_pem, &PKCS_RSA_SHA256).map_err(failed)?;

    let not_before = Utc::now();
    let not_after = not_before
        .checked_add_signed(Duration::days(i64::from(validity_years) * 365))
        .ok_or_else(|| failed(format!("a validity of {validity_years} years overflows")))?;

    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, purpose);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.not_before = to_offset(not_before)?;
    params.not_after = to_offset(not_after)?;

    let certificate = params.self_signed(&key_pair).map_err(failed)?;

    Ok(CertificateRecord {
        thumbprint: thumbprint_of(certificate.der()),
        purpose: purpose.to_string(),
        not_before,
        not_after,
        certificate_pem: certificate.pem(),
        public_key_pem,
        private_key_pem,
    })
}
