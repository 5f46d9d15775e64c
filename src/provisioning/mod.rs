//! # Encrypted Provisioning
//!
//! Certificate generation, column encryption key wrapping and idempotent
//! script-based setup of the registration and secret-key datasets.

pub mod certificates;
pub mod database;
pub mod key_wrapping;
pub mod scripts;

pub use certificates::{
    normalize_thumbprint, register_certificate, CertificateRecord, CertificateStore,
    FileCertificateStore,
};
pub use database::{
    connection_string, ColumnEncryption, DatabaseProvisioner, ProvisionRequest, SqlExecutor,
};
pub use key_wrapping::{unwrap_column_key, wrap_column_key};
