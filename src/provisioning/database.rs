//! # Database Provisioning
//!
//! Runs the dataset setup scripts against a target database and records the
//! resulting connection descriptor in the farm configuration.
//!
//! For the encrypted variant the certificate is resolved and validated before
//! any statement is sent, so a bad thumbprint never leaves a half-created
//! dataset behind. Partially created objects from other failures are not
//! rolled back: every script is guarded, and re-running is the recovery path.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::certificates::{normalize_thumbprint, CertificateStore};
use super::key_wrapping::{generate_column_key, to_sql_binary_literal, wrap_column_key};
use super::scripts;
use crate::error::{FarmError, Result};
use crate::logging::log_provisioning_operation;
use crate::models::{ConnectionDescriptor, Dataset};
use crate::orchestration::FarmOrchestrator;

/// Executes T-SQL batches against one target database
///
/// Implementations own the connection and the acting credentials.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, batch: &str) -> Result<()>;
}

/// Column encryption parameters for an encrypted dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEncryption {
    /// Column encryption key name; the master key is named after it
    pub key_name: String,
    pub thumbprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub dataset: Dataset,
    pub server: String,
    pub database: String,
    /// Service account to create and grant, if any
    pub account: Option<String>,
    pub encryption: Option<ColumnEncryption>,
}

impl ProvisionRequest {
    pub fn plain(dataset: Dataset, server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            dataset,
            server: server.into(),
            database: database.into(),
            account: None,
            encryption: None,
        }
    }

    pub fn encrypted(
        dataset: Dataset,
        server: impl Into<String>,
        database: impl Into<String>,
        key_name: impl Into<String>,
        thumbprint: impl Into<String>,
    ) -> Self {
        Self {
            encryption: Some(ColumnEncryption {
                key_name: key_name.into(),
                thumbprint: thumbprint.into(),
            }),
            ..Self::plain(dataset, server, database)
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

/// Integrated-security connection string for a provisioned database
pub fn connection_string(server: &str, database: &str, encrypted: bool) -> String {
    let mut value = format!(
        "Persist Security Info=False;Integrated Security=SSPI;Initial Catalog={database};Data Source={server}"
    );
    if encrypted {
        value.push_str(";Column Encryption Setting=enabled");
    }
    value
}

/// Everything the encrypted variant needs, resolved before any statement runs
struct PreparedEncryption {
    key_name: String,
    thumbprint: String,
    encrypted_value: String,
}

pub struct DatabaseProvisioner {
    executor: Arc<dyn SqlExecutor>,
    certificates: Arc<dyn CertificateStore>,
}

impl DatabaseProvisioner {
    pub fn new(executor: Arc<dyn SqlExecutor>, certificates: Arc<dyn CertificateStore>) -> Self {
        Self {
            executor,
            certificates,
        }
    }

    /// Provision the dataset and persist its connection descriptor
    pub async fn provision(
        &self,
        orchestrator: &FarmOrchestrator,
        request: &ProvisionRequest,
    ) -> Result<ConnectionDescriptor> {
        let target = format!("{}/{}", request.server, request.database);
        Self::validate(request)?;
        orchestrator.ensure_configuration().await?;

        let prepared = match &request.encryption {
            Some(encryption) => Some(self.prepare_encryption(encryption).await?),
            None => None,
        };
        log_provisioning_operation(
            "provision_database",
            Some(&target),
            prepared.as_ref().map(|p| p.thumbprint.as_str()),
            "started",
        );

        if let Some(account) = &request.account {
            self.ensure_principal(account).await;
        }

        if let Some(prepared) = &prepared {
            self.run(
                "column master key",
                &scripts::column_master_key_script(&prepared.key_name, &prepared.thumbprint),
            )
            .await?;
            self.run(
                "column encryption key",
                &scripts::column_encryption_key_script(&prepared.key_name, &prepared.encrypted_value),
            )
            .await?;
            if let Some(account) = &request.account {
                self.run("grant", &scripts::grant_column_key_permission(account))
                    .await?;
            }
        }

        let key_name = prepared.as_ref().map(|p| p.key_name.as_str());
        self.run("schema", &scripts::schema_script(request.dataset, key_name))
            .await?;

        let descriptor = ConnectionDescriptor {
            connection_string: connection_string(
                &request.server,
                &request.database,
                prepared.is_some(),
            ),
            is_encrypted: prepared.is_some(),
            key_name: prepared.as_ref().map(|p| p.key_name.clone()),
            thumbprint: prepared.as_ref().map(|p| p.thumbprint.clone()),
        };

        let dataset = request.dataset;
        let persisted = descriptor.clone();
        orchestrator
            .update_and_write(move |configuration| {
                configuration.hosts.set_descriptor(dataset, persisted)
            })
            .await?;

        log_provisioning_operation(
            "provision_database",
            Some(&target),
            descriptor.thumbprint.as_deref(),
            "completed",
        );
        info!(
            dataset = %request.dataset,
            target = %target,
            encrypted = descriptor.is_encrypted,
            "Database provisioned"
        );
        Ok(descriptor)
    }

    fn validate(request: &ProvisionRequest) -> Result<()> {
        if request.server.trim().is_empty() {
            return Err(FarmError::provisioning("validate", "server name is empty"));
        }
        if request.database.trim().is_empty() {
            return Err(FarmError::provisioning("validate", "database name is empty"));
        }
        if let Some(encryption) = &request.encryption {
            if encryption.key_name.trim().is_empty() {
                return Err(FarmError::provisioning(
                    "validate",
                    "column encryption key name is empty",
                ));
            }
        }
        Ok(())
    }

    async fn prepare_encryption(&self, encryption: &ColumnEncryption) -> Result<PreparedEncryption> {
        let thumbprint = normalize_thumbprint(&encryption.thumbprint)?;
        let record = self.certificates.find(&thumbprint).await?.ok_or_else(|| {
            FarmError::certificate(&thumbprint, "not found in the machine certificate store")
        })?;
        if record.is_expired_at(Utc::now()) {
            return Err(FarmError::certificate(
                &thumbprint,
                format!("expired on {}", record.not_after.to_rfc3339()),
            ));
        }

        let private_key = record.private_key()?;
        let column_key = generate_column_key();
        let wrapped = wrap_column_key(&private_key, &thumbprint, &column_key)?;

        Ok(PreparedEncryption {
            key_name: encryption.key_name.trim().to_string(),
            thumbprint,
            encrypted_value: to_sql_binary_literal(&wrapped),
        })
    }

    /// Login, user and role statements; failures are expected when the
    /// acting principal already owns the database
    async fn ensure_principal(&self, account: &str) {
        for statement in scripts::principal_scripts(account) {
            if let Err(e) = self.executor.execute(&statement).await {
                debug!(account = %account, error = %e, "Principal statement skipped");
            }
        }
    }

    async fn run(&self, step: &str, batch: &str) -> Result<()> {
        self.executor
            .execute(batch)
            .await
            .map_err(|e| FarmError::provisioning(step, e.to_string()))
    }
}
