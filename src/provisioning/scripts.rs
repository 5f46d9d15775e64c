//! T-SQL templates for the registration and secret-key datasets
//!
//! Every statement is guarded with an existence check so a failed
//! provisioning run can simply be repeated.

use crate::constants::COLUMN_MASTER_KEY_STORE_PROVIDER;
use crate::models::Dataset;

use super::key_wrapping::column_master_key_path;

const ENCRYPTION_ALGORITHM: &str = "AEAD_AES_256_CBC_HMAC_SHA_256";

/// Brackets an identifier, escaping closing brackets
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Single-quoted N'' literal
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Column master key name derived from the column key name
pub fn master_key_name(key_name: &str) -> String {
    format!("{key_name}_CMK")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encryption {
    Deterministic,
    Randomized,
}

struct Column {
    name: &'static str,
    definition: &'static str,
    encryption: Option<Encryption>,
}

const fn plain(name: &'static str, definition: &'static str) -> Column {
    Column {
        name,
        definition,
        encryption: None,
    }
}

const fn encrypted(name: &'static str, definition: &'static str, encryption: Encryption) -> Column {
    Column {
        name,
        definition,
        encryption: Some(encryption),
    }
}

const REGISTRATION_COLUMNS: &[Column] = &[
    plain("ID", "BIGINT IDENTITY(1,1) NOT NULL"),
    plain("UPN", "NVARCHAR(256) NOT NULL"),
    encrypted("MAILADDRESS", "NVARCHAR(256) NULL", Encryption::Deterministic),
    encrypted("PHONENUMBER", "NVARCHAR(50) NULL", Encryption::Deterministic),
    plain("CREATIONDATE", "DATETIME NOT NULL DEFAULT GETUTCDATE()"),
    plain("METHOD", "INT NOT NULL DEFAULT 0"),
    plain("OVERRIDE", "NVARCHAR(1024) NULL"),
    plain("ENABLED", "BIT NOT NULL DEFAULT 1"),
    encrypted("PIN", "NVARCHAR(64) NULL", Encryption::Randomized),
];

const KEY_COLUMNS: &[Column] = &[
    plain("ID", "BIGINT IDENTITY(1,1) NOT NULL"),
    plain("UPN", "NVARCHAR(256) NOT NULL"),
    encrypted("SECRETKEY", "NVARCHAR(MAX) NULL", Encryption::Randomized),
    plain("VALIDFROM", "DATETIME NOT NULL DEFAULT GETUTCDATE()"),
    plain("VALIDTO", "DATETIME NULL"),
];

fn columns(dataset: Dataset) -> &'static [Column] {
    match dataset {
        Dataset::Registrations => REGISTRATION_COLUMNS,
        Dataset::SecretKeys => KEY_COLUMNS,
    }
}

fn render_column(column: &Column, key_name: Option<&str>) -> String {
    match (column.encryption, key_name) {
        (Some(encryption), Some(key_name)) => {
            let (kind, collation) = match encryption {
                Encryption::Deterministic => ("DETERMINISTIC", " COLLATE Latin1_General_BIN2"),
                Encryption::Randomized => ("RANDOMIZED", ""),
            };
            // Deterministic character columns need a BIN2 collation
            let (type_part, nullability) = split_nullability(column.definition);
            format!(
                "{} {}{} ENCRYPTED WITH (COLUMN_ENCRYPTION_KEY = {}, ENCRYPTION_TYPE = {kind}, ALGORITHM = '{ENCRYPTION_ALGORITHM}') {}",
                column.name,
                type_part,
                collation,
                quote_identifier(key_name),
                nullability
            )
        }
        _ => format!("{} {}", column.name, column.definition),
    }
}

fn split_nullability(definition: &str) -> (&str, &str) {
    for marker in [" NOT NULL", " NULL"] {
        if let Some(index) = definition.find(marker) {
            return (&definition[..index], definition[index + 1..].trim());
        }
    }
    (definition, "")
}

/// `CREATE TABLE` and `UPN` index for a dataset, plain when `key_name` is `None`
pub fn schema_script(dataset: Dataset, key_name: Option<&str>) -> String {
    let table = dataset.table_name();
    let columns = columns(dataset)
        .iter()
        .map(|column| format!("    {}", render_column(column, key_name)))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "IF NOT EXISTS (SELECT * FROM sys.tables WHERE name = {name})
BEGIN
CREATE TABLE [dbo].{table_id} (
{columns},
    CONSTRAINT {pk} PRIMARY KEY CLUSTERED (ID ASC)
);
END;
IF NOT EXISTS (SELECT * FROM sys.indexes WHERE name = {index_name})
BEGIN
CREATE UNIQUE NONCLUSTERED INDEX {index_id} ON [dbo].{table_id} (UPN ASC);
END;",
        name = quote_literal(table),
        table_id = quote_identifier(table),
        pk = quote_identifier(&format!("PK_{table}")),
        index_name = quote_literal(&format!("IX_{table}_UPN")),
        index_id = quote_identifier(&format!("IX_{table}_UPN")),
    )
}

/// `CREATE COLUMN MASTER KEY` pointing at the machine certificate
pub fn column_master_key_script(key_name: &str, thumbprint: &str) -> String {
    let cmk = master_key_name(key_name);
    format!(
        "IF NOT EXISTS (SELECT * FROM sys.column_master_keys WHERE name = {name})
BEGIN
CREATE COLUMN MASTER KEY {id} WITH (KEY_STORE_PROVIDER_NAME = {provider}, KEY_PATH = {path});
END;",
        name = quote_literal(&cmk),
        id = quote_identifier(&cmk),
        provider = quote_literal(COLUMN_MASTER_KEY_STORE_PROVIDER),
        path = quote_literal(&column_master_key_path(thumbprint)),
    )
}

/// `CREATE COLUMN ENCRYPTION KEY` with the wrapped value as a binary literal
pub fn column_encryption_key_script(key_name: &str, encrypted_value_literal: &str) -> String {
    format!(
        "IF NOT EXISTS (SELECT * FROM sys.column_encryption_keys WHERE name = {name})
BEGIN
CREATE COLUMN ENCRYPTION KEY {id} WITH VALUES (COLUMN_MASTER_KEY = {cmk}, ALGORITHM = 'RSA_OAEP', ENCRYPTED_VALUE = {encrypted_value_literal});
END;",
        name = quote_literal(key_name),
        id = quote_identifier(key_name),
        cmk = quote_identifier(&master_key_name(key_name)),
    )
}

/// Login, user and role membership for the service account
///
/// These fail harmlessly when the account already owns the database.
pub fn principal_scripts(account: &str) -> Vec<String> {
    let name = quote_literal(account);
    let id = quote_identifier(account);
    vec![
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.server_principals WHERE name = {name})
BEGIN
CREATE LOGIN {id} FROM WINDOWS WITH DEFAULT_DATABASE = [master];
END;"
        ),
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.database_principals WHERE name = {name})
BEGIN
CREATE USER {id} FOR LOGIN {id};
END;"
        ),
        format!("ALTER ROLE [db_owner] ADD MEMBER {id};"),
    ]
}

/// The one permission beyond role membership that key management needs
pub fn grant_column_key_permission(account: &str) -> String {
    format!(
        "GRANT ALTER ANY COLUMN ENCRYPTION KEY TO {};",
        quote_identifier(account)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_schema_has_no_encryption_clause() {
        let script = schema_script(Dataset::Registrations, None);
        assert!(script.contains("CREATE TABLE [dbo].[REGISTRATIONS]"));
        assert!(script.contains("IF NOT EXISTS (SELECT * FROM sys.tables WHERE name = N'REGISTRATIONS')"));
        assert!(script.contains("MAILADDRESS NVARCHAR(256) NULL"));
        assert!(!script.contains("ENCRYPTED WITH"));
    }

    #[test]
    fn test_encrypted_schema_uses_key_and_collation() {
        let script = schema_script(Dataset::SecretKeys, Some("MFA_CEK"));
        assert!(script.contains("CREATE TABLE [dbo].[KEYS]"));
        assert!(script.contains(
            "SECRETKEY NVARCHAR(MAX) ENCRYPTED WITH (COLUMN_ENCRYPTION_KEY = [MFA_CEK], ENCRYPTION_TYPE = RANDOMIZED, ALGORITHM = 'AEAD_AES_256_CBC_HMAC_SHA_256') NULL"
        ));

        let registrations = schema_script(Dataset::Registrations, Some("MFA_CEK"));
        assert!(registrations.contains(
            "MAILADDRESS NVARCHAR(256) COLLATE Latin1_General_BIN2 ENCRYPTED WITH"
        ));
        assert!(registrations.contains("UPN NVARCHAR(256) NOT NULL,"));
    }

    #[test]
    fn test_key_scripts() {
        let cmk = column_master_key_script("MFA_CEK", "A94A8FE5CCB19BA61C4C0873D391E987982FBBD3");
        assert!(cmk.contains("CREATE COLUMN MASTER KEY [MFA_CEK_CMK]"));
        assert!(cmk.contains("KEY_PATH = N'LocalMachine/My/A94A8FE5CCB19BA61C4C0873D391E987982FBBD3'"));
        assert!(cmk.contains("N'MSSQL_CERTIFICATE_STORE'"));

        let cek = column_encryption_key_script("MFA_CEK", "0x01AB");
        assert!(cek.contains("COLUMN_MASTER_KEY = [MFA_CEK_CMK]"));
        assert!(cek.contains("ENCRYPTED_VALUE = 0x01AB"));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        assert_eq!(quote_identifier("a]b"), "[a]]b]");
        assert_eq!(quote_literal("o'brien"), "N'o''brien'");
        let scripts = principal_scripts(r"CORP\svc-mfa");
        assert_eq!(scripts.len(), 3);
        assert!(scripts[0].contains(r"CREATE LOGIN [CORP\svc-mfa] FROM WINDOWS"));
    }
}
