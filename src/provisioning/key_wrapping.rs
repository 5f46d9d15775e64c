//! Column encryption key wrapping
//!
//! A random 256-bit column encryption key is encrypted under the column
//! master key certificate and packed in the encrypted-value layout the
//! database engine expects:
//!
//! ```text
//! 0x01 | path len u16 LE | ciphertext len u16 LE | key path (UTF-16LE, lowercase)
//!      | RSA-OAEP(SHA-1) ciphertext | RSA PKCS#1 v1.5 signature of SHA-256(preceding bytes)
//! ```

use rand::RngCore;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::constants::COLUMN_MASTER_KEY_PATH_PREFIX;
use crate::error::{FarmError, Result};

const LAYOUT_VERSION: u8 = 0x01;
pub const COLUMN_KEY_LEN: usize = 32;

/// Certificate-store path of a column master key, as written in the CMK statement
pub fn column_master_key_path(thumbprint: &str) -> String {
    format!("{COLUMN_MASTER_KEY_PATH_PREFIX}{thumbprint}")
}

pub fn generate_column_key() -> [u8; COLUMN_KEY_LEN] {
    let mut key = [0u8; COLUMN_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn utf16le(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

/// Wrap `column_key` under the certificate identified by `thumbprint`
pub fn wrap_column_key(
    private_key: &RsaPrivateKey,
    thumbprint: &str,
    column_key: &[u8],
) -> Result<Vec<u8>> {
    let failed = |message: String| FarmError::certificate(thumbprint, message);

    let key_path = utf16le(&column_master_key_path(thumbprint).to_lowercase());
    let ciphertext = private_key
        .to_public_key()
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), column_key)
        .map_err(|e| failed(format!("column key encryption failed: {e}")))?;

    let path_len = u16::try_from(key_path.len())
        .map_err(|_| failed("key path too long".to_string()))?;
    let ciphertext_len = u16::try_from(ciphertext.len())
        .map_err(|_| failed("ciphertext too long".to_string()))?;

    let mut value = Vec::with_capacity(5 + key_path.len() + ciphertext.len() * 2);
    value.push(LAYOUT_VERSION);
    value.extend_from_slice(&path_len.to_le_bytes());
    value.extend_from_slice(&ciphertext_len.to_le_bytes());
    value.extend_from_slice(&key_path);
    value.extend_from_slice(&ciphertext);

    let digest = Sha256::digest(&value);
    let signature = private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| failed(format!("encrypted value signing failed: {e}")))?;
    value.extend_from_slice(&signature);

    Ok(value)
}

/// Verify and unwrap an encrypted value; the inverse of [`wrap_column_key`]
pub fn unwrap_column_key(private_key: &RsaPrivateKey, thumbprint: &str, value: &[u8]) -> Result<Vec<u8>> {
    let failed = |message: &str| FarmError::certificate(thumbprint, message);

    if value.len() < 5 || value[0] != LAYOUT_VERSION {
        return Err(failed("encrypted value has an unknown layout"));
    }
    let path_len = u16::from_le_bytes([value[1], value[2]]) as usize;
    let ciphertext_len = u16::from_le_bytes([value[3], value[4]]) as usize;
    let signed_len = 5 + path_len + ciphertext_len;
    if value.len() <= signed_len {
        return Err(failed("encrypted value is truncated"));
    }

    let public_key: RsaPublicKey = private_key.to_public_key();
    let digest = Sha256::digest(&value[..signed_len]);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &value[signed_len..])
        .map_err(|_| failed("encrypted value signature does not match the certificate"))?;

    let expected_path = utf16le(&column_master_key_path(thumbprint).to_lowercase());
    if value[5..5 + path_len] != expected_path[..] {
        return Err(failed("encrypted value was wrapped for a different key path"));
    }

    private_key
        .decrypt(Oaep::new::<Sha1>(), &value[5 + path_len..signed_len])
        .map_err(|_| failed("column key decryption failed"))
}

/// `0x…` literal for embedding in a T-SQL statement
pub fn to_sql_binary_literal(value: &[u8]) -> String {
    format!("0x{}", hex::encode_upper(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const THUMBPRINT: &str = "A94A8FE5CCB19BA61C4C0873D391E987982FBBD3";

    fn key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap()
    }

    #[test]
    fn test_wrapped_layout() {
        let private_key = key();
        let column_key = generate_column_key();
        let value = wrap_column_key(&private_key, THUMBPRINT, &column_key).unwrap();

        let path = "localmachine/my/a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
        let path_bytes = path.len() * 2;
        assert_eq!(value[0], 0x01);
        assert_eq!(u16::from_le_bytes([value[1], value[2]]) as usize, path_bytes);
        assert_eq!(u16::from_le_bytes([value[3], value[4]]), 256);
        assert_eq!(value.len(), 5 + path_bytes + 256 + 256);
        assert_eq!(&value[5..7], &[b'l', 0]);

        let unwrapped = unwrap_column_key(&private_key, THUMBPRINT, &value).unwrap();
        assert_eq!(unwrapped, column_key);
    }

    #[test]
    fn test_tampered_value_is_rejected() {
        let private_key = key();
        let mut value = wrap_column_key(&private_key, THUMBPRINT, &generate_column_key()).unwrap();
        let last = value.len() - 300;
        value[last] ^= 0xff;
        let err = unwrap_column_key(&private_key, THUMBPRINT, &value).unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn test_sql_binary_literal() {
        assert_eq!(to_sql_binary_literal(&[0x01, 0xab]), "0x01AB");
    }
}
