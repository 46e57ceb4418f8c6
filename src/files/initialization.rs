//! `.LAI` initialization file returned by the target hardware.

use super::base::{BaseAuthenticationFile, BaseJson, required};
use super::wire::{StringField, WireReader};
use super::{FileAuthentication, MAX_CRYPTOGRAPHIC_KEY_SIZE, SerializableAuthentication};
use crate::error::{CodecError, CodecResult, Result};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Operation acceptance status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializationStatus {
    Accepted,
    Denied,
    NotSupported,
}

impl InitializationStatus {
    /// Wire value
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Accepted => 0x0001,
            Self::Denied => 0x1000,
            Self::NotSupported => 0x1002,
        }
    }

    /// `None` for codes outside the table
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::Accepted),
            0x1000 => Some(Self::Denied),
            0x1002 => Some(Self::NotSupported),
            _ => None,
        }
    }
}

/// Fixed fields after the base header: status code, key length, description length
const FIXED_FIELDS_SIZE: usize = 2 + 2 + 1;

/// `.LAI` contents: acceptance status, cryptographic key and description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationAuthenticationFile {
    base: BaseAuthenticationFile,
    operation_acceptance_status_code: u16,
    cryptographic_key: Vec<u8>,
    status_description: StringField,
}

impl Default for InitializationAuthenticationFile {
    fn default() -> Self {
        Self::new("", super::DEFAULT_PROTOCOL_VERSION)
    }
}

impl InitializationAuthenticationFile {
    /// Empty file with the length field already set
    #[must_use]
    pub fn new(file_name: impl Into<String>, protocol_version: &str) -> Self {
        let mut file = Self {
            base: BaseAuthenticationFile::new(file_name, protocol_version),
            operation_acceptance_status_code: 0,
            cryptographic_key: Vec::new(),
            status_description: StringField::default(),
        };
        file.refresh_length();
        file
    }

    /// Common header
    #[must_use]
    pub const fn base(&self) -> &BaseAuthenticationFile {
        &self.base
    }

    /// Whether the target accepts the authentication
    #[must_use]
    pub const fn operation_acceptance_status_code(&self) -> u16 {
        self.operation_acceptance_status_code
    }

    /// Set the acceptance status
    pub fn set_operation_acceptance_status_code(&mut self, code: u16) {
        self.operation_acceptance_status_code = code;
    }

    /// Raw key bytes
    #[must_use]
    pub fn cryptographic_key(&self) -> &[u8] {
        &self.cryptographic_key
    }

    /// Key length as written on the wire
    #[must_use]
    pub fn cryptographic_key_length(&self) -> u16 {
        u16::try_from(self.cryptographic_key.len()).unwrap_or(u16::MAX)
    }

    /// Keys longer than 512 bytes are rejected and leave the file untouched
    pub fn set_cryptographic_key(&mut self, key: &[u8]) -> CodecResult<()> {
        if key.len() > MAX_CRYPTOGRAPHIC_KEY_SIZE {
            return Err(CodecError::TooLong {
                field: "cryptographicKey",
                max: MAX_CRYPTOGRAPHIC_KEY_SIZE,
                actual: key.len(),
            });
        }
        self.cryptographic_key = key.to_vec();
        self.refresh_length();
        Ok(())
    }

    /// Description text
    #[must_use]
    pub fn status_description(&self) -> String {
        self.status_description.value()
    }

    /// Stored description length, NUL included
    #[must_use]
    pub fn status_description_length(&self) -> u8 {
        self.status_description.stored_len()
    }

    /// Replace the description and refresh the file length
    pub fn set_status_description(&mut self, description: &str) {
        self.status_description = StringField::new(description);
        self.refresh_length();
    }

    fn refresh_length(&mut self) {
        let size = self.file_size();
        self.base.set_file_length(size);
    }
}

impl FileAuthentication for InitializationAuthenticationFile {
    fn file_size(&self) -> usize {
        self.base.file_size()
            + FIXED_FIELDS_SIZE
            + self.cryptographic_key.len()
            + usize::from(self.status_description.stored_len())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializationJson {
    #[serde(flatten)]
    base: BaseJson,
    operation_acceptance_status_code: Option<u16>,
    cryptographic_key_length: Option<u16>,
    cryptographic_key: Option<String>,
    status_description_length: Option<u8>,
    status_description: Option<String>,
}

impl SerializableAuthentication for InitializationAuthenticationFile {
    fn serialize(&self, out: &mut BytesMut) -> Result<()> {
        out.reserve(self.file_size());
        self.base.put(out);
        out.put_u16(self.operation_acceptance_status_code);
        out.put_u16(self.cryptographic_key_length());
        out.put_slice(&self.cryptographic_key);
        self.status_description.put(out);
        Ok(())
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let base = BaseAuthenticationFile::read(&mut reader)?;
        let operation_acceptance_status_code = reader.u16("operationAcceptanceStatusCode")?;
        let key_length = usize::from(reader.u16("cryptographicKeyLength")?);
        if key_length > MAX_CRYPTOGRAPHIC_KEY_SIZE {
            return Err(CodecError::TooLong {
                field: "cryptographicKey",
                max: MAX_CRYPTOGRAPHIC_KEY_SIZE,
                actual: key_length,
            }
            .into());
        }
        let cryptographic_key = reader.bytes("cryptographicKey", key_length)?;
        let status_description = reader.string("statusDescription")?;

        Ok(Self {
            base,
            operation_acceptance_status_code,
            cryptographic_key,
            status_description,
        })
    }

    fn serialize_json(&self) -> Result<String> {
        let json = InitializationJson {
            base: self.base.to_json(),
            operation_acceptance_status_code: Some(self.operation_acceptance_status_code),
            cryptographic_key_length: Some(self.cryptographic_key_length()),
            cryptographic_key: Some(hex::encode(&self.cryptographic_key)),
            status_description_length: Some(self.status_description_length()),
            status_description: Some(self.status_description()),
        };
        Ok(serde_json::to_string(&json)?)
    }

    fn deserialize_json(json: &str) -> Result<Self> {
        let parsed: InitializationJson = serde_json::from_str(json)?;
        let base = BaseAuthenticationFile::from_json(parsed.base)?;
        let code = required(
            parsed.operation_acceptance_status_code,
            "operationAcceptanceStatusCode",
        )?;
        let key_length = required(parsed.cryptographic_key_length, "cryptographicKeyLength")?;
        let key_hex = required(parsed.cryptographic_key, "cryptographicKey")?;
        let description_length =
            required(parsed.status_description_length, "statusDescriptionLength")?;
        let description = required(parsed.status_description, "statusDescription")?;

        if key_hex.len() != usize::from(key_length) * 2 {
            return Err(CodecError::InvalidField {
                field: "cryptographicKey",
                reason: format!(
                    "expected {} hex digits, got {}",
                    usize::from(key_length) * 2,
                    key_hex.len()
                ),
            }
            .into());
        }
        let key = hex::decode(&key_hex)?;

        let mut file = Self {
            base,
            operation_acceptance_status_code: code,
            cryptographic_key: Vec::new(),
            status_description: StringField::from_json(&description, description_length),
        };
        file.set_cryptographic_key(&key)?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> InitializationAuthenticationFile {
        let mut file = InitializationAuthenticationFile::new("TH_1.LAI", "A4");
        file.set_operation_acceptance_status_code(InitializationStatus::Accepted.code());
        file.set_cryptographic_key(&(1..=16).collect::<Vec<u8>>())
            .unwrap();
        file.set_status_description("Test file");
        file
    }

    #[test]
    fn fresh_file_has_empty_variable_fields() {
        let file = InitializationAuthenticationFile::default();
        assert_eq!(file.file_size(), 11);
        assert_eq!(file.base().file_length(), 11);
        assert_eq!(file.status_description_length(), 0);
    }

    #[test]
    fn file_length_follows_setters() {
        let file = sample();
        assert_eq!(file.file_size(), 37);
        assert_eq!(file.base().file_length(), 37);
        assert_eq!(file.status_description_length(), 10);
    }

    #[test]
    fn oversized_key_leaves_file_unchanged() {
        let mut file = sample();
        let err = file.set_cryptographic_key(&[0u8; 513]).unwrap_err();
        assert!(matches!(err, CodecError::TooLong { actual: 513, .. }));
        assert_eq!(file.cryptographic_key_length(), 16);
        assert_eq!(file.base().file_length(), 37);

        assert!(file.set_cryptographic_key(&[7u8; 512]).is_ok());
        assert_eq!(file.base().file_length(), 37 - 16 + 512);
    }

    #[test]
    fn binary_round_trip() {
        let file = sample();
        let bytes = file.to_bytes().unwrap();
        assert_eq!(bytes.len(), 37);
        assert_eq!(&bytes[..10], &[0, 0, 0, 0x25, b'A', b'4', 0, 1, 0, 0x10]);

        let decoded = InitializationAuthenticationFile::deserialize(&bytes).unwrap();
        assert_eq!(decoded.operation_acceptance_status_code(), 1);
        assert_eq!(decoded.cryptographic_key(), file.cryptographic_key());
        assert_eq!(decoded.status_description(), "Test file");
    }

    #[test]
    fn truncated_key_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        assert!(InitializationAuthenticationFile::deserialize(&bytes[..15]).is_err());
    }

    #[test]
    fn json_uses_lowercase_hex_key() {
        let mut file = InitializationAuthenticationFile::new("TH_1.LAI", "A4");
        file.set_operation_acceptance_status_code(1);
        file.set_cryptographic_key(&[0xAB, 0x01]).unwrap();
        file.set_status_description("ok");

        assert_eq!(
            file.serialize_json().unwrap(),
            concat!(
                r#"{"fileName":"TH_1.LAI","fileLength":16,"protocolVersion":"A4","#,
                r#""operationAcceptanceStatusCode":1,"cryptographicKeyLength":2,"#,
                r#""cryptographicKey":"ab01","statusDescriptionLength":3,"#,
                r#""statusDescription":"ok"}"#
            )
        );
    }

    #[test]
    fn json_rejects_key_length_mismatch() {
        let json = concat!(
            r#"{"fileName":"a","fileLength":16,"protocolVersion":"A4","#,
            r#""operationAcceptanceStatusCode":1,"cryptographicKeyLength":3,"#,
            r#""cryptographicKey":"ab01","statusDescriptionLength":3,"#,
            r#""statusDescription":"ok"}"#
        );
        assert!(InitializationAuthenticationFile::deserialize_json(json).is_err());

        let fixed = json.replace("\"cryptographicKeyLength\":3", "\"cryptographicKeyLength\":2");
        let file = InitializationAuthenticationFile::deserialize_json(&fixed).unwrap();
        assert_eq!(file.cryptographic_key(), &[0xAB, 0x01]);
        assert_eq!(file.base().file_length(), 16);
    }
}
