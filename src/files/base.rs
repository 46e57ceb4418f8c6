//! Common header shared by every authentication file.

use super::wire::WireReader;
use super::{DEFAULT_PROTOCOL_VERSION, FileAuthentication, PROTOCOL_VERSION_SIZE, SerializableAuthentication};
use crate::error::{CodecError, CodecResult, Result};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Serialized size of the common header
pub const BASE_FILE_SIZE: usize = 4 + PROTOCOL_VERSION_SIZE;

/// `fileLength` + `protocolVersion`, plus the file name kept for JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAuthenticationFile {
    file_name: String,
    file_length: u32,
    protocol_version: [u8; PROTOCOL_VERSION_SIZE],
}

impl Default for BaseAuthenticationFile {
    fn default() -> Self {
        Self::new("", DEFAULT_PROTOCOL_VERSION)
    }
}

impl BaseAuthenticationFile {
    /// A shorter version is NUL padded, a longer one truncated
    #[must_use]
    pub fn new(file_name: impl Into<String>, protocol_version: &str) -> Self {
        Self {
            file_name: file_name.into(),
            file_length: u32::try_from(BASE_FILE_SIZE).unwrap_or_default(),
            protocol_version: pack_version(protocol_version),
        }
    }

    /// Name the file travels under; not part of the wire format
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Rename the file
    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
    }

    /// Declared total size in bytes
    #[must_use]
    pub const fn file_length(&self) -> u32 {
        self.file_length
    }

    pub(crate) fn set_file_length(&mut self, size: usize) {
        self.file_length = u32::try_from(size).unwrap_or(u32::MAX);
    }

    /// Protocol version up to the first NUL
    #[must_use]
    pub fn protocol_version(&self) -> String {
        let end = self
            .protocol_version
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(PROTOCOL_VERSION_SIZE);
        String::from_utf8_lossy(&self.protocol_version[..end]).into_owned()
    }

    pub(crate) fn put(&self, out: &mut BytesMut) {
        out.put_u32(self.file_length);
        out.put_slice(&self.protocol_version);
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let file_length = reader.u32("fileLength")?;
        let version = reader.bytes("protocolVersion", PROTOCOL_VERSION_SIZE)?;
        let mut protocol_version = [0u8; PROTOCOL_VERSION_SIZE];
        protocol_version.copy_from_slice(&version);
        Ok(Self {
            file_name: String::new(),
            file_length,
            protocol_version,
        })
    }

    pub(crate) fn to_json(&self) -> BaseJson {
        BaseJson {
            file_name: Some(self.file_name.clone()),
            file_length: Some(self.file_length),
            protocol_version: Some(self.protocol_version()),
        }
    }

    pub(crate) fn from_json(json: BaseJson) -> CodecResult<Self> {
        let file_name = required(json.file_name, "fileName")?;
        let file_length = required(json.file_length, "fileLength")?;
        let version = required(json.protocol_version, "protocolVersion")?;
        Ok(Self {
            file_name,
            file_length,
            protocol_version: pack_version(&version),
        })
    }
}

fn pack_version(version: &str) -> [u8; PROTOCOL_VERSION_SIZE] {
    let mut packed = [0u8; PROTOCOL_VERSION_SIZE];
    let bytes = version.as_bytes();
    let len = bytes.len().min(PROTOCOL_VERSION_SIZE);
    packed[..len].copy_from_slice(&bytes[..len]);
    packed
}

pub(crate) fn required<T>(value: Option<T>, field: &'static str) -> CodecResult<T> {
    value.ok_or(CodecError::MissingField(field))
}

/// JSON keys shared by every file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BaseJson {
    pub file_name: Option<String>,
    pub file_length: Option<u32>,
    pub protocol_version: Option<String>,
}

impl FileAuthentication for BaseAuthenticationFile {
    fn file_size(&self) -> usize {
        BASE_FILE_SIZE
    }
}

impl SerializableAuthentication for BaseAuthenticationFile {
    fn serialize(&self, out: &mut BytesMut) -> Result<()> {
        self.put(out);
        Ok(())
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut WireReader::new(data))?)
    }

    fn serialize_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    fn deserialize_json(json: &str) -> Result<Self> {
        let parsed: BaseJson = serde_json::from_str(json)?;
        Ok(Self::from_json(parsed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadAuthError;
    use pretty_assertions::assert_eq;

    #[test]
    fn fresh_base_serializes_six_bytes() {
        let base = BaseAuthenticationFile::new("", "A4");
        let bytes = base.to_bytes().unwrap();
        assert_eq!(&bytes[..], &[0x00, 0x00, 0x00, 0x06, b'A', b'4']);
        assert_eq!(base.file_size(), 6);
    }

    #[test]
    fn protocol_version_is_padded_or_truncated() {
        assert_eq!(BaseAuthenticationFile::new("a", "7").protocol_version(), "7");
        assert_eq!(BaseAuthenticationFile::new("a", "A4B").protocol_version(), "A4");
        assert_eq!(BaseAuthenticationFile::default().protocol_version(), "01");
    }

    #[test]
    fn json_keeps_key_order() {
        let base = BaseAuthenticationFile::new("TH_1.LAI", "A4");
        assert_eq!(
            base.serialize_json().unwrap(),
            r#"{"fileName":"TH_1.LAI","fileLength":6,"protocolVersion":"A4"}"#
        );
    }

    #[test]
    fn json_round_trip_and_missing_key() {
        let base = BaseAuthenticationFile::deserialize_json(
            r#"{"fileName":"x","fileLength":9,"protocolVersion":"A4"}"#,
        )
        .unwrap();
        assert_eq!(base.file_length(), 9);
        assert_eq!(base.file_name(), "x");

        let err = BaseAuthenticationFile::deserialize_json(r#"{"fileName":"x","fileLength":9}"#)
            .unwrap_err();
        assert!(matches!(err, LoadAuthError::Codec { .. }));
        assert!(err.to_string().contains("protocolVersion"));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        assert!(BaseAuthenticationFile::deserialize(&[0, 0, 0]).is_err());
        assert!(BaseAuthenticationFile::deserialize(&[0, 0, 0, 6, b'A']).is_err());
    }
}
