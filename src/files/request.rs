//! `.LAR` request file sent by the data loader.

use super::base::{BaseAuthenticationFile, BaseJson, required};
use super::wire::{StringField, WireReader};
use super::{FileAuthentication, SerializableAuthentication};
use crate::error::{CodecError, CodecResult, Result};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// One certificate entry: header file name and load part number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadAuthenticationRequestHeaderFile {
    header_file_name: StringField,
    load_part_number_name: StringField,
}

impl LoadAuthenticationRequestHeaderFile {
    /// Both names are required
    pub fn new(header_file_name: &str, load_part_number_name: &str) -> CodecResult<Self> {
        let mut header = Self::default();
        header.set_header_file_name(header_file_name)?;
        header.set_load_part_number_name(load_part_number_name)?;
        Ok(header)
    }

    /// Certificate file name
    #[must_use]
    pub fn header_file_name(&self) -> String {
        self.header_file_name.value()
    }

    /// Stored file name length, NUL included
    #[must_use]
    pub fn header_file_name_length(&self) -> u8 {
        self.header_file_name.stored_len()
    }

    /// Fails on an empty name
    pub fn set_header_file_name(&mut self, name: &str) -> CodecResult<()> {
        if name.is_empty() {
            return Err(CodecError::Empty("headerFileName"));
        }
        self.header_file_name = StringField::new(name);
        Ok(())
    }

    /// Part number of the load
    #[must_use]
    pub fn load_part_number_name(&self) -> String {
        self.load_part_number_name.value()
    }

    /// Stored part number length, NUL included
    #[must_use]
    pub fn load_part_number_name_length(&self) -> u8 {
        self.load_part_number_name.stored_len()
    }

    /// Fails on an empty part number
    pub fn set_load_part_number_name(&mut self, part_number: &str) -> CodecResult<()> {
        if part_number.is_empty() {
            return Err(CodecError::Empty("loadPartNumberName"));
        }
        self.load_part_number_name = StringField::new(part_number);
        Ok(())
    }

    /// Both name and part number are set
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.header_file_name.is_empty() && !self.load_part_number_name.is_empty()
    }

    pub(crate) fn put(&self, out: &mut BytesMut) {
        self.header_file_name.put(out);
        self.load_part_number_name.put(out);
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            header_file_name: reader.string("headerFileName")?,
            load_part_number_name: reader.string("loadPartNumberName")?,
        })
    }

    pub(crate) fn to_json(&self) -> RequestHeaderJson {
        RequestHeaderJson {
            header_file_name_length: Some(self.header_file_name_length()),
            header_file_name: Some(self.header_file_name()),
            load_part_number_name_length: Some(self.load_part_number_name_length()),
            load_part_number_name: Some(self.load_part_number_name()),
        }
    }

    pub(crate) fn from_json(json: RequestHeaderJson) -> CodecResult<Self> {
        required(json.header_file_name_length, "headerFileNameLength")?;
        let name = required(json.header_file_name, "headerFileName")?;
        required(json.load_part_number_name_length, "loadPartNumberNameLength")?;
        let part_number = required(json.load_part_number_name, "loadPartNumberName")?;
        Self::new(&name, &part_number)
    }
}

impl FileAuthentication for LoadAuthenticationRequestHeaderFile {
    fn file_size(&self) -> usize {
        self.header_file_name.wire_size() + self.load_part_number_name.wire_size()
    }
}

impl SerializableAuthentication for LoadAuthenticationRequestHeaderFile {
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
        let parsed: RequestHeaderJson = serde_json::from_str(json)?;
        Ok(Self::from_json(parsed)?)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestHeaderJson {
    pub header_file_name_length: Option<u8>,
    pub header_file_name: Option<String>,
    pub load_part_number_name_length: Option<u8>,
    pub load_part_number_name: Option<String>,
}

/// Request file listing the certificates the target hardware must check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAuthenticationRequestFile {
    base: BaseAuthenticationFile,
    header_files: Vec<LoadAuthenticationRequestHeaderFile>,
}

impl Default for LoadAuthenticationRequestFile {
    fn default() -> Self {
        Self::new("", super::DEFAULT_PROTOCOL_VERSION)
    }
}

impl LoadAuthenticationRequestFile {
    /// Request without entries
    #[must_use]
    pub fn new(file_name: impl Into<String>, protocol_version: &str) -> Self {
        let mut file = Self {
            base: BaseAuthenticationFile::new(file_name, protocol_version),
            header_files: Vec::new(),
        };
        file.refresh_length();
        file
    }

    /// Common header
    #[must_use]
    pub const fn base(&self) -> &BaseAuthenticationFile {
        &self.base
    }

    /// Entry count as written on the wire
    #[must_use]
    pub fn number_of_header_files(&self) -> u16 {
        u16::try_from(self.header_files.len()).unwrap_or(u16::MAX)
    }

    /// Entries in request order
    #[must_use]
    pub fn header_files(&self) -> &[LoadAuthenticationRequestHeaderFile] {
        &self.header_files
    }

    /// Append an entry; incomplete entries are rejected
    pub fn add_header_file(&mut self, header: LoadAuthenticationRequestHeaderFile) -> CodecResult<()> {
        if header.header_file_name.is_empty() {
            return Err(CodecError::Empty("headerFileName"));
        }
        if header.load_part_number_name.is_empty() {
            return Err(CodecError::Empty("loadPartNumberName"));
        }
        if self.header_files.len() >= usize::from(u16::MAX) {
            return Err(CodecError::TooLong {
                field: "headerFiles",
                max: usize::from(u16::MAX),
                actual: self.header_files.len() + 1,
            });
        }
        self.header_files.push(header);
        self.refresh_length();
        Ok(())
    }

    fn refresh_length(&mut self) {
        let size = self.file_size();
        self.base.set_file_length(size);
    }
}

impl FileAuthentication for LoadAuthenticationRequestFile {
    fn file_size(&self) -> usize {
        self.base.file_size()
            + 2
            + self
                .header_files
                .iter()
                .map(FileAuthentication::file_size)
                .sum::<usize>()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestJson {
    #[serde(flatten)]
    base: BaseJson,
    number_of_header_files: Option<u16>,
    header_files: Option<Vec<RequestHeaderJson>>,
}

impl SerializableAuthentication for LoadAuthenticationRequestFile {
    fn serialize(&self, out: &mut BytesMut) -> Result<()> {
        out.reserve(self.file_size());
        self.base.put(out);
        out.put_u16(self.number_of_header_files());
        for header in &self.header_files {
            header.put(out);
        }
        Ok(())
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let base = BaseAuthenticationFile::read(&mut reader)?;
        let count = reader.u16("numberOfHeaderFiles")?;
        let header_files = (0..count)
            .map(|_| LoadAuthenticationRequestHeaderFile::read(&mut reader))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self { base, header_files })
    }

    fn serialize_json(&self) -> Result<String> {
        let json = RequestJson {
            base: self.base.to_json(),
            number_of_header_files: Some(self.number_of_header_files()),
            header_files: Some(self.header_files.iter().map(LoadAuthenticationRequestHeaderFile::to_json).collect()),
        };
        Ok(serde_json::to_string(&json)?)
    }

    fn deserialize_json(json: &str) -> Result<Self> {
        let parsed: RequestJson = serde_json::from_str(json)?;
        let base = BaseAuthenticationFile::from_json(parsed.base)?;
        let declared = required(parsed.number_of_header_files, "numberOfHeaderFiles")?;
        let headers = required(parsed.header_files, "headerFiles")?;
        if headers.len() != usize::from(declared) {
            return Err(CodecError::CountMismatch {
                declared: usize::from(declared),
                actual: headers.len(),
            }
            .into());
        }

        let header_files = headers
            .into_iter()
            .map(LoadAuthenticationRequestHeaderFile::from_json)
            .collect::<CodecResult<Vec<_>>>()?;
        let mut file = Self { base, header_files };
        file.refresh_length();
        Ok(file)
    }
}
