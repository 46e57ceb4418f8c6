//! `.LAS` status file uploaded periodically by the target hardware.

use super::base::{BaseAuthenticationFile, BaseJson, required};
use super::request::{LoadAuthenticationRequestHeaderFile, RequestHeaderJson};
use super::wire::{StringField, WireReader, put_u24};
use super::{FileAuthentication, SerializableAuthentication};
use crate::error::{CodecError, CodecResult, Result};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Authentication operation status codes carried by `.LAS` files and their headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationStatus {
    Accepted,
    InProgress,
    Completed,
    InProgressWithDescription,
    AbortedByTheTargetHardware,
    AbortedInTheTargetDlRequest,
    AbortedInTheTargetOpRequest,
    HeaderFileFailed,
}

impl AuthenticationStatus {
    /// Wire value
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Accepted => 0x0001,
            Self::InProgress => 0x0002,
            Self::Completed => 0x0003,
            Self::InProgressWithDescription => 0x0004,
            Self::AbortedByTheTargetHardware => 0x1003,
            Self::AbortedInTheTargetDlRequest => 0x1004,
            Self::AbortedInTheTargetOpRequest => 0x1005,
            Self::HeaderFileFailed => 0x1007,
        }
    }

    /// `None` for codes outside the table
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::Accepted),
            0x0002 => Some(Self::InProgress),
            0x0003 => Some(Self::Completed),
            0x0004 => Some(Self::InProgressWithDescription),
            0x1003 => Some(Self::AbortedByTheTargetHardware),
            0x1004 => Some(Self::AbortedInTheTargetDlRequest),
            0x1005 => Some(Self::AbortedInTheTargetOpRequest),
            0x1007 => Some(Self::HeaderFileFailed),
            _ => None,
        }
    }

    /// One of the three abort codes
    #[must_use]
    pub const fn is_abort(self) -> bool {
        matches!(
            self,
            Self::AbortedByTheTargetHardware
                | Self::AbortedInTheTargetDlRequest
                | Self::AbortedInTheTargetOpRequest
        )
    }
}

/// Per certificate progress entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadAuthenticationStatusHeaderFile {
    header: LoadAuthenticationRequestHeaderFile,
    load_ratio: u32,
    load_status: u16,
    load_status_description: StringField,
}

impl LoadAuthenticationStatusHeaderFile {
    /// Entry with zero ratio and status
    pub fn new(header_file_name: &str, load_part_number_name: &str) -> CodecResult<Self> {
        Ok(Self {
            header: LoadAuthenticationRequestHeaderFile::new(header_file_name, load_part_number_name)?,
            ..Self::default()
        })
    }

    /// Certificate file name
    #[must_use]
    pub fn header_file_name(&self) -> String {
        self.header.header_file_name()
    }

    /// Stored file name length, NUL included
    #[must_use]
    pub fn header_file_name_length(&self) -> u8 {
        self.header.header_file_name_length()
    }

    /// Fails on an empty name
    pub fn set_header_file_name(&mut self, name: &str) -> CodecResult<()> {
        self.header.set_header_file_name(name)
    }

    /// Part number of the load
    #[must_use]
    pub fn load_part_number_name(&self) -> String {
        self.header.load_part_number_name()
    }

    /// Stored part number length, NUL included
    #[must_use]
    pub fn load_part_number_name_length(&self) -> u8 {
        self.header.load_part_number_name_length()
    }

    /// Fails on an empty part number
    pub fn set_load_part_number_name(&mut self, part_number: &str) -> CodecResult<()> {
        self.header.set_load_part_number_name(part_number)
    }

    /// 24-bit ratio; higher bits are dropped on the wire
    #[must_use]
    pub const fn load_ratio(&self) -> u32 {
        self.load_ratio
    }

    /// Progress of this certificate in percent
    pub fn set_load_ratio(&mut self, ratio: u32) {
        self.load_ratio = ratio;
    }

    /// Status code of this certificate
    #[must_use]
    pub const fn load_status(&self) -> u16 {
        self.load_status
    }

    /// Set the certificate status code
    pub fn set_load_status(&mut self, status: u16) {
        self.load_status = status;
    }

    /// Description of the certificate status
    #[must_use]
    pub fn load_status_description(&self) -> String {
        self.load_status_description.value()
    }

    /// Stored description length, NUL included
    #[must_use]
    pub fn load_status_description_length(&self) -> u8 {
        self.load_status_description.stored_len()
    }

    /// Empty descriptions are allowed and store a single NUL
    pub fn set_load_status_description(&mut self, description: &str) {
        self.load_status_description = StringField::new(description);
    }

    fn put(&self, out: &mut BytesMut) {
        self.header.put(out);
        put_u24(out, self.load_ratio);
        out.put_u16(self.load_status);
        self.load_status_description.put(out);
    }

    fn read(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            header: LoadAuthenticationRequestHeaderFile::read(reader)?,
            load_ratio: reader.u24("loadRatio")?,
            load_status: reader.u16("loadStatus")?,
            load_status_description: reader.string("loadStatusDescription")?,
        })
    }

    fn to_json(&self) -> StatusHeaderJson {
        StatusHeaderJson {
            header: self.header.to_json(),
            load_ratio: Some(self.load_ratio),
            load_status: Some(self.load_status),
            load_status_description_length: Some(self.load_status_description_length()),
            load_status_description: Some(self.load_status_description()),
        }
    }

    fn from_json(json: StatusHeaderJson) -> CodecResult<Self> {
        let header = LoadAuthenticationRequestHeaderFile::from_json(json.header)?;
        let load_ratio = required(json.load_ratio, "loadRatio")?;
        let load_status = required(json.load_status, "loadStatus")?;
        let description_length = required(
            json.load_status_description_length,
            "loadStatusDescriptionLength",
        )?;
        let description = required(json.load_status_description, "loadStatusDescription")?;
        Ok(Self {
            header,
            load_ratio,
            load_status,
            load_status_description: StringField::from_json(&description, description_length),
        })
    }
}

impl FileAuthentication for LoadAuthenticationStatusHeaderFile {
    fn file_size(&self) -> usize {
        self.header.file_size() + 3 + 2 + self.load_status_description.wire_size()
    }
}

impl SerializableAuthentication for LoadAuthenticationStatusHeaderFile {
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
        let parsed: StatusHeaderJson = serde_json::from_str(json)?;
        Ok(Self::from_json(parsed)?)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusHeaderJson {
    #[serde(flatten)]
    header: RequestHeaderJson,
    load_ratio: Option<u32>,
    load_status: Option<u16>,
    load_status_description_length: Option<u8>,
    load_status_description: Option<String>,
}

/// status code, description length, counter, exception timer, estimated time,
/// load list ratio, header count
const FIXED_FIELDS_SIZE: usize = 2 + 1 + 2 + 2 + 2 + 3 + 2;

/// `.LAS` contents: overall progress followed by one entry per certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAuthenticationStatusFile {
    base: BaseAuthenticationFile,
    authentication_operation_status_code: u16,
    authentication_status_description: StringField,
    counter: u16,
    exception_timer: u16,
    estimated_time: u16,
    load_list_ratio: u32,
    header_files: Vec<LoadAuthenticationStatusHeaderFile>,
}

impl Default for LoadAuthenticationStatusFile {
    fn default() -> Self {
        Self::new("", super::DEFAULT_PROTOCOL_VERSION)
    }
}

impl LoadAuthenticationStatusFile {
    /// Status without entries
    #[must_use]
    pub fn new(file_name: impl Into<String>, protocol_version: &str) -> Self {
        let mut file = Self {
            base: BaseAuthenticationFile::new(file_name, protocol_version),
            authentication_operation_status_code: 0,
            authentication_status_description: StringField::default(),
            counter: 0,
            exception_timer: 0,
            estimated_time: 0,
            load_list_ratio: 0,
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

    /// Overall status code
    #[must_use]
    pub const fn authentication_operation_status_code(&self) -> u16 {
        self.authentication_operation_status_code
    }

    /// Set the overall status code
    pub fn set_authentication_operation_status_code(&mut self, code: u16) {
        self.authentication_operation_status_code = code;
    }

    /// Overall description
    #[must_use]
    pub fn authentication_status_description(&self) -> String {
        self.authentication_status_description.value()
    }

    /// Stored description length, NUL included
    #[must_use]
    pub fn authentication_status_description_length(&self) -> u8 {
        self.authentication_status_description.stored_len()
    }

    /// Replace the description and refresh the file length
    pub fn set_authentication_status_description(&mut self, description: &str) {
        self.authentication_status_description = StringField::new(description);
        self.refresh_length();
    }

    /// Sequence number of this status
    #[must_use]
    pub const fn counter(&self) -> u16 {
        self.counter
    }

    /// Set the sequence number
    pub fn set_counter(&mut self, counter: u16) {
        self.counter = counter;
    }

    /// Exception timer in seconds
    #[must_use]
    pub const fn exception_timer(&self) -> u16 {
        self.exception_timer
    }

    /// Set the exception timer
    pub fn set_exception_timer(&mut self, timer: u16) {
        self.exception_timer = timer;
    }

    /// Estimated seconds to completion
    #[must_use]
    pub const fn estimated_time(&self) -> u16 {
        self.estimated_time
    }

    /// Set the estimated time
    pub fn set_estimated_time(&mut self, estimated: u16) {
        self.estimated_time = estimated;
    }

    /// Progress over all certificates in percent
    #[must_use]
    pub const fn load_list_ratio(&self) -> u32 {
        self.load_list_ratio
    }

    /// Set the overall progress
    pub fn set_load_list_ratio(&mut self, ratio: u32) {
        self.load_list_ratio = ratio;
    }

    /// Entry count as written on the wire
    #[must_use]
    pub fn number_of_header_files(&self) -> u16 {
        u16::try_from(self.header_files.len()).unwrap_or(u16::MAX)
    }

    /// Entries in request order
    #[must_use]
    pub fn header_files(&self) -> &[LoadAuthenticationStatusHeaderFile] {
        &self.header_files
    }

    /// Append an entry; incomplete entries are rejected
    pub fn add_header_file(&mut self, header: LoadAuthenticationStatusHeaderFile) -> CodecResult<()> {
        if !header.header.is_complete() {
            return Err(CodecError::Empty("headerFileName/loadPartNumberName"));
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

impl FileAuthentication for LoadAuthenticationStatusFile {
    fn file_size(&self) -> usize {
        self.base.file_size()
            + FIXED_FIELDS_SIZE
            + usize::from(self.authentication_status_description.stored_len())
            + self
                .header_files
                .iter()
                .map(FileAuthentication::file_size)
                .sum::<usize>()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusJson {
    #[serde(flatten)]
    base: BaseJson,
    authentication_operation_status_code: Option<u16>,
    authentication_status_description_length: Option<u8>,
    authentication_status_description: Option<String>,
    counter: Option<u16>,
    exception_timer: Option<u16>,
    estimated_time: Option<u16>,
    load_list_ratio: Option<u32>,
    number_of_header_files: Option<u16>,
    header_files: Option<Vec<StatusHeaderJson>>,
}

impl SerializableAuthentication for LoadAuthenticationStatusFile {
    fn serialize(&self, out: &mut BytesMut) -> Result<()> {
        out.reserve(self.file_size());
        self.base.put(out);
        out.put_u16(self.authentication_operation_status_code);
        self.authentication_status_description.put(out);
        out.put_u16(self.counter);
        out.put_u16(self.exception_timer);
        out.put_u16(self.estimated_time);
        put_u24(out, self.load_list_ratio);
        out.put_u16(self.number_of_header_files());
        for header in &self.header_files {
            header.put(out);
        }
        Ok(())
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let base = BaseAuthenticationFile::read(&mut reader)?;
        let authentication_operation_status_code =
            reader.u16("authenticationOperationStatusCode")?;
        let authentication_status_description =
            reader.string("authenticationStatusDescription")?;
        let counter = reader.u16("counter")?;
        let exception_timer = reader.u16("exceptionTimer")?;
        let estimated_time = reader.u16("estimatedTime")?;
        let load_list_ratio = reader.u24("loadListRatio")?;
        let count = reader.u16("numberOfHeaderFiles")?;
        let header_files = (0..count)
            .map(|_| LoadAuthenticationStatusHeaderFile::read(&mut reader))
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(Self {
            base,
            authentication_operation_status_code,
            authentication_status_description,
            counter,
            exception_timer,
            estimated_time,
            load_list_ratio,
            header_files,
        })
    }

    fn serialize_json(&self) -> Result<String> {
        let json = StatusJson {
            base: self.base.to_json(),
            authentication_operation_status_code: Some(self.authentication_operation_status_code),
            authentication_status_description_length: Some(
                self.authentication_status_description_length(),
            ),
            authentication_status_description: Some(self.authentication_status_description()),
            counter: Some(self.counter),
            exception_timer: Some(self.exception_timer),
            estimated_time: Some(self.estimated_time),
            load_list_ratio: Some(self.load_list_ratio),
            number_of_header_files: Some(self.number_of_header_files()),
            header_files: Some(
                self.header_files
                    .iter()
                    .map(LoadAuthenticationStatusHeaderFile::to_json)
                    .collect(),
            ),
        };
        Ok(serde_json::to_string(&json)?)
    }

    fn deserialize_json(json: &str) -> Result<Self> {
        let parsed: StatusJson = serde_json::from_str(json)?;
        let base = BaseAuthenticationFile::from_json(parsed.base)?;
        let code = required(
            parsed.authentication_operation_status_code,
            "authenticationOperationStatusCode",
        )?;
        let description_length = required(
            parsed.authentication_status_description_length,
            "authenticationStatusDescriptionLength",
        )?;
        let description = required(
            parsed.authentication_status_description,
            "authenticationStatusDescription",
        )?;
        let counter = required(parsed.counter, "counter")?;
        let exception_timer = required(parsed.exception_timer, "exceptionTimer")?;
        let estimated_time = required(parsed.estimated_time, "estimatedTime")?;
        let load_list_ratio = required(parsed.load_list_ratio, "loadListRatio")?;
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
            .map(LoadAuthenticationStatusHeaderFile::from_json)
            .collect::<CodecResult<Vec<_>>>()?;

        let mut file = Self {
            base,
            authentication_operation_status_code: code,
            authentication_status_description: StringField::from_json(
                &description,
                description_length,
            ),
            counter,
            exception_timer,
            estimated_time,
            load_list_ratio,
            header_files,
        };
        file.refresh_length();
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn status_header() -> LoadAuthenticationStatusHeaderFile {
        let mut header =
            LoadAuthenticationStatusHeaderFile::new("TEST_FILE1.TEST", "TEST_PART_NUMBER1").unwrap();
        header.set_load_ratio(42);
        header.set_load_status(0x4242);
        header.set_load_status_description("TEST_STATUS_DESCRIPTION1");
        header
    }

    #[test]
    fn status_codes_map_both_ways() {
        for status in [
            AuthenticationStatus::Accepted,
            AuthenticationStatus::InProgress,
            AuthenticationStatus::Completed,
            AuthenticationStatus::InProgressWithDescription,
            AuthenticationStatus::AbortedByTheTargetHardware,
            AuthenticationStatus::AbortedInTheTargetDlRequest,
            AuthenticationStatus::AbortedInTheTargetOpRequest,
            AuthenticationStatus::HeaderFileFailed,
        ] {
            assert_eq!(AuthenticationStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(AuthenticationStatus::from_code(0x1006), None);
        assert!(AuthenticationStatus::AbortedInTheTargetOpRequest.is_abort());
        assert!(!AuthenticationStatus::HeaderFileFailed.is_abort());
    }

    #[test]
    fn header_serializes_sixty_seven_bytes() {
        let header = status_header();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), 67);
        assert_eq!(header.file_size(), 67);
        assert_eq!(bytes[0], 16);
        assert_eq!(bytes[17], 18);
        // load ratio then load status
        assert_eq!(&bytes[36..41], &[0x00, 0x00, 42, 0x42, 0x42]);
        assert_eq!(bytes[41], 25);
        assert_eq!(bytes[66], 0);
    }

    #[test]
    fn header_json_matches_reference_layout() {
        let json = status_header().serialize_json().unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"headerFileNameLength":16,"headerFileName":"TEST_FILE1.TEST","#,
                r#""loadPartNumberNameLength":18,"loadPartNumberName":"TEST_PART_NUMBER1","#,
                r#""loadRatio":42,"loadStatus":16962,"loadStatusDescriptionLength":25,"#,
                r#""loadStatusDescription":"TEST_STATUS_DESCRIPTION1"}"#
            )
        );
        let decoded = LoadAuthenticationStatusHeaderFile::deserialize_json(&json).unwrap();
        assert_eq!(decoded, status_header());
    }

    #[test]
    fn empty_status_file_is_twenty_bytes() {
        let file = LoadAuthenticationStatusFile::new("TH_1.LAS", "A4");
        assert_eq!(file.file_size(), 20);
        assert_eq!(file.base().file_length(), 20);
        assert_eq!(file.to_bytes().unwrap().len(), 20);
    }

    #[test]
    fn binary_round_trip_with_headers() {
        let mut file = LoadAuthenticationStatusFile::new("TH_1.LAS", "A4");
        file.set_authentication_operation_status_code(AuthenticationStatus::InProgress.code());
        file.set_authentication_status_description("Working");
        file.set_counter(7);
        file.set_estimated_time(0xFFFF);
        file.set_load_list_ratio(50);
        file.add_header_file(status_header()).unwrap();

        assert_eq!(file.base().file_length(), 20 + 8 + 67);
        let bytes = file.to_bytes().unwrap();
        assert_eq!(bytes.len(), 95);

        let decoded = LoadAuthenticationStatusFile::deserialize(&bytes).unwrap();
        assert_eq!(decoded.counter(), 7);
        assert_eq!(decoded.estimated_time(), 0xFFFF);
        assert_eq!(decoded.load_list_ratio(), 50);
        assert_eq!(decoded.authentication_status_description(), "Working");
        assert_eq!(decoded.header_files(), file.header_files());
    }

    #[test]
    fn truncated_headers_are_rejected() {
        let mut file = LoadAuthenticationStatusFile::new("TH_1.LAS", "A4");
        file.add_header_file(status_header()).unwrap();
        let bytes = file.to_bytes().unwrap();
        assert!(LoadAuthenticationStatusFile::deserialize(&bytes[..bytes.len() - 1]).is_err());
        assert!(LoadAuthenticationStatusFile::deserialize(&bytes[..20]).is_err());
    }

    #[test]
    fn accepted_report_without_headers_decodes() {
        let mut file = LoadAuthenticationStatusFile::new("TH_1.LAS", "A4");
        file.set_authentication_operation_status_code(AuthenticationStatus::Accepted.code());
        let bytes = file.to_bytes().unwrap();
        let decoded = LoadAuthenticationStatusFile::deserialize(&bytes).unwrap();
        assert_eq!(decoded.number_of_header_files(), 0);
        assert_eq!(decoded.authentication_operation_status_code(), 1);
    }

    #[test]
    fn json_round_trip_and_key_order() {
        let mut file = LoadAuthenticationStatusFile::new("TH_1.LAS", "A4");
        file.set_authentication_operation_status_code(3);
        file.set_counter(2);
        file.add_header_file(status_header()).unwrap();

        let json = file.serialize_json().unwrap();
        assert!(json.starts_with(
            r#"{"fileName":"TH_1.LAS","fileLength":87,"protocolVersion":"A4","authenticationOperationStatusCode":3,"authenticationStatusDescriptionLength":0,"authenticationStatusDescription":"","counter":2,"exceptionTimer":0,"estimatedTime":0,"loadListRatio":0,"numberOfHeaderFiles":1,"headerFiles":[{"#
        ));

        let decoded = LoadAuthenticationStatusFile::deserialize_json(&json).unwrap();
        assert_eq!(decoded, file);

        let broken = json.replace("\"numberOfHeaderFiles\":1", "\"numberOfHeaderFiles\":0");
        assert!(LoadAuthenticationStatusFile::deserialize_json(&broken).is_err());
    }
}
