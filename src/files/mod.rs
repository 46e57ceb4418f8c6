//! # Authentication files
//!
//! Binary and JSON codecs for the three files exchanged during a load
//! authentication: `.LAI` (initialization), `.LAR` (request) and `.LAS`
//! (status). All integers on the wire are big-endian.

mod base;
mod initialization;
mod request;
mod status;
mod wire;

pub use base::BaseAuthenticationFile;
pub use initialization::{InitializationAuthenticationFile, InitializationStatus};
pub use request::{LoadAuthenticationRequestFile, LoadAuthenticationRequestHeaderFile};
pub use status::{AuthenticationStatus, LoadAuthenticationStatusFile, LoadAuthenticationStatusHeaderFile};
pub use wire::StringField;

use crate::error::Result;
use bytes::{Bytes, BytesMut};

/// Largest stored string field, trailing NUL included
pub const MAX_STRING_FIELD_SIZE: usize = 255;
/// Largest cryptographic key carried by an `.LAI`
pub const MAX_CRYPTOGRAPHIC_KEY_SIZE: usize = 512;
/// Size of the protocol version field
pub const PROTOCOL_VERSION_SIZE: usize = 2;
/// Protocol version written when none is given
pub const DEFAULT_PROTOCOL_VERSION: &str = "01";

/// Anything with a known serialized size
pub trait FileAuthentication {
    /// Exact number of bytes `serialize` appends
    fn file_size(&self) -> usize;
}

/// Binary and JSON representation of an authentication file
pub trait SerializableAuthentication: FileAuthentication + Sized {
    /// Append the binary form to `out`
    fn serialize(&self, out: &mut BytesMut) -> Result<()>;

    /// Parse the binary form
    fn deserialize(data: &[u8]) -> Result<Self>;

    /// Compact JSON form
    fn serialize_json(&self) -> Result<String>;

    /// Parse the JSON form
    fn deserialize_json(json: &str) -> Result<Self>;

    /// Serialize into a fresh buffer
    fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.file_size());
        self.serialize(&mut out)?;
        Ok(out.freeze())
    }
}
