use std::{fmt::Display, path::PathBuf};

use bstr::{BStr, ByteSlice};

use crate::error::{Error, Result};

use super::{ObjectHash, HASH_LEN};

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(hex::encode(self.bytes).as_str())
    }
}

impl std::fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(hex::encode(self.bytes).as_str())
    }
}

impl ObjectHash {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.bytes
    }

    pub fn first_byte(&self) -> u8 {
        self.bytes[0]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parses a 40 character hex string.
    pub fn from_hex(hash: impl AsRef<[u8]>) -> Result<ObjectHash> {
        let hash = hash.as_ref();
        if hash.len() != 2 * HASH_LEN {
            return Err(Error::malformed(format!(
                "object hash has to be 40 hex characters, got {:?}",
                hash.as_bstr()
            )));
        }

        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(hash, &mut bytes).map_err(|e| {
            Error::malformed(format!("invalid object hash {:?}: {e}", hash.as_bstr()))
        })?;

        Ok(ObjectHash::from(bytes))
    }

    /// `xx/rest38` relative to the `objects` directory.
    pub(crate) fn loose_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        [dir, file].iter().collect()
    }
}

impl TryFrom<&[u8]> for ObjectHash {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        if value.len() != HASH_LEN {
            Err(Error::malformed(format!(
                "object hash has to be 20 bytes, got {}",
                value.len()
            )))
        } else {
            let mut buf = [0u8; HASH_LEN];
            buf.copy_from_slice(value);
            Ok(ObjectHash::from(buf))
        }
    }
}

impl TryFrom<&BStr> for ObjectHash {
    type Error = Error;

    fn try_from(value: &BStr) -> Result<Self> {
        ObjectHash::from_hex(value)
    }
}

impl TryFrom<&str> for ObjectHash {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        ObjectHash::from_hex(value)
    }
}

impl From<[u8; HASH_LEN]> for ObjectHash {
    fn from(value: [u8; HASH_LEN]) -> Self {
        ObjectHash { bytes: value }
    }
}

impl From<ObjectHash> for Vec<u8> {
    fn from(val: ObjectHash) -> Self {
        val.bytes.to_vec()
    }
}
