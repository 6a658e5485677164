use bstr::{BStr, ByteSlice};

use crate::{error::Result, shared::ObjectHash};

use super::{ObjectType, WriteObject};

/// Opaque file content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    hash: Option<ObjectHash>,
    data: Vec<u8>,
}

impl Blob {
    /// An unhashed blob; call `rehash` before writing.
    pub fn new(data: impl Into<Vec<u8>>) -> Blob {
        Blob {
            hash: None,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bstr(&self) -> &BStr {
        self.data.as_bstr()
    }

    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
        self.hash = None;
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl WriteObject for Blob {
    const TYPE: ObjectType = ObjectType::Blob;

    fn cached_hash(&self) -> Option<&ObjectHash> {
        self.hash.as_ref()
    }

    fn set_cached_hash(&mut self, hash: Option<ObjectHash>) {
        self.hash = hash;
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn unserialize(data: &[u8]) -> Result<Self> {
        Ok(Blob::new(data))
    }
}
