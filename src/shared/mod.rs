pub(crate) mod object_hash;

pub const HASH_LEN: usize = 20;

/// Raw 20-byte SHA-1 content digest. Hex is only used for display and paths.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Default)]
pub struct ObjectHash {
    pub(crate) bytes: [u8; HASH_LEN],
}
