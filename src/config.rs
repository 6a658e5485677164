/// Tunables for reading and writing a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Longest delta chain that is resolved before giving up.
    pub max_delta_depth: usize,
    /// Upper bound for any size decoded from an object or delta header.
    pub max_object_size: u64,
    /// Re-check the content hash of every object handed out by `Repository::object`.
    pub verify_hashes: bool,
    /// zlib level for loose object writes, 0-9.
    pub compression_level: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_delta_depth: 50,
            max_object_size: 1 << 30,
            verify_hashes: true,
            compression_level: 6,
        }
    }
}

impl StoreConfig {
    pub fn with_max_delta_depth(mut self, depth: usize) -> Self {
        self.max_delta_depth = depth;
        self
    }

    pub fn with_max_object_size(mut self, size: u64) -> Self {
        self.max_object_size = size;
        self
    }

    pub fn with_verify_hashes(mut self, verify: bool) -> Self {
        self.verify_hashes = verify;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }
}
