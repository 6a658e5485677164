//! On-disk fixture repositories for unit tests.

use std::{
    cell::Cell,
    hash::Hasher,
    path::{Path, PathBuf},
};

use rs_sha1::{HasherContext, Sha1Hasher};
use rustc_hash::FxHashMap;
use tempfile::TempDir;

use crate::{
    calculate_hash,
    compression::deflate_object,
    objs::{Blob, Commit, CommitStamp, ObjectType, Tree, WriteObject},
    pack_diff::test::{copy_op, delta_header, insert_op},
    repository::Repository,
    shared::ObjectHash,
};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A temporary repository directory with an empty `objects/` tree.
pub(crate) struct TestRepo {
    dir: TempDir,
    repository: Repository,
    clock: Cell<i64>,
}

impl TestRepo {
    pub(crate) fn new() -> TestRepo {
        init_logging();

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("objects/pack")).unwrap();
        let repository = Repository::open(dir.path()).unwrap();

        TestRepo {
            dir,
            repository,
            clock: Cell::new(1_700_000_000),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repository
    }

    pub(crate) fn write_blob(&self, data: &[u8]) -> ObjectHash {
        let mut blob = Blob::new(data);
        let hash = blob.rehash().unwrap();
        blob.write(self.repository.store()).unwrap();
        hash
    }

    pub(crate) fn write_tree(&self, mut tree: Tree) -> ObjectHash {
        let hash = tree.rehash().unwrap();
        tree.write(self.repository.store()).unwrap();
        hash
    }

    /// Commits a tree holding exactly `files`. Every call gets a later timestamp, so
    /// otherwise identical commits still differ.
    pub(crate) fn commit_files(
        &self,
        files: &[(&str, ObjectHash)],
        parents: &[ObjectHash],
    ) -> ObjectHash {
        let mut root = Tree::new();
        for (path, blob) in files {
            let update = root
                .update_node(*path, 0o100644, *blob, &self.repository)
                .unwrap();
            update.write(&self.repository).unwrap();
            root = update.root;
        }
        let tree = self.write_tree(root);

        let time = self.clock.get() + 60;
        self.clock.set(time);
        let stamp = CommitStamp::new("Test Author", "author@example.com", time, 3600);

        let mut commit = Commit::new(
            tree,
            parents.to_vec(),
            stamp.clone(),
            stamp,
            format!("commit at {time}"),
            "",
        );
        let hash = commit.rehash().unwrap();
        commit.write(self.repository.store()).unwrap();
        hash
    }

    pub(crate) fn set_branch(&self, name: &str, hash: &ObjectHash) {
        let path = self.path().join("refs/heads").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{hash}\n")).unwrap();
    }
}

/// Writes a loose object without going through the object model, e.g. a tag.
pub(crate) fn write_loose_raw(root: &Path, type_name: &str, payload: &[u8]) -> ObjectHash {
    let hash = calculate_hash(payload, type_name.as_bytes());
    let path = root.join("objects").join(hash.loose_path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, deflate_object(type_name, payload, 6).unwrap()).unwrap();
    hash
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum IndexFormat {
    V1,
    V2,
}

/// Assembles a version 2 pack with whole, offset-delta and ref-delta entries.
pub(crate) struct PackBuilder {
    data: Vec<u8>,
    entries: Vec<(ObjectHash, u64)>,
    types: FxHashMap<u64, ObjectType>,
}

impl PackBuilder {
    pub(crate) fn new() -> PackBuilder {
        init_logging();

        let mut data = b"PACK".to_vec();
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());

        PackBuilder {
            data,
            entries: Vec::new(),
            types: FxHashMap::default(),
        }
    }

    /// Returns the entry offset.
    pub(crate) fn add_whole(&mut self, object_type: ObjectType, content: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        write_entry_header(object_type.pack_tag(), content.len(), &mut self.data);
        self.data.extend(zlib(content));
        self.record(offset, object_type, content);
        offset
    }

    pub(crate) fn add_ofs_delta(&mut self, base_offset: u64, base: &[u8], target: &[u8]) -> u64 {
        let object_type = self.types[&base_offset];
        let offset = self.data.len() as u64;
        let delta = make_delta(base, target);

        write_entry_header(ObjectType::OffsetDelta.pack_tag(), delta.len(), &mut self.data);
        write_offset_varint(offset - base_offset, &mut self.data);
        self.data.extend(zlib(&delta));
        self.record(offset, object_type, target);
        offset
    }

    pub(crate) fn add_ref_delta(
        &mut self,
        object_type: ObjectType,
        base_hash: ObjectHash,
        base: &[u8],
        target: &[u8],
    ) -> u64 {
        let offset = self.data.len() as u64;
        let delta = make_delta(base, target);

        write_entry_header(ObjectType::RefDelta.pack_tag(), delta.len(), &mut self.data);
        self.data.extend_from_slice(base_hash.as_bytes());
        self.data.extend(zlib(&delta));
        self.record(offset, object_type, target);
        offset
    }

    fn record(&mut self, offset: u64, object_type: ObjectType, content: &[u8]) {
        let hash = calculate_hash(content, object_type.name().unwrap().as_bytes());
        self.entries.push((hash, offset));
        self.types.insert(offset, object_type);
    }

    /// Writes `objects/pack/pack-<checksum>.{pack,idx}` below `root`, returns the idx path.
    pub(crate) fn finish(mut self, root: &Path, format: IndexFormat) -> PathBuf {
        let count = self.entries.len() as u32;
        self.data[8..12].copy_from_slice(&count.to_be_bytes());

        let mut hasher = Sha1Hasher::default();
        hasher.write(&self.data);
        let checksum: [u8; 20] = HasherContext::finish(&mut hasher).into();
        self.data.extend_from_slice(&checksum);

        let pack_dir = root.join("objects/pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        let stem = format!("pack-{}", ObjectHash::from(checksum));

        let index = match format {
            IndexFormat::V1 => build_index_v1(&self.entries),
            IndexFormat::V2 => build_index_v2(&self.entries),
        };

        let idx_path = pack_dir.join(format!("{stem}.idx"));
        std::fs::write(pack_dir.join(format!("{stem}.pack")), &self.data).unwrap();
        std::fs::write(&idx_path, index).unwrap();
        idx_path
    }
}

fn write_entry_header(tag: u8, size: usize, out: &mut Vec<u8>) {
    let mut size = size as u64;
    let mut byte = (tag << 4) | (size & 0x0F) as u8;
    size >>= 4;

    while size != 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7F) as u8;
        size >>= 7;
    }
    out.push(byte);
}

/// Inverse of `read_offset_varint`: every byte but the last is stored minus one.
fn write_offset_varint(distance: u64, out: &mut Vec<u8>) {
    let mut bytes = vec![(distance & 0x7F) as u8];
    let mut n = distance >> 7;
    while n != 0 {
        n -= 1;
        bytes.push(0x80 | (n & 0x7F) as u8);
        n >>= 7;
    }
    bytes.reverse();
    out.extend(bytes);
}

/// Copies the common prefix from the base and inserts the rest.
fn make_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let prefix = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(0xFF_FFFF);

    let mut delta = delta_header(base.len(), target.len());
    if prefix > 0 {
        copy_op(0, prefix as u32, &mut delta);
    }
    insert_op(&target[prefix..], &mut delta);
    delta
}

fn zlib(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn sorted(entries: &[(ObjectHash, u64)]) -> Vec<(ObjectHash, u64)> {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn fanout(entries: &[(ObjectHash, u64)], out: &mut Vec<u8>) {
    for byte in 0..=255u8 {
        let count = entries
            .iter()
            .filter(|(hash, _)| hash.first_byte() <= byte)
            .count() as u32;
        out.extend_from_slice(&count.to_be_bytes());
    }
}

pub(crate) fn build_index_v1(entries: &[(ObjectHash, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = Vec::new();
    fanout(&entries, &mut out);

    for (hash, offset) in entries.iter() {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
        out.extend_from_slice(hash.as_bytes());
    }

    // pack and index checksums
    out.extend_from_slice(&[0u8; 40]);
    out
}

pub(crate) fn build_index_v2(entries: &[(ObjectHash, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = b"\xfftOc".to_vec();
    out.extend_from_slice(&2u32.to_be_bytes());
    fanout(&entries, &mut out);

    for (hash, _) in entries.iter() {
        out.extend_from_slice(hash.as_bytes());
    }
    for _ in entries.iter() {
        out.extend_from_slice(&0u32.to_be_bytes());
    }
    for (_, offset) in entries.iter() {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
    }

    out.extend_from_slice(&[0u8; 40]);
    out
}

#[test]
fn offset_varint_encoding_matches_reader() {
    for distance in [1u64, 127, 128, 129, 16_511, 16_512, 1 << 30] {
        let mut out = Vec::new();
        write_offset_varint(distance, &mut out);
        assert_eq!(
            crate::binary::read_offset_varint(&out, 0).unwrap(),
            (distance, out.len())
        );
    }
}
