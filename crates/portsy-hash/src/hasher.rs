use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::Digest;

use portsy_types::HashAlgo;

use crate::error::{HashError, HashResult};

/// Read buffer size for streaming hashes.
const BUF_SIZE: usize = 1 << 20; // 1 MiB

/// The hash plus the stat fields captured in the same pass.
///
/// `size` and `modified` come from a single `symlink_metadata` taken before
/// the file is opened, so the reported numbers describe one observation of
/// the file even if it is being rewritten concurrently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedFile {
    /// Hex content digest.
    pub hash: String,
    pub size: u64,
    /// Unix seconds.
    pub modified: i64,
}

/// Streaming content hasher fixed to one algorithm.
#[derive(Clone, Copy, Debug)]
pub struct Hasher {
    algo: HashAlgo,
}

enum DigestState {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

impl Hasher {
    pub fn new(algo: HashAlgo) -> Self {
        Self { algo }
    }

    pub fn algo(&self) -> HashAlgo {
        self.algo
    }

    fn digest(&self) -> DigestState {
        match self.algo {
            HashAlgo::Sha256 => DigestState::Sha256(sha2::Sha256::new()),
            HashAlgo::Blake3 => DigestState::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hash the regular file at `path`.
    ///
    /// Directories and symlinks are refused with [`HashError::InvalidTarget`];
    /// following links from inside a manifest walk invites cycles and
    /// double-tracking.
    pub fn hash_file(&self, path: &Path) -> HashResult<HashedFile> {
        let meta = std::fs::symlink_metadata(path)?;
        if !meta.is_file() {
            return Err(HashError::InvalidTarget(path.to_path_buf()));
        }
        let size = meta.len();
        let modified = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let file = File::open(path)?;
        let hash = self.hash_reader(file)?;
        Ok(HashedFile {
            hash,
            size,
            modified,
        })
    }

    /// Hash arbitrary content from a reader.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> HashResult<String> {
        let mut digest = self.digest();
        let mut buf = vec![0u8; BUF_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
        }
        Ok(digest.finish_hex())
    }

    /// Hash an in-memory byte slice.
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut digest = self.digest();
        digest.update(data);
        digest.finish_hex()
    }
}
