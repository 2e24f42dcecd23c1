use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Files are hashed in fixed-size chunks so memory use does not grow with
/// capture length.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 of a file's contents, lowercase hex.
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Short SHA-256 prefix of a path string, used to keep derived file names
/// unique across directories.
pub fn path_digest(path: &Path, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(path.to_string_lossy().as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_content_hash_known_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            content_hash(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_spans_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let mut file = File::create(&path).unwrap();
        let data = vec![7u8; HASH_CHUNK_SIZE * 2 + 17];
        file.write_all(&data).unwrap();
        drop(file);

        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(content_hash(&path).unwrap(), expected);
    }

    #[test]
    fn test_content_hash_missing_file() {
        let dir = tempdir().unwrap();
        assert!(content_hash(&dir.path().join("gone.mp4")).is_err());
    }

    #[test]
    fn test_path_digest() {
        let a = path_digest(Path::new("/a/clip.mp4"), 8);
        let b = path_digest(Path::new("/b/clip.mp4"), 8);
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert_eq!(a, path_digest(Path::new("/a/clip.mp4"), 8));
    }
}
