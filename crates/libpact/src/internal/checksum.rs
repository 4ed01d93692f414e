use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use sha2::Sha256;

use crate::error::{Context, Fallible};

/// MD5 of a byte slice, hex encoded.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// MD5 of a file's content, hex encoded.
pub fn md5_file<P: AsRef<Path>>(path: P) -> Fallible<String> {
    hash_file::<Md5, _>(path)
}

/// SHA-256 of a file's content, hex encoded.
pub fn sha256_file<P: AsRef<Path>>(path: P) -> Fallible<String> {
    hash_file::<Sha256, _>(path)
}

fn hash_file<D: Digest, P: AsRef<Path>>(path: P) -> Fallible<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod test {
    use super::md5_hex;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
