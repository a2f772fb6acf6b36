//! 内容哈希：MD5 十六进制，与 Swift/S3 的 ETag 一致

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 本地文件内容哈希
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> io::Result<String>;
}

/// 流式 MD5，不把整个文件读入内存
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Hasher;

impl ContentHasher for Md5Hasher {
    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
pub(crate) fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// 比较本地哈希与远程 ETag（忽略引号与大小写）
pub fn hashes_match(local: &str, remote: &str) -> bool {
    remote.trim_matches('"').eq_ignore_ascii_case(local)
}
