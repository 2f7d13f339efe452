//! SHA-256ハッシュユーティリティ

use sha2::{Digest, Sha256};

/// 複数フィールドを `0x00` 区切りで連結したSHA-256（16進小文字）
///
/// 区切りを入れるため `("ab", "c")` と `("a", "bc")` は別のハッシュになる。
pub fn sha256_fields(fields: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(field);
    }
    format!("{:x}", hasher.finalize())
}

/// 単一バイト列のSHA-256（16進小文字）
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
