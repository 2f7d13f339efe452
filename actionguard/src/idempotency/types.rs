//! 冪等キャッシュの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// キャッシュされたHTTPレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// ステータスコード
    pub status_code: u16,
    /// レスポンスボディ（JSONではbase64）
    #[serde(with = "body_base64")]
    pub response_body: Vec<u8>,
    /// Content-Type
    pub content_type: Option<String>,
    /// メソッド・パス・クエリ・ボディのハッシュ
    pub request_hash: String,
    /// 保存時刻
    pub created_at: DateTime<Utc>,
    /// 保持期間（秒）
    pub ttl_secs: u64,
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
