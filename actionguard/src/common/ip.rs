//! クライアントIPアドレス抽出ユーティリティ
//!
//! プロキシヘッダーからクライアントIPを取得し、IPv4-mapped IPv6をIPv4に正規化する

use axum::http::HeaderMap;
use std::net::IpAddr;

/// IPアドレスを正規化する
///
/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4に変換。
/// それ以外はそのまま返す。
pub fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// リクエストヘッダーからクライアントIPを取得する（プロキシ対応）
///
/// `x-forwarded-for` の先頭要素、なければ `x-real-ip` を使用する。
/// IPとして解釈できる値は正規化し、それ以外は文字列のまま返す。
pub fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())?;

    if raw.is_empty() {
        return None;
    }

    match raw.parse::<IpAddr>() {
        Ok(ip) => Some(normalize_ip(ip).to_string()),
        Err(_) => Some(raw),
    }
}
