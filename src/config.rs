//! Environment-backed configuration helpers
//!
//! Every service reads its settings from environment variables (optionally
//! seeded from a `.env` file by the binary). Service config structs call these
//! helpers from their `Default` impls.

use std::net::SocketAddr;
use std::str::FromStr;

/// 環境変数を文字列で取得（未設定ならデフォルト）
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 環境変数をパースして取得（未設定・パース失敗ならデフォルト）
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "Invalid value in environment, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Optional env var; empty strings count as unset
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Comma separated list
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_opt(key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Build a bind address from host and port
pub fn bind_addr(host: &str, port: u16) -> crate::Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| crate::Error::Validation(format!("invalid bind address {}:{}: {}", host, port, e)))
}
