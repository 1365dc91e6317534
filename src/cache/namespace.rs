//! Cache Namespace Module
//!
//! Logical partitions of the cache. Each namespace has its own table, key
//! prefix, default TTL and size accounting.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CacheError;

// == Cache Namespace ==
/// A logical partition of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Decoded and normalized page images
    Image,
    /// Text produced by the recognition engine
    RecognitionResult,
    /// Responses from remote API calls
    ApiResponse,
}

impl CacheNamespace {
    /// Every namespace, in table creation order.
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::Image,
        CacheNamespace::RecognitionResult,
        CacheNamespace::ApiResponse,
    ];

    /// Prefix prepended to content-addressed keys.
    pub fn key_prefix(self) -> &'static str {
        match self {
            CacheNamespace::Image => "img",
            CacheNamespace::RecognitionResult => "ocr",
            CacheNamespace::ApiResponse => "api",
        }
    }

    /// Backing table in the persistent store.
    pub fn table(self) -> &'static str {
        match self {
            CacheNamespace::Image => "image_cache",
            CacheNamespace::RecognitionResult => "ocr_cache",
            CacheNamespace::ApiResponse => "api_cache",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::Image => "image",
            CacheNamespace::RecognitionResult => "recognition_result",
            CacheNamespace::ApiResponse => "api_response",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheNamespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" | "img" => Ok(CacheNamespace::Image),
            "recognition" | "recognition_result" | "ocr" => Ok(CacheNamespace::RecognitionResult),
            "api" | "api_response" => Ok(CacheNamespace::ApiResponse),
            other => Err(CacheError::Validation(format!("Unknown namespace: {}", other))),
        }
    }
}

// == Clear Scope ==
/// Which namespaces a `clear` call affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Only(CacheNamespace),
}

impl ClearScope {
    /// Namespaces covered by this scope.
    pub fn namespaces(self) -> Vec<CacheNamespace> {
        match self {
            ClearScope::All => CacheNamespace::ALL.to_vec(),
            ClearScope::Only(ns) => vec![ns],
        }
    }

    pub fn includes(self, namespace: CacheNamespace) -> bool {
        match self {
            ClearScope::All => true,
            ClearScope::Only(ns) => ns == namespace,
        }
    }
}

impl From<CacheNamespace> for ClearScope {
    fn from(ns: CacheNamespace) -> Self {
        ClearScope::Only(ns)
    }
}

impl FromStr for ClearScope {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(ClearScope::All)
        } else {
            s.parse().map(ClearScope::Only)
        }
    }
}
