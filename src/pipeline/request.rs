use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

const KEY_SEED: u64 = 0x7e3f_91c2_5a48_d0b6;

/// Header lines used by [`RenderRequest::with_default_headers`].
///
/// A minimal math-capable preamble; hosts with custom packages supply their
/// own header lines instead.
pub const DEFAULT_HEADERS: &[&str] = &[
    r"\documentclass[preview]{standalone}",
    r"\usepackage{amsmath}",
    r"\usepackage{amssymb}",
    r"\usepackage{xcolor}",
];

/// One unit of render work and, simultaneously, the cache key.
///
/// Value semantics: two requests are equal iff the source text and every
/// header line (in order) are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderRequest {
    source: String,
    headers: Vec<String>,
}

impl RenderRequest {
    /// Create a request from source markup and ordered header lines.
    pub fn new(source: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            source: source.into(),
            headers,
        }
    }

    /// Create a request using [`DEFAULT_HEADERS`].
    pub fn with_default_headers(source: impl Into<String>) -> Self {
        Self::new(
            source,
            DEFAULT_HEADERS.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    /// The expression body.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Header lines, verbatim and in order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Stable content fingerprint over the full request.
    ///
    /// Fields are length-prefixed before hashing so `("ab", ["c"])` and
    /// `("a", ["bc"])` cannot collide structurally.
    pub fn key(&self) -> RequestKey {
        let mut h = Xxh3::with_seed(KEY_SEED);
        write_field(&mut h, self.source.as_bytes());
        h.update(&(self.headers.len() as u32).to_le_bytes());
        for line in &self.headers {
            write_field(&mut h, line.as_bytes());
        }
        let v = h.digest128();
        RequestKey {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

fn write_field(h: &mut Xxh3, bytes: &[u8]) {
    h.update(&(bytes.len() as u32).to_le_bytes());
    h.update(bytes);
}

/// 128-bit content-address of a [`RenderRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    hi: u64,
    lo: u64,
}
