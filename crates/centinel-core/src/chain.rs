// crates/centinel-core/src/chain.rs
//
// Chain hasher: binds an artifact's bytes to the digest of the artifact
// before it.
//
// The hashed message is a length-framed sequence, fields joined by `|`:
//
//   centinel-chain-v1 | prev | len(prev) | prev
//     [| ts | len(ts) | ts] [| meta | len(meta) | meta]
//     | content | len(content) | content
//
// Lengths are decimal ASCII byte counts. Framing every field keeps content
// that happens to end in hash-looking bytes from colliding with a
// different (content, prev) split.

use sha2::{Digest, Sha256};

use crate::crypto::is_hex_digest;

/// Domain separation tag for chain hashes.
pub const CHAIN_DOMAIN: &[u8] = b"centinel-chain-v1";

const SEPARATOR: &[u8] = b"|";

/// Incremental builder for the framed message.
struct Framer {
    hasher: Sha256,
    first: bool,
}

impl Framer {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            first: true,
        }
    }

    fn raw(&mut self, bytes: &[u8]) {
        if !self.first {
            self.hasher.update(SEPARATOR);
        }
        self.first = false;
        self.hasher.update(bytes);
    }

    fn field(&mut self, label: &[u8], value: &[u8]) {
        self.raw(label);
        self.raw(value.len().to_string().as_bytes());
        self.raw(value);
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Compute the chain hash of `content` linked to `previous_hash`.
///
/// `previous_hash` should be a 64-character hex digest; anything else is
/// logged and hashed verbatim. `None` is only legitimate for the first entry
/// of a chain. Returns the lowercase hex SHA-256 digest.
pub fn chain_hash(
    content: &[u8],
    previous_hash: Option<&str>,
    metadata: Option<&[u8]>,
    timestamp: Option<&str>,
) -> String {
    let prev = previous_hash.unwrap_or("");
    if previous_hash.is_some() && !is_hex_digest(prev) {
        tracing::warn!(
            previous_hash = prev,
            "chain_hash: previous hash is not a 64-char hex digest; hashing verbatim"
        );
    }

    let mut framer = Framer::new();
    framer.raw(CHAIN_DOMAIN);
    framer.field(b"prev", prev.as_bytes());
    if let Some(ts) = timestamp {
        framer.field(b"ts", ts.as_bytes());
    }
    if let Some(meta) = metadata {
        framer.field(b"meta", meta);
    }
    framer.field(b"content", content);
    framer.finish()
}

/// Extend a chain over a sequence of contents, returning every link.
///
/// Each element is hashed without metadata or timestamp. Used by pipelines
/// that chain unit payloads in memory before snapshotting.
pub fn chain_sequence<'a, I>(start: Option<&str>, contents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut previous = start.map(str::to_string);
    let mut links = Vec::new();
    for content in contents {
        let next = chain_hash(content, previous.as_deref(), None, None);
        links.push(next.clone());
        previous = Some(next);
    }
    links
}
