//! Incremental UTF-8 decoding of deltas.

use std::str;

/// Decodes a byte stream chunk by chunk into text frames.
///
/// A multi-byte character cut off at the end of a chunk is held back and
/// completed by the next chunk. Bytes that can never be valid UTF-8 are
/// replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    /// Incomplete trailing sequence, at most 3 bytes.
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode `bytes`, prefixed by whatever was held back last time.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of bytes held back.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop any held-back bytes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
