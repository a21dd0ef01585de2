//! URI decoding for pre-signed signaling URLs
//!
//! The backend hands out the signed WebSocket URL percent-encoded. Decoding
//! follows `decodeURI` semantics: escapes that stand for reserved URI
//! characters are kept as-is, so encoded separators inside query values
//! (the `%2F` in `X-Amz-Credential`, for example) survive and the signature
//! still matches.

use crate::error::{AppError, Result};

/// Characters `decodeURI` never decodes
const RESERVED: &[u8] = b";/?:@&=+$,#";

/// Percent-decode a URI, keeping escapes of reserved characters
pub fn decode_uri(input: &str) -> Result<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let value = bytes
            .get(i + 1..i + 3)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(|| {
                AppError::InvalidSignedUrl(format!("malformed escape at offset {}", i))
            })?;

        if RESERVED.contains(&value) {
            out.extend_from_slice(&bytes[i..i + 3]);
        } else {
            out.push(value);
        }
        i += 3;
    }

    String::from_utf8(out)
        .map_err(|_| AppError::InvalidSignedUrl("escapes do not form valid UTF-8".to_string()))
}
