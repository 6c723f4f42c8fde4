//! Prefixed textual encodings (`sig_z…`, `sealed_z…`, …).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{CryptoError, CryptoResult};

pub(crate) fn encode_hex(prefix: &str, bytes: &[u8]) -> String {
    format!("{prefix}{}", hex::encode(bytes))
}

pub(crate) fn decode_hex<const N: usize>(
    prefix: &str,
    kind: &'static str,
    s: &str,
) -> CryptoResult<[u8; N]> {
    let rest = s
        .strip_prefix(prefix)
        .ok_or(CryptoError::InvalidEncoding { kind })?;
    let mut out = [0u8; N];
    hex::decode_to_slice(rest, &mut out).map_err(|_| CryptoError::InvalidEncoding { kind })?;
    Ok(out)
}

pub(crate) fn encode_b64(prefix: &str, bytes: &[u8]) -> String {
    format!("{prefix}{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn decode_b64(prefix: &str, kind: &'static str, s: &str) -> CryptoResult<Vec<u8>> {
    let rest = s
        .strip_prefix(prefix)
        .ok_or(CryptoError::InvalidEncoding { kind })?;
    URL_SAFE_NO_PAD
        .decode(rest)
        .map_err(|_| CryptoError::InvalidEncoding { kind })
}
