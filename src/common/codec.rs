//! Memcomparable byte encoding for region keys.
//!
//! PD orders regions by encoded keys, so raw keys are encoded before lookup.
//! The input is cut into groups of [`ENC_GROUP_SIZE`] bytes. Each group is
//! padded with `0x00` and followed by a marker byte `0xFF - pad`. A final,
//! fully padded group terminates inputs whose length is a multiple of the
//! group size (including the empty input).
//!
//! ```text
//! []                   -> [0, 0, 0, 0, 0, 0, 0, 0, 247]
//! [1, 2, 3]            -> [1, 2, 3, 0, 0, 0, 0, 0, 250]
//! [1, 2, 3, 4, 5, 6, 7, 8]
//!                      -> [1, 2, 3, 4, 5, 6, 7, 8, 255, 0, 0, 0, 0, 0, 0, 0, 0, 247]
//! ```

use crate::common::{Error, Result};

pub const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;

/// Encodes `data` so that byte-wise comparison of outputs matches byte-wise
/// comparison of inputs.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let groups = data.len() / ENC_GROUP_SIZE + 1;
    let mut out = Vec::with_capacity(groups * (ENC_GROUP_SIZE + 1));

    for chunk_start in (0..=data.len()).step_by(ENC_GROUP_SIZE) {
        let chunk_end = (chunk_start + ENC_GROUP_SIZE).min(data.len());
        let chunk = &data[chunk_start..chunk_end];
        let pad = ENC_GROUP_SIZE - chunk.len();

        out.extend_from_slice(chunk);
        out.extend(std::iter::repeat(ENC_PAD).take(pad));
        out.push(ENC_MARKER - pad as u8);
    }
    out
}

/// Decodes one encoded value from the front of `encoded`.
///
/// Returns the raw bytes and the number of input bytes consumed.
pub fn decode_bytes(encoded: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::with_capacity(encoded.len() / (ENC_GROUP_SIZE + 1) * ENC_GROUP_SIZE);
    let mut offset = 0;

    loop {
        let group_end = offset + ENC_GROUP_SIZE + 1;
        if encoded.len() < group_end {
            return Err(Error::Corrupted(format!(
                "insufficient bytes to decode group at offset {}",
                offset
            )));
        }
        let group = &encoded[offset..offset + ENC_GROUP_SIZE];
        let marker = encoded[offset + ENC_GROUP_SIZE];
        offset = group_end;

        let pad = (ENC_MARKER - marker) as usize;
        if pad == 0 {
            out.extend_from_slice(group);
            continue;
        }
        if pad > ENC_GROUP_SIZE {
            return Err(Error::Corrupted(format!("invalid marker byte {:#04x}", marker)));
        }

        let real = ENC_GROUP_SIZE - pad;
        if group[real..].iter().any(|b| *b != ENC_PAD) {
            return Err(Error::Corrupted("invalid padding bytes".into()));
        }
        out.extend_from_slice(&group[..real]);
        return Ok((out, offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_vectors() {
        assert_eq!(encode_bytes(&[]), vec![0, 0, 0, 0, 0, 0, 0, 0, 247]);
        assert_eq!(encode_bytes(&[1, 2, 3]), vec![1, 2, 3, 0, 0, 0, 0, 0, 250]);
        assert_eq!(
            encode_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 255, 0, 0, 0, 0, 0, 0, 0, 0, 247]
        );
        assert_eq!(
            encode_bytes(&[1, 2, 3, 4, 5, 6, 7, 8, 9]),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 255, 9, 0, 0, 0, 0, 0, 0, 0, 248]
        );
    }

    #[test]
    fn test_decode_restores_input() {
        for len in 0..20 {
            let raw: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let encoded = encode_bytes(&raw);
            let (decoded, consumed) = decode_bytes(&encoded).unwrap();
            assert_eq!(decoded, raw);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let mut encoded = encode_bytes(b"abc");
        let first_len = encoded.len();
        encoded.extend(encode_bytes(b"next"));

        let (decoded, consumed) = decode_bytes(&encoded).unwrap();
        assert_eq!(decoded, b"abc");
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_encoding_preserves_order() {
        let mut keys: Vec<Vec<u8>> = [
            "", "\x00", "a", "a\x00", "ab", "abcdefgh", "abcdefgh\x00", "abcdefghi", "b",
        ]
        .iter()
        .map(|k| k.as_bytes().to_vec())
        .collect();
        keys.sort();
        let encoded: Vec<Vec<u8>> = keys.iter().map(|k| encode_bytes(k)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_bytes(&[1, 2, 3]).is_err());
        // marker claims 9 padding bytes
        assert!(decode_bytes(&[0, 0, 0, 0, 0, 0, 0, 0, 246]).is_err());
        // padding is not zero
        assert!(decode_bytes(&[1, 2, 3, 9, 0, 0, 0, 0, 250]).is_err());
        // no terminating group
        assert!(decode_bytes(&[1, 2, 3, 4, 5, 6, 7, 8, 255]).is_err());
    }
}
