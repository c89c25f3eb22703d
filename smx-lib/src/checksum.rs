//! Integrity code carried at the end of every logical frame body.
//!
//! The checksum is the two's complement of the wrapping byte sum, so the sum
//! of `payload ++ checksum` is always zero.

use crate::error::SmxError;

/// Compute the checksum over a frame payload.
pub fn compute(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
        .wrapping_neg()
}

/// Split the trailing checksum from an assembled frame body and validate it,
/// returning the payload on success.
pub fn verify(body: &[u8]) -> Result<&[u8], SmxError> {
    let Some((&actual, payload)) = body.split_last() else {
        return Err(SmxError::Protocol(
            "cannot verify checksum of an empty frame body".to_string(),
        ));
    };

    let expected = compute(payload);
    if actual != expected {
        return Err(SmxError::ChecksumMismatch { expected, actual });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_payload_and_checksum_is_zero() {
        let payload = [0x47u8, 0x01, 0xFF, 0x80, 0x7F];
        let sum = payload
            .iter()
            .fold(compute(&payload), |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn compute_is_deterministic() {
        let payload = b"W followed by a config blob";
        assert_eq!(compute(payload), compute(payload));
    }

    #[test]
    fn single_bit_flips_change_the_checksum() {
        let payload = [0x69u8, 0x12, 0x34, 0x56, 0x78, 0x9A];
        let reference = compute(&payload);

        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut mutated = payload;
                mutated[byte] ^= 1 << bit;
                assert_ne!(
                    compute(&mutated),
                    reference,
                    "flip of byte {byte} bit {bit} was not detected"
                );
            }
        }
    }

    #[test]
    fn verify_accepts_a_well_formed_body() {
        let payload = b"G".to_vec();
        let mut body = payload.clone();
        body.push(compute(&payload));
        assert_eq!(verify(&body).unwrap(), payload.as_slice());
    }

    #[test]
    fn verify_rejects_a_corrupted_body() {
        let payload = b"iI".to_vec();
        let mut body = payload.clone();
        body.push(compute(&payload) ^ 0x01);
        assert!(matches!(
            verify(&body),
            Err(SmxError::ChecksumMismatch { .. })
        ));
    }
}
