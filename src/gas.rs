//! Static deployment cost estimate.
//!
//! Good enough to size a creation transaction's gas limit; the real cost
//! depends on what the constructor executes.

const TX_BASE: u64 = 21_000;
const CREATE: u64 = 32_000;
const CALLDATA_ZERO_BYTE: u64 = 4;
const CALLDATA_NONZERO_BYTE: u64 = 16;
const CODE_DEPOSIT_PER_BYTE: u64 = 200;
/// A cold `SSTORE` from zero to non-zero.
const INITIALIZED_FIELD: u64 = 22_100;

pub fn estimate_deployment(
    deployment: &[u8],
    runtime_len: usize,
    initialized_fields: usize,
) -> u64 {
    let calldata: u64 = deployment
        .iter()
        .map(|&b| if b == 0 { CALLDATA_ZERO_BYTE } else { CALLDATA_NONZERO_BYTE })
        .sum();

    TX_BASE
        + CREATE
        + calldata
        + CODE_DEPOSIT_PER_BYTE * runtime_len as u64
        + INITIALIZED_FIELD * initialized_fields as u64
}
