//! Stable hints on/off assignment for sessions without an explicit arm tag.

use crate::Arm;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
	bytes
		.iter()
		.fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// Bucket in `0..100` for a session id.
pub fn canary_bucket(session_id: &str) -> u32 {
	fnv1a_32(session_id.as_bytes()) % 100
}

/// Sessions whose bucket falls below `canary_percent` receive hints.
pub fn canary_arm(session_id: &str, canary_percent: u32) -> Arm {
	if canary_bucket(session_id) < canary_percent { Arm::On } else { Arm::Off }
}
