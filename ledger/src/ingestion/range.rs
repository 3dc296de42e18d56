use alloy::primitives::U256;

use crate::core::BlockRange;

/// Maximum span of a single `eth_getLogs` request accepted by most providers.
pub const MAX_BLOCK_RANGE: u64 = 800;

/// Split `[from_block, to_block]` into contiguous ranges at most `max_range` wide.
///
/// The ranges cover the input exactly, in ascending order. Only the last range
/// may be narrower than `max_range`. Returns no ranges if `from_block > to_block`.
pub fn split_ranges(from_block: U256, to_block: U256, max_range: u64) -> Vec<BlockRange> {
    let step = U256::from(max_range.max(1));
    let mut ranges = Vec::new();

    let mut start = from_block;
    while start <= to_block {
        // Saturate so a range ending at U256::MAX does not wrap.
        let end = start.saturating_add(step - U256::from(1)).min(to_block);
        ranges.push(BlockRange::new(start, end));

        if end == U256::MAX {
            break;
        }
        start = end + U256::from(1);
    }

    ranges
}
