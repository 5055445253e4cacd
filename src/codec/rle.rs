//! # Run-Length Encoding
//!
//! Chunk block arrays are stored and transmitted as `(block, count)` runs in
//! flat-index order. Natural terrain is made of long horizontal layers, so a
//! 65,536-block chunk typically collapses to a few hundred runs.

use serde::{Deserialize, Serialize};

use super::CodecError;
use crate::server_state::voxels::block::BlockId;

/// One run of identical blocks. Serialises as the pair `[block, count]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run(pub BlockId, pub u32);

/// Collapses consecutive equal blocks into runs.
pub fn compress(blocks: &[BlockId]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &block in blocks {
        match runs.last_mut() {
            Some(run) if run.0 == block && run.1 < u32::MAX => run.1 += 1,
            _ => runs.push(Run(block, 1)),
        }
    }
    runs
}

/// Expands runs back into a block array of exactly `expected_len` blocks.
///
/// # Errors
/// [`CodecError::RunLength`] if the runs describe a different number of
/// blocks. The check is made before allocating, so a hostile run count
/// cannot force a huge allocation.
pub fn decompress(runs: &[Run], expected_len: usize) -> Result<Vec<BlockId>, CodecError> {
    let total: u64 = runs.iter().map(|run| run.1 as u64).sum();
    if total != expected_len as u64 {
        return Err(CodecError::RunLength {
            expected: expected_len,
            actual: total,
        });
    }

    let mut blocks = Vec::with_capacity(expected_len);
    for run in runs {
        blocks.extend(std::iter::repeat(run.0).take(run.1 as usize));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::voxels::chunk::CHUNK_VOLUME;
    use crate::server_state::voxels::generation::generate;

    #[test]
    fn uniform_array_is_a_single_run() {
        let blocks = vec![14; 4096];
        let runs = compress(&blocks);
        assert_eq!(runs, vec![Run(14, 4096)]);
        assert_eq!(decompress(&runs, 4096).unwrap(), blocks);
    }

    #[test]
    fn generated_chunk_round_trips_and_shrinks() {
        let chunk = generate(12345, -3, 8);
        let runs = compress(chunk.blocks());
        assert!(runs.len() < CHUNK_VOLUME / 8, "{} runs", runs.len());
        assert_eq!(decompress(&runs, CHUNK_VOLUME).unwrap(), chunk.blocks());
    }

    #[test]
    fn alternating_blocks_do_not_merge() {
        let runs = compress(&[1, 2, 1, 1]);
        assert_eq!(runs, vec![Run(1, 1), Run(2, 1), Run(1, 2)]);
    }

    #[test]
    fn empty_input() {
        assert!(compress(&[]).is_empty());
        assert_eq!(decompress(&[], 0).unwrap(), Vec::<BlockId>::new());
    }

    #[test]
    fn wrong_total_is_rejected() {
        let err = decompress(&[Run(0, 10)], 11).unwrap_err();
        assert!(matches!(err, CodecError::RunLength { expected: 11, actual: 10 }));
        assert!(decompress(&[Run(0, u32::MAX), Run(0, u32::MAX)], 16).is_err());
    }

    #[test]
    fn runs_serialise_as_pairs() {
        let json = serde_json::to_string(&vec![Run(3, 256)]).unwrap();
        assert_eq!(json, "[[3,256]]");
    }
}
