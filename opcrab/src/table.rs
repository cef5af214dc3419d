//! Offset index for jump-target resolution.
//!
//! Jump operands name byte offsets, while the engine navigates by position in
//! the instruction sequence. The index translates one into the other.

use crate::error::{ExecError, ExecResult};
use crate::instruction::Instruction;
use std::collections::BTreeMap;

/// Maps instruction offsets to positions in the instruction sequence.
///
/// Built once per code object and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetIndex {
    positions: BTreeMap<u32, usize>,
}

impl OffsetIndex {
    /// Builds the index in one pass.
    ///
    /// # Returns
    /// * `Ok(OffsetIndex)` - Every offset mapped to its position
    /// * `Err(ExecError::MalformedProgram)` - Offsets are not strictly increasing
    pub fn build(instructions: &[Instruction]) -> ExecResult<Self> {
        let mut positions = BTreeMap::new();
        let mut previous: Option<u32> = None;

        for (position, instr) in instructions.iter().enumerate() {
            if let Some(prev) = previous
                && instr.offset <= prev
            {
                return Err(ExecError::MalformedProgram(format!(
                    "instruction offsets must be strictly increasing: {} follows {}",
                    instr.offset, prev
                )));
            }
            positions.insert(instr.offset, position);
            previous = Some(instr.offset);
        }

        Ok(Self { positions })
    }

    /// Returns the sequence position of the instruction at `offset`.
    pub fn resolve(&self, offset: u32) -> Option<usize> {
        self.positions.get(&offset).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterates over `(offset, position)` pairs in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.positions.iter().map(|(&offset, &position)| (offset, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;

    fn seq(offsets: &[u32]) -> Vec<Instruction> {
        offsets
            .iter()
            .map(|&offset| Instruction::new(offset, Opcode::Nop))
            .collect()
    }

    #[test]
    fn test_build_maps_offsets_to_positions() {
        let index = OffsetIndex::build(&seq(&[0, 2, 4, 10, 12])).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.resolve(0), Some(0));
        assert_eq!(index.resolve(10), Some(3));
        assert_eq!(index.resolve(12), Some(4));
        assert_eq!(index.resolve(6), None);
    }

    #[test]
    fn test_empty_sequence() {
        let index = OffsetIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.resolve(0), None);
    }

    #[test]
    fn test_duplicate_offset_is_malformed() {
        let err = OffsetIndex::build(&seq(&[0, 2, 2])).unwrap_err();
        assert!(matches!(err, ExecError::MalformedProgram(_)));
    }

    #[test]
    fn test_decreasing_offset_is_malformed() {
        let err = OffsetIndex::build(&seq(&[0, 4, 2])).unwrap_err();
        assert!(err.to_string().contains("2 follows 4"));
    }

    #[test]
    fn test_rebuild_is_identical() {
        let instructions = seq(&[0, 2, 8, 16]);
        let first = OffsetIndex::build(&instructions).unwrap();
        let second = OffsetIndex::build(&instructions).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolution_is_stable() {
        let index = OffsetIndex::build(&seq(&[0, 2, 8, 16])).unwrap();
        for (offset, position) in index.iter() {
            assert_eq!(index.resolve(offset), Some(position));
            assert_eq!(index.resolve(offset), index.resolve(offset));
        }
    }
}
