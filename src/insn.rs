/*
 *     This file is part of Trellis.
 *
 *     Trellis is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU Lesser General Public License as published by
 *     the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     Trellis is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU General Public License for more details.
 *
 *     You should have received a copy of the GNU Lesser General Public License
 *     along with Trellis. (LICENSE.md)  If not, see <https://www.gnu.org/licenses/>.
 */

//! Instruction values held by the handles of an [`InsnList`](crate::code::InsnList).
//!
//! Only control transfer instructions are modelled structurally; everything
//! else is an opaque opcode plus its operand bytes, which is all the list
//! needs to assign positions around them.

use std::io::Read;

use crate::code::HandleId;
use crate::constants;
use crate::error::{Error, Result};
use crate::rw::ReadWrite;

/// One instruction, as stored in a handle slot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Insn {
    /// An opaque fixed-length instruction: opcode plus raw operand bytes.
    Simple { opcode: u8, operands: Vec<u8> },
    /// A control transfer instruction with a resolvable target.
    Branch(BranchInsn),
}

impl Insn {
    pub fn simple(opcode: u8) -> Insn {
        Insn::Simple {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Simple { opcode, .. } => *opcode,
            Insn::Branch(b) => b.opcode,
        }
    }

    /// Current encoded length in bytes. For a branch this can change during
    /// a layout pass (narrow `goto`/`jsr` widen to their `_w` forms).
    pub fn size(&self) -> usize {
        match self {
            Insn::Simple { operands, .. } => 1 + operands.len(),
            Insn::Branch(b) => usize::from(b.length),
        }
    }
}

/// A control transfer instruction: `goto`, `jsr`, the `if*` family and the
/// wide forms.
///
/// The target is a handle into the owning list, or `None` for a branch that
/// was decoded from raw bytes and not resolved yet (or whose handle was
/// disposed). `index` caches the relative offset last derived from positions
/// (or read from bytes); emission never trusts it and recomputes the offset
/// from positions instead.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BranchInsn {
    pub(crate) opcode: u8,
    pub(crate) length: u16,
    pub(crate) index: i32,
    pub(crate) target: Option<HandleId>,
}

impl BranchInsn {
    /// A branch with no target yet. Narrow opcodes start at 3 bytes, the
    /// `_w` forms at 5.
    pub fn new(opcode: u8) -> Result<BranchInsn> {
        if !constants::is_branch(opcode) {
            return Err(Error::Invalid("branch opcode", opcode.to_string()));
        }
        let length = if is_wide(opcode) { 5 } else { 3 };
        Ok(BranchInsn {
            opcode,
            length,
            index: -1,
            target: None,
        })
    }

    /// Reads the operand of a raw branch whose opcode byte has already been
    /// consumed. The relative offset lands in `index`; the target stays
    /// unresolved until the caller maps offsets back to handles.
    pub fn read<R: Read>(opcode: u8, reader: &mut R) -> Result<BranchInsn> {
        let mut insn = BranchInsn::new(opcode)?;
        insn.index = if is_wide(opcode) {
            i32::read_from(reader)?
        } else {
            i32::from(i16::read_from(reader)?)
        };
        Ok(insn)
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// The stored relative offset; `-1` once the instruction is disposed.
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn target(&self) -> Option<HandleId> {
        self.target
    }

    /// True if `h` is this instruction's current target. Identity is handle
    /// identity, not value equality of the instructions behind the handles.
    pub fn contains_target(&self, h: HandleId) -> bool {
        self.target == Some(h)
    }

    pub(crate) fn is_wide(&self) -> bool {
        is_wide(self.opcode)
    }
}

fn is_wide(opcode: u8) -> bool {
    matches!(opcode, constants::GOTO_W | constants::JSR_W)
}
