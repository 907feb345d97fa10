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

//! Stack map frame and branch target editing primitives for JVM class files.
//!
//! Two pieces of a bytecode engineering toolkit live here: the tag-directed
//! wire format of [`StackMapEntry`] (decode, encode and exact size
//! prediction are driven by the same closed set of variants) and the
//! [`InsnList`] instruction sequence, where branch instructions keep their
//! targets informed through back-reference sets and relative offsets are
//! recomputed by an iterative layout pass.
//!
//! The constant pool is not modelled here; structures that need it read and
//! write through the [`ConstantPoolReader`]/[`ConstantPoolWriter`] traits.

pub mod code;
pub mod constants;
pub mod error;
pub mod frame;
pub mod insn;
pub mod rw;

#[cfg(test)]
mod tests;

pub use crate::code::{HandleId, InsnList};
pub use crate::error::{Error, Result};
pub use crate::frame::{
    FrameKind, FrameVisitor, StackMapEntry, StackMapTable, VerificationType, MAX_OFFSET_DELTA,
};
pub use crate::insn::{BranchInsn, Insn};
pub use crate::rw::{ConstantPoolReadWrite, ConstantPoolReader, ConstantPoolWriter, ReadWrite};
