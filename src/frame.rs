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

//! Stack map frames as found in the `StackMapTable` attribute of a method's
//! code, including the tag-directed wire format and the tag/offset rules that
//! apply when entries are edited in place.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::rw::{ConstantPoolReadWrite, ConstantPoolReader, ConstantPoolWriter, ReadWrite};

/// Largest offset delta an entry may carry; the extended forms store the
/// offset in a 16-bit field that the JVM treats as non-negative.
pub const MAX_OFFSET_DELTA: u16 = 32767;

/// The runtime type of one local variable slot or operand stack slot at a frame.
#[derive(Debug, Eq, PartialEq, Hash, Clone)]
pub enum VerificationType {
    Top,
    Int,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(Cow<'static, str>),
    /// Offset of the `new` instruction that created the value.
    Uninitialized(u16),
}

impl VerificationType {
    /// Whether the encoded form carries a 16-bit operand after the item tag.
    pub const fn has_index(&self) -> bool {
        matches!(
            self,
            VerificationType::Object(_) | VerificationType::Uninitialized(_)
        )
    }

    /// Exact encoded size in bytes.
    pub fn size(&self) -> usize {
        if self.has_index() {
            3
        } else {
            1
        }
    }
}

impl ConstantPoolReadWrite for VerificationType {
    fn read_from<C: ConstantPoolReader, R: Read>(cp: &mut C, reader: &mut R) -> Result<Self> {
        let tag = u8::read_from(reader)?;
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Int,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => {
                let idx = u16::read_from(reader)?;
                match cp.read_class(idx) {
                    Some(name) => VerificationType::Object(name),
                    None => {
                        return Err(Error::Invalid(
                            "constant pool entry index",
                            idx.to_string(),
                        ))
                    }
                }
            }
            8 => VerificationType::Uninitialized(u16::read_from(reader)?),
            _ => return Err(Error::Invalid("verification type tag", tag.to_string())),
        })
    }

    fn write_to<C: ConstantPoolWriter, W: Write>(&self, cp: &mut C, writer: &mut W) -> Result<()> {
        match self {
            VerificationType::Top => 0u8.write_to(writer),
            VerificationType::Int => 1u8.write_to(writer),
            VerificationType::Float => 2u8.write_to(writer),
            VerificationType::Double => 3u8.write_to(writer),
            VerificationType::Long => 4u8.write_to(writer),
            VerificationType::Null => 5u8.write_to(writer),
            VerificationType::UninitializedThis => 6u8.write_to(writer),
            VerificationType::Object(name) => {
                7u8.write_to(writer)?;
                cp.insert_class(name.clone()).write_to(writer)
            }
            VerificationType::Uninitialized(off) => {
                8u8.write_to(writer)?;
                off.write_to(writer)
            }
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Top => f.write_str("Top"),
            VerificationType::Int => f.write_str("Int"),
            VerificationType::Float => f.write_str("Float"),
            VerificationType::Double => f.write_str("Double"),
            VerificationType::Long => f.write_str("Long"),
            VerificationType::Null => f.write_str("Null"),
            VerificationType::UninitializedThis => f.write_str("UninitializedThis"),
            VerificationType::Object(name) => write!(f, "Object({})", name),
            VerificationType::Uninitialized(off) => write!(f, "Uninitialized({})", off),
        }
    }
}

/// The seven frame layouts, classified from the leading tag byte.
///
/// This is the only place tag ranges are interpreted; the decoder dispatches
/// on it, while the encoder and [`StackMapEntry::size`] dispatch on the entry
/// variants themselves, so the three cannot disagree about a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Same,
    SameLocals1Stack,
    SameLocals1StackExtended,
    Chop,
    SameExtended,
    Append,
    Full,
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Result<FrameKind> {
        Ok(match tag {
            0..=63 => FrameKind::Same,
            64..=127 => FrameKind::SameLocals1Stack,
            128..=246 => {
                return Err(Error::Invalid(
                    "frame type (reserved for future use)",
                    tag.to_string(),
                ))
            }
            247 => FrameKind::SameLocals1StackExtended,
            248..=250 => FrameKind::Chop,
            251 => FrameKind::SameExtended,
            252..=254 => FrameKind::Append,
            255 => FrameKind::Full,
        })
    }
}

/// One entry of a stack map table.
///
/// Each variant carries exactly the fields its tag range mandates, so an
/// entry whose arrays disagree with its frame type is unrepresentable. The
/// residual range rules (compact offsets are 0–63, `chopped` and `Append`
/// arity are 1–3) are enforced by the mutators and checked again when
/// writing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StackMapEntry {
    /// Tags 0–63. Same locals as the previous frame, empty stack; the offset
    /// delta is the tag itself.
    Same { offset_delta: u16 },
    /// Tags 64–127. Same locals, one stack item; the offset delta is `tag - 64`.
    SameLocals1Stack {
        offset_delta: u16,
        stack_item: VerificationType,
    },
    /// Tag 247. Same locals, one stack item, explicit 16-bit offset delta.
    SameLocals1StackExtended {
        offset_delta: u16,
        stack_item: VerificationType,
    },
    /// Tags 248–250. The last `chopped` (1–3) locals are absent, empty stack.
    Chop { offset_delta: u16, chopped: u8 },
    /// Tag 251. Same locals, empty stack, explicit 16-bit offset delta.
    SameExtended { offset_delta: u16 },
    /// Tags 252–254. `locals` (1–3 of them) are appended, empty stack.
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    /// Tag 255. Locals and stack are given in full.
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack_items: Vec<VerificationType>,
    },
}

impl StackMapEntry {
    pub fn kind(&self) -> FrameKind {
        match self {
            StackMapEntry::Same { .. } => FrameKind::Same,
            StackMapEntry::SameLocals1Stack { .. } => FrameKind::SameLocals1Stack,
            StackMapEntry::SameLocals1StackExtended { .. } => FrameKind::SameLocals1StackExtended,
            StackMapEntry::Chop { .. } => FrameKind::Chop,
            StackMapEntry::SameExtended { .. } => FrameKind::SameExtended,
            StackMapEntry::Append { .. } => FrameKind::Append,
            StackMapEntry::Full { .. } => FrameKind::Full,
        }
    }

    /// The tag byte this entry will be written with.
    pub fn frame_type(&self) -> u8 {
        match self {
            StackMapEntry::Same { offset_delta } => *offset_delta as u8,
            StackMapEntry::SameLocals1Stack { offset_delta, .. } => 64 + *offset_delta as u8,
            StackMapEntry::SameLocals1StackExtended { .. } => 247,
            StackMapEntry::Chop { chopped, .. } => 251 - chopped,
            StackMapEntry::SameExtended { .. } => 251,
            StackMapEntry::Append { locals, .. } => 251 + locals.len() as u8,
            StackMapEntry::Full { .. } => 255,
        }
    }

    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapEntry::Same { offset_delta }
            | StackMapEntry::SameLocals1Stack { offset_delta, .. }
            | StackMapEntry::SameLocals1StackExtended { offset_delta, .. }
            | StackMapEntry::Chop { offset_delta, .. }
            | StackMapEntry::SameExtended { offset_delta }
            | StackMapEntry::Append { offset_delta, .. }
            | StackMapEntry::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn locals(&self) -> &[VerificationType] {
        match self {
            StackMapEntry::Append { locals, .. } | StackMapEntry::Full { locals, .. } => locals,
            _ => &[],
        }
    }

    pub fn stack_items(&self) -> &[VerificationType] {
        match self {
            StackMapEntry::SameLocals1Stack { stack_item, .. }
            | StackMapEntry::SameLocals1StackExtended { stack_item, .. } => {
                std::slice::from_ref(stack_item)
            }
            StackMapEntry::Full { stack_items, .. } => stack_items,
            _ => &[],
        }
    }

    /// Exact number of bytes [`write_to`](ConstantPoolReadWrite::write_to)
    /// will produce for this entry, computed without any I/O.
    pub fn size(&self) -> usize {
        match self {
            StackMapEntry::Same { .. } => 1,
            StackMapEntry::SameLocals1Stack { stack_item, .. } => 1 + stack_item.size(),
            StackMapEntry::SameLocals1StackExtended { stack_item, .. } => 3 + stack_item.size(),
            StackMapEntry::Chop { .. } | StackMapEntry::SameExtended { .. } => 3,
            StackMapEntry::Append { locals, .. } => {
                3 + locals.iter().map(VerificationType::size).sum::<usize>()
            }
            StackMapEntry::Full {
                locals,
                stack_items,
                ..
            } => {
                7 + locals.iter().map(VerificationType::size).sum::<usize>()
                    + stack_items.iter().map(VerificationType::size).sum::<usize>()
            }
        }
    }

    /// Sets the offset delta, moving between the compact and extended forms
    /// of the SAME-family tags as needed. The explicit-offset families keep
    /// their tag.
    pub fn set_offset_delta(&mut self, new_offset: u16) -> Result<()> {
        if new_offset > MAX_OFFSET_DELTA {
            return Err(Error::Invalid(
                "stack map frame offset",
                new_offset.to_string(),
            ));
        }
        match self {
            StackMapEntry::Same { .. } => {
                *self = if new_offset <= 63 {
                    StackMapEntry::Same {
                        offset_delta: new_offset,
                    }
                } else {
                    StackMapEntry::SameExtended {
                        offset_delta: new_offset,
                    }
                };
            }
            StackMapEntry::SameLocals1Stack { stack_item, .. } => {
                let stack_item = stack_item.clone();
                *self = if new_offset <= 63 {
                    StackMapEntry::SameLocals1Stack {
                        offset_delta: new_offset,
                        stack_item,
                    }
                } else {
                    StackMapEntry::SameLocals1StackExtended {
                        offset_delta: new_offset,
                        stack_item,
                    }
                };
            }
            StackMapEntry::SameLocals1StackExtended { offset_delta, .. }
            | StackMapEntry::Chop { offset_delta, .. }
            | StackMapEntry::SameExtended { offset_delta }
            | StackMapEntry::Append { offset_delta, .. }
            | StackMapEntry::Full { offset_delta, .. } => *offset_delta = new_offset,
        }
        Ok(())
    }

    /// Adjusts the offset delta by a signed distance. `delta` may be negative.
    pub fn update_offset_delta(&mut self, delta: i32) -> Result<()> {
        let new = i32::from(self.offset_delta()) + delta;
        match u16::try_from(new) {
            Ok(n) => self.set_offset_delta(n),
            Err(_) => Err(Error::Invalid("stack map frame offset", new.to_string())),
        }
    }

    /// Changes this entry to the layout the given tag selects.
    ///
    /// SAME-family tags (0–127) re-derive the offset delta from the tag;
    /// every other tag keeps the current offset. A tag whose layout cannot
    /// carry this entry's locals/stack payload is rejected, leaving the entry
    /// unchanged: converting never drops types silently.
    pub fn set_frame_type(&mut self, tag: u16) -> Result<()> {
        let tag = match u8::try_from(tag) {
            Ok(t) => t,
            Err(_) => return Err(Error::Invalid("frame type", tag.to_string())),
        };
        let kind = FrameKind::from_tag(tag)?;
        let offset_delta = self.offset_delta();
        let (locals, mut stack_items): (Vec<_>, Vec<_>) = match self.clone() {
            StackMapEntry::Same { .. }
            | StackMapEntry::SameExtended { .. }
            | StackMapEntry::Chop { .. } => (Vec::new(), Vec::new()),
            StackMapEntry::SameLocals1Stack { stack_item, .. }
            | StackMapEntry::SameLocals1StackExtended { stack_item, .. } => {
                (Vec::new(), vec![stack_item])
            }
            StackMapEntry::Append { locals, .. } => (locals, Vec::new()),
            StackMapEntry::Full {
                locals,
                stack_items,
                ..
            } => (locals, stack_items),
        };
        *self = match (kind, locals.len(), stack_items.len()) {
            (FrameKind::Same, 0, 0) => StackMapEntry::Same {
                offset_delta: u16::from(tag),
            },
            (FrameKind::SameLocals1Stack, 0, 1) => StackMapEntry::SameLocals1Stack {
                offset_delta: u16::from(tag - 64),
                stack_item: stack_items.remove(0),
            },
            (FrameKind::SameLocals1StackExtended, 0, 1) => {
                StackMapEntry::SameLocals1StackExtended {
                    offset_delta,
                    stack_item: stack_items.remove(0),
                }
            }
            (FrameKind::Chop, 0, 0) => StackMapEntry::Chop {
                offset_delta,
                chopped: 251 - tag,
            },
            (FrameKind::SameExtended, 0, 0) => StackMapEntry::SameExtended { offset_delta },
            (FrameKind::Append, n, 0) if n == usize::from(tag - 251) => StackMapEntry::Append {
                offset_delta,
                locals,
            },
            (FrameKind::Full, _, _) => StackMapEntry::Full {
                offset_delta,
                locals,
                stack_items,
            },
            (_, n_locals, n_stack) => {
                return Err(Error::Invalid(
                    "frame type conversion",
                    format!(
                        "{} locals and {} stack items cannot be carried by frame type {}",
                        n_locals, n_stack, tag
                    ),
                ))
            }
        };
        Ok(())
    }

    /// Dispatches exactly one visitor call naming this entry's layout.
    pub fn accept<V: FrameVisitor>(&self, v: &mut V) {
        match self {
            StackMapEntry::Same { offset_delta } => v.visit_same(*offset_delta),
            StackMapEntry::SameLocals1Stack {
                offset_delta,
                stack_item,
            } => v.visit_same_locals_1_stack(*offset_delta, stack_item),
            StackMapEntry::SameLocals1StackExtended {
                offset_delta,
                stack_item,
            } => v.visit_same_locals_1_stack_extended(*offset_delta, stack_item),
            StackMapEntry::Chop {
                offset_delta,
                chopped,
            } => v.visit_chop(*offset_delta, *chopped),
            StackMapEntry::SameExtended { offset_delta } => v.visit_same_extended(*offset_delta),
            StackMapEntry::Append {
                offset_delta,
                locals,
            } => v.visit_append(*offset_delta, locals),
            StackMapEntry::Full {
                offset_delta,
                locals,
                stack_items,
            } => v.visit_full(*offset_delta, locals, stack_items),
        }
    }
}

impl ConstantPoolReadWrite for StackMapEntry {
    fn read_from<C: ConstantPoolReader, R: Read>(cp: &mut C, reader: &mut R) -> Result<Self> {
        let tag = u8::read_from(reader)?;
        Ok(match FrameKind::from_tag(tag)? {
            FrameKind::Same => StackMapEntry::Same {
                offset_delta: u16::from(tag),
            },
            FrameKind::SameLocals1Stack => StackMapEntry::SameLocals1Stack {
                offset_delta: u16::from(tag - 64),
                stack_item: VerificationType::read_from(cp, reader)?,
            },
            FrameKind::SameLocals1StackExtended => StackMapEntry::SameLocals1StackExtended {
                offset_delta: u16::read_from(reader)?,
                stack_item: VerificationType::read_from(cp, reader)?,
            },
            FrameKind::Chop => StackMapEntry::Chop {
                offset_delta: u16::read_from(reader)?,
                chopped: 251 - tag,
            },
            FrameKind::SameExtended => StackMapEntry::SameExtended {
                offset_delta: u16::read_from(reader)?,
            },
            FrameKind::Append => StackMapEntry::Append {
                offset_delta: u16::read_from(reader)?,
                locals: {
                    let mut locals = Vec::with_capacity(usize::from(tag - 251));
                    for _ in 251..tag {
                        locals.push(VerificationType::read_from(cp, reader)?);
                    }
                    locals
                },
            },
            FrameKind::Full => StackMapEntry::Full {
                offset_delta: u16::read_from(reader)?,
                locals: {
                    let n = u16::read_from(reader)?;
                    let mut locals = Vec::with_capacity(usize::from(n));
                    for _ in 0..n {
                        locals.push(VerificationType::read_from(cp, reader)?);
                    }
                    locals
                },
                stack_items: {
                    let n = u16::read_from(reader)?;
                    let mut stack = Vec::with_capacity(usize::from(n));
                    for _ in 0..n {
                        stack.push(VerificationType::read_from(cp, reader)?);
                    }
                    stack
                },
            },
        })
    }

    fn write_to<C: ConstantPoolWriter, W: Write>(&self, cp: &mut C, writer: &mut W) -> Result<()> {
        fn explicit(off: u16) -> Result<u16> {
            if off > MAX_OFFSET_DELTA {
                Err(Error::Invalid("stack map frame offset", off.to_string()))
            } else {
                Ok(off)
            }
        }
        match self {
            StackMapEntry::Same {
                offset_delta: off @ 0..=63,
            } => (*off as u8).write_to(writer)?,
            StackMapEntry::Same { offset_delta } => {
                return Err(Error::Invalid(
                    "Same frame offset (compact form carries 0..=63)",
                    offset_delta.to_string(),
                ))
            }
            StackMapEntry::SameLocals1Stack {
                offset_delta: off @ 0..=63,
                stack_item,
            } => {
                (*off as u8 + 64).write_to(writer)?;
                stack_item.write_to(cp, writer)?;
            }
            StackMapEntry::SameLocals1Stack { offset_delta, .. } => {
                return Err(Error::Invalid(
                    "SameLocals1Stack frame offset (compact form carries 0..=63)",
                    offset_delta.to_string(),
                ))
            }
            StackMapEntry::SameLocals1StackExtended {
                offset_delta,
                stack_item,
            } => {
                247u8.write_to(writer)?;
                explicit(*offset_delta)?.write_to(writer)?;
                stack_item.write_to(cp, writer)?;
            }
            StackMapEntry::Chop {
                offset_delta,
                chopped: c @ 1..=3,
            } => {
                (251 - *c).write_to(writer)?;
                explicit(*offset_delta)?.write_to(writer)?;
            }
            StackMapEntry::Chop { chopped, .. } => {
                return Err(Error::Invalid("Chop value", chopped.to_string()))
            }
            StackMapEntry::SameExtended { offset_delta } => {
                251u8.write_to(writer)?;
                explicit(*offset_delta)?.write_to(writer)?;
            }
            StackMapEntry::Append {
                offset_delta,
                locals,
            } if (1..=3).contains(&locals.len()) => {
                (251 + locals.len() as u8).write_to(writer)?;
                explicit(*offset_delta)?.write_to(writer)?;
                for local in locals {
                    local.write_to(cp, writer)?;
                }
            }
            StackMapEntry::Append { locals, .. } => {
                return Err(Error::Invalid(
                    "Append locals length",
                    locals.len().to_string(),
                ))
            }
            StackMapEntry::Full {
                offset_delta,
                locals,
                stack_items,
            } => {
                255u8.write_to(writer)?;
                explicit(*offset_delta)?.write_to(writer)?;
                (locals.len() as u16).write_to(writer)?;
                for local in locals {
                    local.write_to(cp, writer)?;
                }
                (stack_items.len() as u16).write_to(writer)?;
                for item in stack_items {
                    item.write_to(cp, writer)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for StackMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, types: &[VerificationType]) -> fmt::Result {
            write!(f, ", {}={{", name)?;
            for (i, t) in types.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", t)?;
            }
            f.write_str("}")
        }
        f.write_str("(")?;
        match self {
            StackMapEntry::Same { .. } => f.write_str("SAME")?,
            StackMapEntry::SameLocals1Stack { .. } => f.write_str("SAME_LOCALS_1_STACK")?,
            StackMapEntry::SameLocals1StackExtended { .. } => {
                f.write_str("SAME_LOCALS_1_STACK_EXTENDED")?
            }
            StackMapEntry::Chop { chopped, .. } => write!(f, "CHOP {}", chopped)?,
            StackMapEntry::SameExtended { .. } => f.write_str("SAME_EXTENDED")?,
            StackMapEntry::Append { locals, .. } => write!(f, "APPEND {}", locals.len())?,
            StackMapEntry::Full { .. } => f.write_str("FULL")?,
        }
        write!(f, ", offset delta={}", self.offset_delta())?;
        if !self.locals().is_empty() {
            list(f, "locals", self.locals())?;
        }
        if !self.stack_items().is_empty() {
            list(f, "stack items", self.stack_items())?;
        }
        f.write_str(")")
    }
}

/// Callback for walking frame entries; one method per layout.
pub trait FrameVisitor {
    fn visit_same(&mut self, _offset_delta: u16) {}
    fn visit_same_locals_1_stack(&mut self, _offset_delta: u16, _stack_item: &VerificationType) {}
    fn visit_same_locals_1_stack_extended(
        &mut self,
        _offset_delta: u16,
        _stack_item: &VerificationType,
    ) {
    }
    fn visit_chop(&mut self, _offset_delta: u16, _chopped: u8) {}
    fn visit_same_extended(&mut self, _offset_delta: u16) {}
    fn visit_append(&mut self, _offset_delta: u16, _locals: &[VerificationType]) {}
    fn visit_full(
        &mut self,
        _offset_delta: u16,
        _locals: &[VerificationType],
        _stack_items: &[VerificationType],
    ) {
    }
}

/// Body of a `StackMapTable` attribute: frame entries in bytecode order.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct StackMapTable {
    pub entries: Vec<StackMapEntry>,
}

impl StackMapTable {
    /// Exact byte length of the attribute body (entry count plus entries).
    pub fn size(&self) -> usize {
        2 + self.entries.iter().map(StackMapEntry::size).sum::<usize>()
    }
}

impl ConstantPoolReadWrite for StackMapTable {
    fn read_from<C: ConstantPoolReader, R: Read>(cp: &mut C, reader: &mut R) -> Result<Self> {
        let n = u16::read_from(reader)?;
        let mut entries = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            entries.push(StackMapEntry::read_from(cp, reader)?);
        }
        Ok(StackMapTable { entries })
    }

    fn write_to<C: ConstantPoolWriter, W: Write>(&self, cp: &mut C, writer: &mut W) -> Result<()> {
        (self.entries.len() as u16).write_to(writer)?;
        for entry in &self.entries {
            entry.write_to(cp, writer)?;
        }
        Ok(())
    }
}
