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

//! A mutable instruction sequence with stable handles.
//!
//! Every instruction lives in a handle slot; a branch refers to its target by
//! [`HandleId`] and the target slot keeps a back-reference set of everyone
//! pointing at it, so the two sides of the relation can never drift apart.
//! Positions are assigned by [`InsnList::set_positions`], which repeats update
//! passes until the layout reaches a fixed point.

use std::convert::TryFrom;
use std::io::Write;

use indexmap::IndexSet;
use log::{debug, trace};

use crate::constants;
use crate::error::{Error, Result};
use crate::insn::{BranchInsn, Insn};
use crate::rw::ReadWrite;

/// Stable identifier of a handle slot.
///
/// Ids are minted by [`InsnList::append`] and stay valid for the lifetime of
/// the list, even after the instruction behind them is removed (the slot then
/// *dangles* and can still be rendered and diagnosed). An id is only
/// meaningful for the list that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u32);

#[derive(Debug, Default)]
struct Slot {
    insn: Option<Insn>,
    position: i32,
    targeters: IndexSet<HandleId>,
}

/// An instruction sequence under construction or edit.
#[derive(Debug, Default)]
pub struct InsnList {
    slots: Vec<Slot>,
    order: Vec<HandleId>,
}

impl InsnList {
    pub fn new() -> InsnList {
        InsnList::default()
    }

    /// Appends an instruction, returning its handle.
    pub fn append(&mut self, insn: Insn) -> HandleId {
        let id = HandleId(self.slots.len() as u32);
        let target = match &insn {
            Insn::Branch(b) => b.target(),
            _ => None,
        };
        self.slots.push(Slot {
            insn: Some(insn),
            position: -1,
            targeters: IndexSet::new(),
        });
        self.order.push(id);
        if target.is_some() {
            self.notify_target(None, target, id);
        }
        id
    }

    /// Appends a branch instruction, registering the initial target if given.
    pub fn append_branch(&mut self, opcode: u8, target: Option<HandleId>) -> Result<HandleId> {
        let h = self.append(Insn::Branch(BranchInsn::new(opcode)?));
        if target.is_some() {
            self.set_target(h, target)?;
        }
        Ok(h)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in sequence order.
    pub fn handles(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.order.iter().copied()
    }

    /// The instruction behind a handle, or `None` if it was removed.
    pub fn get(&self, h: HandleId) -> Option<&Insn> {
        self.slot(h).insn.as_ref()
    }

    /// Byte position assigned by the last layout pass; `-1` before the first
    /// pass and after removal.
    pub fn position(&self, h: HandleId) -> i32 {
        self.slot(h).position
    }

    /// The set of branch handles currently targeting `h`.
    pub fn targeters(&self, h: HandleId) -> &IndexSet<HandleId> {
        &self.slot(h).targeters
    }

    /// Total encoded length of the sequence with current instruction lengths.
    pub fn byte_len(&self) -> usize {
        self.order
            .iter()
            .map(|&h| self.slot(h).insn.as_ref().map(Insn::size).unwrap_or(0))
            .sum()
    }

    fn slot(&self, h: HandleId) -> &Slot {
        &self.slots[h.0 as usize]
    }

    fn branch(&self, h: HandleId) -> Result<&BranchInsn> {
        match self.slot(h).insn {
            Some(Insn::Branch(ref b)) => Ok(b),
            _ => Err(Error::Invalid(
                "branch handle",
                format!("{:?} does not hold a branch instruction", h),
            )),
        }
    }

    /// The one routine that touches back-reference sets. Removing the source
    /// from the old target and adding it to the new one happens in a single
    /// call, so no other component can observe a one-sided relation.
    fn notify_target(&mut self, old: Option<HandleId>, new: Option<HandleId>, source: HandleId) {
        if let Some(o) = old {
            self.slots[o.0 as usize].targeters.remove(&source);
        }
        if let Some(n) = new {
            self.slots[n.0 as usize].targeters.insert(source);
        }
    }

    /// Retargets a branch, keeping both back-reference sets consistent.
    pub fn set_target(&mut self, source: HandleId, new: Option<HandleId>) -> Result<()> {
        let old = self.branch(source)?.target();
        self.notify_target(old, new, source);
        if let Some(Insn::Branch(b)) = &mut self.slots[source.0 as usize].insn {
            b.target = new;
        }
        Ok(())
    }

    /// Forced retarget, used when a referenced handle is deleted or merged:
    /// succeeds only if the branch currently targets exactly `expected_old`.
    /// A mismatch means the caller's view of the graph is stale and nothing
    /// is changed.
    pub fn update_target(
        &mut self,
        source: HandleId,
        expected_old: Option<HandleId>,
        new: Option<HandleId>,
    ) -> Result<()> {
        let actual = self.branch(source)?.target();
        if actual == expected_old {
            self.set_target(source, new)
        } else {
            Err(Error::StaleTarget {
                expected: expected_old,
                actual,
            })
        }
    }

    /// Whether `h` is the current target of the given branch.
    pub fn contains_target(&self, source: HandleId, h: HandleId) -> Result<bool> {
        Ok(self.branch(source)?.contains_target(h))
    }

    /// Removes the instruction behind `h` from the sequence.
    ///
    /// A branch clears its own target through the notification routine first,
    /// so the back-reference invariant holds during teardown. Branches that
    /// target `h` keep doing so; the handle dangles and layout or emission
    /// against it fails with [`Error::Unpositioned`] until the survivors are
    /// redirected with [`update_target`](InsnList::update_target).
    pub fn remove(&mut self, h: HandleId) -> Result<()> {
        if self.slot(h).insn.is_none() {
            return Err(Error::Invalid(
                "handle",
                format!("{:?} was already removed", h),
            ));
        }
        if matches!(self.slot(h).insn, Some(Insn::Branch(_))) {
            self.set_target(h, None)?;
            if let Some(Insn::Branch(b)) = &mut self.slots[h.0 as usize].insn {
                b.index = -1;
            }
        }
        let slot = &mut self.slots[h.0 as usize];
        slot.insn = None;
        slot.position = -1;
        self.order.retain(|&x| x != h);
        Ok(())
    }

    /// Relative offset from a branch to its target: `target.position -
    /// source.position`. Valid only after [`set_positions`](InsnList::set_positions);
    /// a missing target or one without a valid position is an error naming the
    /// offending handle.
    pub fn target_offset(&self, source: HandleId) -> Result<i32> {
        let b = self.branch(source)?;
        let t = match b.target() {
            Some(t) => t,
            None => {
                return Err(Error::Invalid(
                    "branch target",
                    format!("{:?} has a null target", source),
                ))
            }
        };
        let tp = self.slot(t).position;
        if tp < 0 {
            return Err(Error::Unpositioned(t));
        }
        Ok(tp - self.slot(source).position)
    }

    /// Assigns byte positions to every instruction.
    ///
    /// An initial sweep lays instructions out with their current lengths,
    /// then update passes shift positions by the drift accumulated so far in
    /// the pass. A narrow `goto`/`jsr` whose offset cannot be proven to fit a
    /// signed 16-bit field once every remaining widening is accounted for is
    /// rewritten to its `_w` form, contributing 2 bytes of drift. The loop
    /// stops at the first pass with zero drift. Every non-zero pass widens at
    /// least one branch and widened branches never narrow again, so the pass
    /// count is bounded by the handle count; exceeding it means the list is
    /// corrupted and is an error.
    pub fn set_positions(&mut self) -> Result<()> {
        let mut pos = 0i32;
        for i in 0..self.order.len() {
            let h = self.order[i];
            self.slots[h.0 as usize].position = pos;
            pos += self.slots[h.0 as usize]
                .insn
                .as_ref()
                .map(Insn::size)
                .unwrap_or(0) as i32;
        }
        let max_passes = self.order.len() + 1;
        for pass in 0..=max_passes {
            let max_additional = 2 * self.narrow_widenable() as i32;
            let mut drift = 0i32;
            for i in 0..self.order.len() {
                let h = self.order[i];
                drift += self.update_position(h, drift, max_additional)?;
            }
            trace!("layout pass {}: {} bytes of drift", pass, drift);
            if drift == 0 {
                return Ok(());
            }
        }
        Err(Error::Invalid(
            "instruction list",
            format!("layout did not settle after {} passes", max_passes),
        ))
    }

    fn narrow_widenable(&self) -> usize {
        self.order
            .iter()
            .filter(|&&h| {
                matches!(self.slot(h).insn, Some(Insn::Branch(ref b))
                    if b.length == 3 && constants::wide_form(b.opcode).is_some())
            })
            .count()
    }

    /// One instruction's share of an update pass: shift the position by the
    /// drift so far and report the extra length this instruction contributes.
    /// Idempotent apart from position/length bookkeeping, so repeated passes
    /// are safe.
    fn update_position(&mut self, h: HandleId, offset: i32, max_additional: i32) -> Result<i32> {
        // Estimate the offset before shifting our own position, as positions
        // earlier in the pass have already moved and later ones have not.
        let pending = match self.slot(h).insn {
            Some(Insn::Branch(ref b)) if b.length == 3 => match constants::wide_form(b.opcode) {
                Some(wide) => Some((wide, self.target_offset(h)?)),
                None => None,
            },
            _ => None,
        };
        self.slots[h.0 as usize].position += offset;
        if let Some((wide, i)) = pending {
            if i.abs() >= i32::from(i16::MAX) - max_additional {
                if let Some(Insn::Branch(b)) = &mut self.slots[h.0 as usize].insn {
                    debug!(
                        "widening {} at {:?} (estimated offset {})",
                        constants::mnemonic(b.opcode),
                        h,
                        i
                    );
                    b.opcode = wide;
                    b.length = 5;
                    b.index = i;
                }
                return Ok(2);
            }
            if let Some(Insn::Branch(b)) = &mut self.slots[h.0 as usize].insn {
                b.index = i;
            }
        }
        Ok(0)
    }

    /// Writes the sequence as bytecode. Branch offsets are recomputed from
    /// positions, never taken from a previous pass.
    ///
    /// When a narrow branch's offset is out of the signed 16-bit range the
    /// opcode byte has already been written, leaving the writer at an
    /// inconsistent position; callers must discard the output on error.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for &h in &self.order {
            match self.slot(h).insn {
                Some(Insn::Simple {
                    opcode,
                    ref operands,
                }) => {
                    opcode.write_to(writer)?;
                    writer.write_all(operands)?;
                }
                Some(Insn::Branch(ref b)) => {
                    b.opcode.write_to(writer)?;
                    let off = self.target_offset(h)?;
                    if b.is_wide() {
                        off.write_to(writer)?;
                    } else {
                        match i16::try_from(off) {
                            Ok(short) => short.write_to(writer)?,
                            Err(_) => return Err(Error::BranchOffset(off)),
                        }
                    }
                }
                None => unreachable!("handles in order always hold an instruction"),
            }
        }
        Ok(())
    }

    /// Diagnostic rendering of one handle.
    ///
    /// A branch renders its target as the resolved absolute position, or as
    /// one of three distinct markers: `null` (no target), `<points to
    /// itself>`, `<dangling handle>` (target handle exists but its
    /// instruction was removed).
    pub fn render(&self, h: HandleId) -> String {
        match self.slot(h).insn {
            None => format!("{:?}: <removed>", h),
            Some(Insn::Simple { opcode, .. }) => {
                format!("{}[{}]", constants::mnemonic(opcode), opcode)
            }
            Some(Insn::Branch(ref b)) => {
                let target = match b.target() {
                    None => "null".to_string(),
                    Some(t) if t == h => "<points to itself>".to_string(),
                    Some(t) => match self.slot(t).insn {
                        None => "<dangling handle>".to_string(),
                        Some(_) => self.slot(t).position.to_string(),
                    },
                };
                format!(
                    "{}[{}]({}) -> {}",
                    constants::mnemonic(b.opcode),
                    b.opcode,
                    b.length,
                    target
                )
            }
        }
    }
}
