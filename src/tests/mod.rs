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

mod frame;

use std::borrow::Cow;

use crate::rw::{ConstantPoolReader, ConstantPoolWriter};

/// In-memory constant pool holding class entries only; index 1 is the first
/// element, like a real pool.
pub(crate) struct ArrCp(pub Vec<Cow<'static, str>>);

impl ConstantPoolReader for ArrCp {
    fn read_class(&mut self, idx: u16) -> Option<Cow<'static, str>> {
        self.0.get(usize::from(idx).checked_sub(1)?).cloned()
    }
}

impl ConstantPoolWriter for ArrCp {
    fn insert_class(&mut self, name: Cow<'static, str>) -> u16 {
        if let Some(i) = self.0.iter().position(|n| *n == name) {
            return (i + 1) as u16;
        }
        self.0.push(name);
        self.0.len() as u16
    }
}

pub(crate) fn arr_cp(classes: &[&'static str]) -> ArrCp {
    ArrCp(classes.iter().map(|&c| Cow::Borrowed(c)).collect())
}
