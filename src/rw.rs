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

//! Read/write seams shared by every binary structure in this crate.

use std::borrow::Cow;
use std::io::{Read, Write};

use crate::error::Result;

/// The generic read and write trait. This indicates a structure can be read without additional contextual information.
///
/// All structures here are big-endian, as everything in a class file is.
/// Integer types implement `ReadWrite`.
pub trait ReadWrite
where
    Self: Sized,
{
    fn read_from<T: Read>(reader: &mut T) -> Result<Self>;
    fn write_to<T: Write>(&self, writer: &mut T) -> Result<()>;
}

/// A trait for reading constant pool entries.
///
/// The constant pool itself is owned by the surrounding class file machinery;
/// this crate only ever resolves class entries by their 16-bit index, so that
/// is the entire surface. Receivers are mutable to support implementations
/// that lazily populate their content.
pub trait ConstantPoolReader {
    /// Resolves a `Class` entry to its internal (slash-separated) name.
    fn read_class(&mut self, idx: u16) -> Option<Cow<'static, str>>;
}

/// A trait for writing constant pool entries.
pub trait ConstantPoolWriter {
    /// Inserts a `Class` entry for the given internal name.
    ///
    /// Returns an index that points to the inserted entry.
    fn insert_class(&mut self, name: Cow<'static, str>) -> u16;
}

/// The read and write trait where information must be retrieved along with constant pool information.
///
/// And will insert constant entries into the the constant pool when writing.
pub trait ConstantPoolReadWrite
where
    Self: Sized,
{
    fn read_from<C: ConstantPoolReader, R: Read>(cp: &mut C, reader: &mut R) -> Result<Self>;
    fn write_to<C: ConstantPoolWriter, W: Write>(&self, cp: &mut C, writer: &mut W) -> Result<()>;
}

macro_rules! impl_readwrite_nums {
    ($(($i:ty, $s:literal)),*) => {
        $(
            impl ReadWrite for $i {
                fn read_from<T: Read>(reader: &mut T) -> Result<Self> {
                    let mut bytes = [0u8; $s];
                    reader.read_exact(&mut bytes)?;
                    Ok(<$i>::from_be_bytes(bytes))
                }
                fn write_to<T: Write>(&self, writer: &mut T) -> Result<()> {
                    writer.write_all(&self.to_be_bytes())?;
                    Ok(())
                }
            }
        )*
    };
}

impl_readwrite_nums! { (u8, 1), (i8, 1), (u16, 2), (i16, 2), (u32, 4), (i32, 4) }
