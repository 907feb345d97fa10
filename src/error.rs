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
use thiserror::Error;

use crate::code::HandleId;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("Invalid {0}: {1}")]
    Invalid(&'static str, String),
    #[error("Branch offset does not fit in a signed 16-bit field: {0}")]
    BranchOffset(i32),
    #[error("Branch expected to target {expected:?}, but targets {actual:?}")]
    StaleTarget {
        expected: Option<HandleId>,
        actual: Option<HandleId>,
    },
    #[error("Target {0:?} has no valid position; it was never laid out or has been removed")]
    Unpositioned(HandleId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
