// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use revm::bytecode::OpCode;

/// Frame-transition classification of EVM opcodes.
///
/// The trace does not mark function or call boundaries, so the reconstructor
/// infers them from the opcode that was executed together with the call
/// depth of the following step.
///
/// # Example
/// ```rust
/// use revm::bytecode::OpCode;
/// use calltree_common::OpcodeTr;
///
/// assert!(OpCode::DELEGATECALL.is_call());
/// assert!(OpCode::CREATE2.opens_frame());
/// assert!(!OpCode::JUMP.opens_frame());
/// ```
pub trait OpcodeTr {
    /// Check if this opcode is a message call (`CALL`, `CALLCODE`, `DELEGATECALL`, `STATICCALL`)
    fn is_call(&self) -> bool;

    /// Check if this opcode creates a contract (`CREATE`, `CREATE2`)
    fn is_create(&self) -> bool;

    /// Check if this opcode may start a new execution frame one call level deeper
    fn opens_frame(&self) -> bool {
        self.is_call() || self.is_create()
    }
}

impl OpcodeTr for OpCode {
    fn is_call(&self) -> bool {
        matches!(*self, Self::CALL | Self::CALLCODE | Self::DELEGATECALL | Self::STATICCALL)
    }

    fn is_create(&self) -> bool {
        matches!(*self, Self::CREATE | Self::CREATE2)
    }
}

/// Raw opcode bytes that are not assigned an instruction classify as nothing.
impl OpcodeTr for u8 {
    fn is_call(&self) -> bool {
        OpCode::new(*self).is_some_and(|op| op.is_call())
    }

    fn is_create(&self) -> bool {
        OpCode::new(*self).is_some_and(|op| op.is_create())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_family() {
        for op in [OpCode::CALL, OpCode::CALLCODE, OpCode::DELEGATECALL, OpCode::STATICCALL] {
            assert!(op.is_call(), "{op} should be a call");
            assert!(!op.is_create());
            assert!(op.opens_frame());
        }
    }

    #[test]
    fn test_create_family() {
        for op in [OpCode::CREATE, OpCode::CREATE2] {
            assert!(op.is_create());
            assert!(!op.is_call());
            assert!(op.opens_frame());
        }
    }

    #[test]
    fn test_raw_bytes() {
        assert!(0xf1u8.is_call());
        assert!(0xf0u8.is_create());
        assert!(!0x56u8.opens_frame());
        assert!(!0x5bu8.opens_frame());
        // 0x0c is unassigned
        assert!(!0x0cu8.opens_frame());
    }
}
