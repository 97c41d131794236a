// Reference rust implementation of PegVM (parsing expression grammar virtual machine).
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2021-2024 by
//     Dr Maxim Orlovsky <orlovsky@ubideco.org>
//
// Copyright (C) 2021-2024 UBIDECO Labs,
//     Laboratories for Distributed and Cognitive Computing, Switzerland.
//     All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::{self, Display, Formatter};

use super::opcodes::OpMeta;
use super::OpCode;

/// Kinds of malformed-bytecode conditions detectable while decoding a
/// single instruction.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DisassembleErrorKind {
    /// unknown opcode.
    UnknownOpcode,

    /// failed to decode length of immediate.
    BadImmediateLen,

    /// missing immediate where one was expected.
    MissingImmediate,

    /// found immediate where none was expected.
    UnexpectedImmediate,

    /// unexpected end of bytecode inside an instruction.
    UnexpectedEof,
}

/// Error decoding an instruction from compiled bytecode. Typically means
/// that corrupt or hostile bytecode is being run.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display("invalid instruction @ XP {xp}: {kind}")]
pub struct DisassembleError {
    /// Specific malformed condition.
    pub kind: DisassembleErrorKind,

    /// Code address at which the offending instruction starts.
    pub xp: u64,
}

/// Error produced when applying a signed code offset to an execution
/// position overflows the 64-bit address space in either direction.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display("code offset out of range")]
pub struct OffsetOverflow;

/// Adds signed offset `s` to code position `base` with overflow detection.
#[inline]
pub fn add_offset(base: u64, s: i64) -> Result<u64, OffsetOverflow> {
    if s >= 0 { base.checked_add(s as u64) } else { base.checked_sub(s.unsigned_abs()) }
        .ok_or(OffsetOverflow)
}

/// Converts an immediate-width code (a 3-bit header field) into the number
/// of bytes it denotes. Codes 5 through 7 are invalid.
#[inline]
pub fn imm_width_decode(code: u8) -> Option<u8> {
    match code {
        0 => Some(0),
        1 => Some(1),
        2 => Some(2),
        3 => Some(4),
        4 => Some(8),
        _ => None,
    }
}

/// Converts a byte count into an immediate-width header code.
///
/// # Panics
///
/// If `bytes` is not one of 0, 1, 2, 4 or 8.
#[inline]
pub fn imm_width_encode(bytes: usize) -> u8 {
    match bytes {
        0 => 0,
        1 => 1,
        2 => 2,
        4 => 3,
        8 => 4,
        _ => panic!("invalid immediate width {bytes}"),
    }
}

/// A single PEG instruction, decoded from raw bytecode.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Op {
    /// Code address of the start of the instruction.
    pub xp: u64,

    /// Value of immediate slot 0. Signed values are stored as their
    /// 2's-complement reinterpretation.
    pub imm0: u64,

    /// Value of immediate slot 1.
    pub imm1: u64,

    /// Value of immediate slot 2.
    pub imm2: u64,

    /// The instruction opcode.
    pub code: OpCode,

    /// Encoded byte length of the instruction; decoding of the next
    /// instruction begins at `xp + len`.
    pub len: u8,
}

impl Op {
    /// Attempts to decode an instruction from the bytecode stream at code
    /// address `xp`.
    ///
    /// Returns `Ok(None)` when `xp` points at or past the end of the
    /// stream, which is the ordinary program-termination condition.
    pub fn decode(stream: &[u8], xp: u64) -> Result<Option<Op>, DisassembleError> {
        let fail = |kind| DisassembleError { kind, xp };

        if xp >= stream.len() as u64 {
            return Ok(None);
        }
        let pos = xp as usize;
        let byte0 = stream[pos];

        let (code, w0, w1, w2, header_len) = if byte0 & 0x80 == 0x80 {
            let byte1 = *stream
                .get(pos + 1)
                .ok_or(fail(DisassembleErrorKind::UnexpectedEof))?;
            let a = (byte0 & 0x7e) >> 1;
            let b = (byte0 & 0x01) << 2 | (byte1 & 0xc0) >> 6;
            let c = (byte1 & 0x38) >> 3;
            let d = byte1 & 0x07;
            (a, b, c, d, 2u8)
        } else {
            let a = (byte0 & 0x70) >> 4;
            let b = (byte0 & 0x0c) >> 2;
            let c = byte0 & 0x03;
            (a, b, c, 0, 1u8)
        };

        let len0 = imm_width_decode(w0).ok_or(fail(DisassembleErrorKind::BadImmediateLen))?;
        let len1 = imm_width_decode(w1).ok_or(fail(DisassembleErrorKind::BadImmediateLen))?;
        let len2 = imm_width_decode(w2).ok_or(fail(DisassembleErrorKind::BadImmediateLen))?;

        let i = pos + header_len as usize;
        let j = i + len0 as usize;
        let k = j + len1 as usize;
        let l = k + len2 as usize;
        if l > stream.len() {
            return Err(fail(DisassembleErrorKind::UnexpectedEof));
        }

        let code = OpCode::with(code).ok_or(fail(DisassembleErrorKind::UnknownOpcode))?;
        let meta = code.meta();

        let imm0 = meta.imm0.decode(&stream[i..j]).map_err(fail)?;
        let imm1 = meta.imm1.decode(&stream[j..k]).map_err(fail)?;
        let imm2 = meta.imm2.decode(&stream[k..l]).map_err(fail)?;

        Ok(Some(Op {
            xp,
            imm0,
            imm1,
            imm2,
            code,
            len: header_len + len0 + len1 + len2,
        }))
    }

    /// Returns the static metadata record for this instruction's opcode.
    #[inline]
    pub fn meta(&self) -> &'static OpMeta { self.code.meta() }

    /// Re-encodes the instruction into its bytecode form.
    #[inline]
    pub fn encode(&self) -> Vec<u8> { self.meta().encode(self.imm0, self.imm1, self.imm2) }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let meta = self.meta();
        write!(f, "{}<", meta.name)?;
        let mut first = true;
        for (imm, v) in [(&meta.imm0, self.imm0), (&meta.imm1, self.imm1), (&meta.imm2, self.imm2)]
        {
            if imm.is_present(v) {
                if !first {
                    f.write_str(",")?;
                }
                write!(f, "{v}")?;
                first = false;
            }
        }
        f.write_str(">")
    }
}

impl OpMeta {
    /// Encodes an instruction with the given immediate values, choosing the
    /// shortest representation the format permits.
    ///
    /// The one-byte header is used whenever the opcode lies in `0..=7`, the
    /// third immediate is absent and both remaining immediates fit in four
    /// bytes; otherwise the two-byte header is used.
    pub fn encode(&self, imm0: u64, imm1: u64, imm2: u64) -> Vec<u8> {
        let e0 = self.imm0.encode(imm0);
        let e1 = self.imm1.encode(imm1);
        let e2 = self.imm2.encode(imm2);
        let code = self.code as u8;

        let mut buf = Vec::with_capacity(2 + e0.len() + e1.len() + e2.len());
        if code <= 0x07 && e2.is_empty() && e0.len() <= 4 && e1.len() <= 4 {
            let b = imm_width_encode(e0.len());
            let c = imm_width_encode(e1.len());
            buf.push(code << 4 | b << 2 | c);
        } else {
            let b = imm_width_encode(e0.len());
            let c = imm_width_encode(e1.len());
            let d = imm_width_encode(e2.len());
            buf.push(0x80 | code << 1 | b >> 2);
            buf.push((b & 0x03) << 6 | c << 3 | d);
        }
        buf.extend_from_slice(e0.as_ref());
        buf.extend_from_slice(e1.as_ref());
        buf.extend_from_slice(e2.as_ref());
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(code: OpCode, imm0: u64, imm1: u64, imm2: u64) -> Vec<u8> {
        code.meta().encode(imm0, imm1, imm2)
    }

    fn decode_one(bytes: &[u8]) -> Op {
        Op::decode(bytes, 0).expect("well-formed instruction").expect("non-empty stream")
    }

    #[test]
    fn short_form_selection() {
        // No immediates at all: a bare header byte.
        assert_eq!(encode(OpCode::Nop, 0, 0, 0), vec![0x00]);
        // Optional immediate equal to its default is omitted.
        assert_eq!(encode(OpCode::AnyB, 1, 0, 0), vec![0x40]);
        // One single-byte immediate.
        assert_eq!(encode(OpCode::Choice, 7, 0, 0), vec![0x14, 0x07]);
        assert_eq!(encode(OpCode::SameB, b'x' as u64, 1, 0), vec![0x54, 0x78]);
        // Two immediates, both present.
        assert_eq!(encode(OpCode::SameB, b'a' as u64, 3, 0), vec![0x55, 0x61, 0x03]);
    }

    #[test]
    fn long_form_selection() {
        // Opcodes above 7 always use the two-byte header.
        assert_eq!(encode(OpCode::Jmp, (-3i64) as u64, 0, 0), vec![0x90, 0x40, 0xfd]);
        assert_eq!(encode(OpCode::Ret, 0, 0, 0), vec![0x96, 0x00]);
        assert_eq!(encode(OpCode::End, 0, 0, 0), vec![0xfe, 0x00]);
        assert_eq!(encode(OpCode::GiveUp, 0, 0, 0), vec![0xfc, 0x00]);
        assert_eq!(encode(OpCode::BCap, 0, 0, 0), vec![0xac, 0x40, 0x00]);
        assert_eq!(encode(OpCode::ECap, 0, 0, 0), vec![0xae, 0x40, 0x00]);
        assert_eq!(encode(OpCode::Fail2X, 0, 0, 0), vec![0xa6, 0x00]);
        assert_eq!(encode(OpCode::FCap, 1, 2, 0), vec![0xaa, 0x48, 0x01, 0x02]);
        // Three immediates force the long header even for low opcodes.
        assert_eq!(
            encode(OpCode::TSameB, 5, b'q' as u64, 2),
            vec![0x9a, 0x49, 0x05, 0x71, 0x02]
        );
    }

    #[test]
    fn wide_immediate_forces_long_form() {
        // A 64-bit immediate is not representable in the short header even
        // for an opcode in the 0..=7 range.
        let bytes = encode(OpCode::Choice, 0x1_0000_0000, 0, 0);
        assert_eq!(bytes[0] & 0x80, 0x80);
        assert_eq!(decode_one(&bytes).imm0, 0x1_0000_0000);
        assert_eq!(bytes.len(), 2 + 8);
    }

    #[test]
    fn signed_offset_boundaries() {
        assert_eq!(encode(OpCode::Jmp, 0x7f, 0, 0), vec![0x90, 0x40, 0x7f]);
        assert_eq!(encode(OpCode::Jmp, 0x80, 0, 0), vec![0x90, 0x80, 0x80, 0x00]);
        assert_eq!(encode(OpCode::Jmp, (-1i64) as u64, 0, 0), vec![0x90, 0x40, 0xff]);
        assert_eq!(encode(OpCode::Jmp, 0x100, 0, 0), vec![0x90, 0x80, 0x00, 0x01]);
        assert_eq!(encode(OpCode::Jmp, (-128i64) as u64, 0, 0), vec![0x90, 0x40, 0x80]);
        assert_eq!(encode(OpCode::Jmp, (-129i64) as u64, 0, 0), vec![0x90, 0x80, 0x7f, 0xff]);
    }

    #[test]
    fn decode_short_form() {
        let op = decode_one(&[0x14, 0x07]);
        assert_eq!(op.code, OpCode::Choice);
        assert_eq!(op.imm0, 7);
        assert_eq!(op.len, 2);

        let op = decode_one(&[0x40]);
        assert_eq!(op.code, OpCode::AnyB);
        assert_eq!(op.imm0, 1, "omitted optional immediate takes its default");
        assert_eq!(op.len, 1);
    }

    #[test]
    fn decode_long_form() {
        let op = decode_one(&[0x90, 0x40, 0xf3]);
        assert_eq!(op.code, OpCode::Jmp);
        assert_eq!(op.imm0 as i64, -13);
        assert_eq!(op.len, 3);

        let op = decode_one(&[0x9a, 0x49, 0x05, 0x71, 0x02]);
        assert_eq!(op.code, OpCode::TSameB);
        assert_eq!((op.imm0, op.imm1, op.imm2), (5, 0x71, 2));
        assert_eq!(op.len, 5);
    }

    #[test]
    fn decode_reports_positions() {
        let stream = [0x00, 0x00, 0x14, 0x07];
        let op = Op::decode(&stream, 2).unwrap().unwrap();
        assert_eq!(op.xp, 2);
        assert_eq!(op.code, OpCode::Choice);
        assert!(Op::decode(&stream, 4).unwrap().is_none());
        assert!(Op::decode(&stream, 100).unwrap().is_none());
    }

    #[test]
    fn decode_unknown_opcode() {
        // Short-form opcode slots are all defined; long form 0x09 is not.
        let err = Op::decode(&[0x92, 0x00], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnknownOpcode);
        assert_eq!(err.xp, 0);
        // Reserved code point 0x18.
        let err = Op::decode(&[0xb0, 0x00], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnknownOpcode);
    }

    #[test]
    fn decode_bad_width_code() {
        // Long form with imm2 width code 5.
        let err = Op::decode(&[0x80, 0x05], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::BadImmediateLen);
        // Long form with imm1 width code 7.
        let err = Op::decode(&[0x80, 0x38], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::BadImmediateLen);
    }

    #[test]
    fn decode_truncated() {
        // Long-form header cut after its first byte.
        let err = Op::decode(&[0x90], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnexpectedEof);
        // Immediate bytes missing from the stream.
        let err = Op::decode(&[0x14], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnexpectedEof);
        let err = Op::decode(&[0x90, 0x80, 0x7f], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnexpectedEof);
    }

    #[test]
    fn decode_slot_mismatches() {
        // NOP declares no immediates; a nonzero width is an error.
        let err = Op::decode(&[0x04, 0xaa], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::UnexpectedImmediate);
        // CHOICE requires imm0; zero width is an error.
        let err = Op::decode(&[0x10], 0).unwrap_err();
        assert_eq!(err.kind, DisassembleErrorKind::MissingImmediate);
    }

    #[test]
    fn roundtrip_whole_isa() {
        use OpCode::*;
        let cases: &[(OpCode, u64, u64, u64)] = &[
            (Nop, 0, 0, 0),
            (Choice, 7, 0, 0),
            (Choice, (-7i64) as u64, 0, 0),
            (Commit, (-12i64) as u64, 0, 0),
            (Fail, 0, 0, 0),
            (AnyB, 1, 0, 0),
            (AnyB, 2, 0, 0),
            (AnyB, 0x10000, 0, 0),
            (SameB, 0x62, 1, 0),
            (SameB, 0x62, 9, 0),
            (LitB, 0, 0, 0),
            (LitB, 300, 0, 0),
            (MatchB, 2, 1, 0),
            (MatchB, 2, 65, 0),
            (Jmp, (-13i64) as u64, 0, 0),
            (Call, 0x7fff, 0, 0),
            (Ret, 0, 0, 0),
            (TAnyB, 5, 1, 0),
            (TAnyB, 5, 3, 0),
            (TSameB, (-100i64) as u64, 0x0a, 1),
            (TSameB, (-100i64) as u64, 0x0a, 4),
            (TLitB, 16, 2, 0),
            (TMatchB, 16, 2, 1),
            (TMatchB, 16, 2, 7),
            (PCommit, (-5i64) as u64, 0, 0),
            (BCommit, 9, 0, 0),
            (SpanB, 3, 0, 0),
            (Fail2X, 0, 0, 0),
            (RwndB, 4, 0, 0),
            (FCap, 1, 2, 0),
            (BCap, 0, 0, 0),
            (ECap, 0, 0, 0),
            (GiveUp, 0, 0, 0),
            (End, 0, 0, 0),
        ];
        for &(code, imm0, imm1, imm2) in cases {
            let bytes = code.meta().encode(imm0, imm1, imm2);
            let op = decode_one(&bytes);
            assert_eq!(op.code, code, "{code} did not round-trip");
            assert_eq!((op.imm0, op.imm1, op.imm2), (imm0, imm1, imm2), "{code} immediates");
            assert_eq!(op.len as usize, bytes.len(), "{code} length");
            assert_eq!(op.encode(), bytes, "{code} re-encoding");
        }
    }

    #[test]
    fn op_display() {
        assert_eq!(decode_one(&[0xaa, 0x48, 0x01, 0x02]).to_string(), "FCAP<1,2>");
        assert_eq!(decode_one(&[0x00]).to_string(), "NOP<>");
        assert_eq!(decode_one(&[0x40]).to_string(), "ANYB<>");
        assert_eq!(decode_one(&[0x90, 0x40, 0xfd]).to_string(), "JMP<18446744073709551613>");
    }

    #[test]
    fn offset_arithmetic() {
        assert_eq!(add_offset(10, 5), Ok(15));
        assert_eq!(add_offset(10, -10), Ok(0));
        assert_eq!(add_offset(10, -11), Err(OffsetOverflow));
        assert_eq!(add_offset(u64::MAX, 1), Err(OffsetOverflow));
        assert_eq!(add_offset(u64::MAX, i64::MIN), Ok(u64::MAX - i64::MIN.unsigned_abs()));
        assert_eq!(add_offset(0, i64::MAX), Ok(i64::MAX as u64));
    }
}
