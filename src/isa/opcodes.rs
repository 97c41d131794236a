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
use std::sync::LazyLock;

use super::bytecode::DisassembleErrorKind;

/// Opcode identifying a single PegVM instruction.
///
/// Opcodes are 6-bit values. Code points not listed here are legal byte
/// values but reflect as illegal and fail to decode. Codes `0..=7` may use
/// the compact one-byte instruction header; all others require the two-byte
/// header.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum OpCode {
    /// No operation.
    Nop = 0x00,

    /// Push a choice frame recording the alternative execution path.
    Choice = 0x01,

    /// Pop a choice frame, committing to the current parse, and jump.
    Commit = 0x02,

    /// Fail the current parse, backtracking to the innermost choice frame.
    Fail = 0x03,

    /// Match a number of bytes of arbitrary value.
    AnyB = 0x04,

    /// Match a number of bytes all equal to a given value.
    SameB = 0x05,

    /// Match a byte-string literal from the literal table.
    LitB = 0x06,

    /// Match a number of bytes against a matcher from the matcher table.
    MatchB = 0x07,

    /// Unconditional jump.
    Jmp = 0x08,

    // 0x09 is reserved.
    /// Push a call frame and jump.
    Call = 0x0a,

    /// Pop a call frame and return to the saved execution position.
    Ret = 0x0b,

    /// [`OpCode::AnyB`] which jumps instead of failing on mismatch.
    TAnyB = 0x0c,

    /// [`OpCode::SameB`] which jumps instead of failing on mismatch.
    TSameB = 0x0d,

    /// [`OpCode::LitB`] which jumps instead of failing on mismatch.
    TLitB = 0x0e,

    /// [`OpCode::MatchB`] which jumps instead of failing on mismatch.
    TMatchB = 0x0f,

    /// Partial commit: refresh the topmost choice frame in place and jump.
    /// Used for greedy loops.
    PCommit = 0x10,

    /// Back commit: pop the topmost choice frame, restore its data position
    /// and capture stack, and jump. Used for positive lookahead.
    BCommit = 0x11,

    /// Greedily match zero or more bytes against a matcher. Never fails.
    SpanB = 0x12,

    /// Pop the topmost choice frame, then fail. Used for negative
    /// lookahead.
    Fail2X = 0x13,

    /// Rewind the data pointer by a number of bytes.
    RwndB = 0x14,

    /// Record a full capture covering the last N bytes of matched data.
    FCap = 0x15,

    /// Record the start of a capture at the current data position.
    BCap = 0x16,

    /// Record the end of a capture at the current data position.
    ECap = 0x17,

    // 0x18..=0x3d are reserved.
    /// Unconditionally fail the outermost match, ignoring the stack.
    GiveUp = 0x3e,

    /// Unconditionally succeed the outermost match, ignoring the stack.
    End = 0x3f,
}

impl OpCode {
    /// Returns the opcode corresponding to a raw 6-bit code point, or
    /// `None` if the code point is reserved.
    pub fn with(code: u8) -> Option<OpCode> {
        let i = OP_META.binary_search_by_key(&code, |m| m.code as u8).ok()?;
        Some(OP_META[i].code)
    }

    /// Returns the static metadata record for this opcode.
    pub fn meta(self) -> &'static OpMeta {
        let i = OP_META
            .binary_search_by_key(&(self as u8), |m| m.code as u8)
            .expect("opcode missing from metadata table");
        &OP_META[i]
    }

    /// Returns the ASCII mnemonic for this opcode.
    #[inline]
    pub fn mnemonic(self) -> &'static str { self.meta().name }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(self.mnemonic()) }
}

/// Describes how an instruction's immediate slot is used.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum ImmType {
    /// The slot is never used.
    #[display("none")]
    None,

    /// The slot holds an unsigned integer.
    #[display("uint")]
    Uint,

    /// The slot holds a signed integer.
    #[display("sint")]
    Sint,

    /// The slot holds a byte value (unsigned).
    #[display("byte")]
    Byte,

    /// The slot holds a Unicode scalar value (unsigned).
    #[display("rune")]
    Rune,

    /// The slot holds an unsigned count.
    #[display("count")]
    Count,

    /// The slot holds a signed XP offset, relative to the start of the
    /// *following* instruction.
    #[display("offset")]
    CodeOffset,

    /// The slot holds an unsigned index into the literal table.
    #[display("literal")]
    LiteralIdx,

    /// The slot holds an unsigned index into the matcher table.
    #[display("matcher")]
    MatcherIdx,

    /// The slot holds an unsigned index into the capture table.
    #[display("capture")]
    CaptureIdx,
}

impl ImmType {
    /// Returns whether values of this type are 2's-complement signed.
    #[inline]
    pub fn signed(self) -> bool { matches!(self, ImmType::Sint | ImmType::CodeOffset) }
}

/// Metadata about one of an opcode's three immediate slots.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ImmMeta {
    /// Value type of the slot.
    pub ty: ImmType,

    /// Whether the slot must be present in the encoded instruction.
    pub required: bool,

    /// Single-byte packed default, used when an optional slot is omitted.
    /// Sign-extended if the slot type is signed.
    pub packed_default: u8,
}

/// Encoded form of a single immediate: up to eight little-endian bytes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default)]
pub struct ImmBytes {
    raw: [u8; 8],
    len: u8,
}

impl ImmBytes {
    /// Returns the number of encoded bytes; one of 0, 1, 2, 4 or 8.
    #[inline]
    pub fn len(&self) -> usize { self.len as usize }

    /// Returns whether the immediate is omitted entirely.
    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

impl AsRef<[u8]> for ImmBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] { &self.raw[..self.len as usize] }
}

const HIGH_BIT: u64 = 1 << 63;

impl ImmMeta {
    /// Returns the default value of the slot, sign-extending the packed
    /// byte for signed slot types.
    pub fn default_value(&self) -> u64 {
        let b = self.packed_default;
        let mut v = b as u64;
        if self.ty.signed() && b & 0x80 == 0x80 {
            v |= !0xff;
        }
        v
    }

    /// Returns whether value `v` occupies nonzero width when encoded into
    /// this slot: required slots are always present, optional slots only
    /// when the value differs from the default.
    pub fn is_present(&self, v: u64) -> bool {
        if self.ty == ImmType::None {
            return false;
        }
        self.required || self.default_value() != v
    }

    /// Encodes value `v` into the smallest width preserving it.
    ///
    /// Widths are chosen from {0, 1, 2, 4, 8} bytes. For signed slot types
    /// the top bit of the last encoded byte must match the sign of the full
    /// value, otherwise the next larger width is selected.
    pub fn encode(&self, v: u64) -> ImmBytes {
        if !self.is_present(v) {
            return ImmBytes::default();
        }

        let raw = v.to_le_bytes();
        let mut fill = 0x00u8;
        let mut sign = 0x00u8;
        if self.ty.signed() && v & HIGH_BIT == HIGH_BIT {
            fill = 0xff;
            sign = 0x80;
        }
        let top_ok = |b: u8| !self.ty.signed() || b & 0x80 == sign;

        let mut len = 8u8;
        if raw[7] == fill && raw[6] == fill && raw[5] == fill && raw[4] == fill && top_ok(raw[3]) {
            len = 4;
            if raw[3] == fill && raw[2] == fill && top_ok(raw[1]) {
                len = 2;
                if raw[1] == fill && top_ok(raw[0]) {
                    len = 1;
                }
            }
        }
        ImmBytes { raw, len }
    }

    /// Decodes the slot value from its encoded bytes (which may be empty
    /// for an omitted slot), zero- or sign-extending to 64 bits.
    pub fn decode(&self, data: &[u8]) -> Result<u64, DisassembleErrorKind> {
        if data.is_empty() {
            if self.ty != ImmType::None && self.required {
                return Err(DisassembleErrorKind::MissingImmediate);
            }
            return Ok(self.default_value());
        }
        if self.ty == ImmType::None {
            return Err(DisassembleErrorKind::UnexpectedImmediate);
        }

        let mut value = 0u64;
        for (i, b) in data.iter().enumerate() {
            value |= (*b as u64) << (i * 8);
        }
        let last = data[data.len() - 1];
        if self.ty.signed() && last & 0x80 == 0x80 {
            for i in data.len()..8 {
                value |= 0xff << (i * 8);
            }
        }
        Ok(value)
    }
}

/// Metadata about an opcode: its mnemonic and the layout of its three
/// immediate slots.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct OpMeta {
    /// The opcode this record describes.
    pub code: OpCode,

    /// Metadata of immediate slot 0.
    pub imm0: ImmMeta,

    /// Metadata of immediate slot 1.
    pub imm1: ImmMeta,

    /// Metadata of immediate slot 2.
    pub imm2: ImmMeta,

    /// ASCII mnemonic.
    pub name: &'static str,
}

impl OpMeta {
    /// Returns the metadata of immediate slot `i` (0, 1 or 2).
    pub fn imm(&self, i: u8) -> &ImmMeta {
        match i {
            0 => &self.imm0,
            1 => &self.imm1,
            2 => &self.imm2,
            _ => panic!("immediate slot index out of range"),
        }
    }
}

const fn none() -> ImmMeta { ImmMeta { ty: ImmType::None, required: false, packed_default: 0 } }

const fn required(ty: ImmType) -> ImmMeta { ImmMeta { ty, required: true, packed_default: 0 } }

const fn optional(ty: ImmType, packed_default: u8) -> ImmMeta {
    ImmMeta { ty, required: false, packed_default }
}

const fn op(code: OpCode, name: &'static str, imm0: ImmMeta, imm1: ImmMeta, imm2: ImmMeta) -> OpMeta {
    OpMeta { code, imm0, imm1, imm2, name }
}

/// Process-wide opcode metadata table, sorted by code and sanity-checked on
/// first use.
static OP_META: LazyLock<[OpMeta; 25]> = LazyLock::new(|| {
    use ImmType::*;
    use OpCode::*;
    let table = [
        op(Nop, "NOP", none(), none(), none()),
        op(Choice, "CHOICE", required(CodeOffset), none(), none()),
        op(Commit, "COMMIT", required(CodeOffset), none(), none()),
        op(Fail, "FAIL", none(), none(), none()),
        op(AnyB, "ANYB", optional(Count, 1), none(), none()),
        op(SameB, "SAMEB", required(Byte), optional(Count, 1), none()),
        op(LitB, "LITB", required(LiteralIdx), none(), none()),
        op(MatchB, "MATCHB", required(MatcherIdx), optional(Count, 1), none()),
        op(Jmp, "JMP", required(CodeOffset), none(), none()),
        op(Call, "CALL", required(CodeOffset), none(), none()),
        op(Ret, "RET", none(), none(), none()),
        op(TAnyB, "TANYB", required(CodeOffset), optional(Count, 1), none()),
        op(TSameB, "TSAMEB", required(CodeOffset), required(Byte), optional(Count, 1)),
        op(TLitB, "TLITB", required(CodeOffset), required(LiteralIdx), none()),
        op(TMatchB, "TMATCHB", required(CodeOffset), required(MatcherIdx), optional(Count, 1)),
        op(PCommit, "PCOMMIT", required(CodeOffset), none(), none()),
        op(BCommit, "BCOMMIT", required(CodeOffset), none(), none()),
        op(SpanB, "SPANB", required(MatcherIdx), none(), none()),
        op(Fail2X, "FAIL2X", none(), none(), none()),
        op(RwndB, "RWNDB", required(Count), none(), none()),
        op(FCap, "FCAP", required(CaptureIdx), required(Count), none()),
        op(BCap, "BCAP", required(CaptureIdx), none(), none()),
        op(ECap, "ECAP", required(CaptureIdx), none(), none()),
        op(GiveUp, "GIVEUP", none(), none(), none()),
        op(End, "END", none(), none(), none()),
    ];

    for pair in table.windows(2) {
        assert!(pair[0].code < pair[1].code, "opcode metadata table not sorted");
    }
    for meta in &table {
        assert!(meta.code as u8 <= 0x3f, "opcode {} out of 6-bit range", meta.name);
        for slot in 0..3 {
            let imm = meta.imm(slot);
            if imm.ty == ImmType::None {
                assert!(!imm.required, "{}: absent immediate marked required", meta.name);
                assert_eq!(imm.packed_default, 0, "{}: absent immediate with default", meta.name);
            }
        }
    }
    table
});

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_reflection() {
        assert_eq!(OpCode::with(0x00), Some(OpCode::Nop));
        assert_eq!(OpCode::with(0x08), Some(OpCode::Jmp));
        assert_eq!(OpCode::with(0x3f), Some(OpCode::End));
        assert_eq!(OpCode::with(0x09), None);
        assert_eq!(OpCode::with(0x18), None);
        assert_eq!(OpCode::with(0x40), None);
        assert_eq!(OpCode::with(0xff), None);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(OpCode::Nop.to_string(), "NOP");
        assert_eq!(OpCode::TMatchB.to_string(), "TMATCHB");
        assert_eq!(OpCode::GiveUp.to_string(), "GIVEUP");
        assert_eq!(OpCode::Fail2X.mnemonic(), "FAIL2X");
    }

    #[test]
    fn packed_default_sign_extension() {
        let m = optional(ImmType::Sint, 0xff);
        assert_eq!(m.default_value(), u64::MAX);
        let m = optional(ImmType::Sint, 0x7f);
        assert_eq!(m.default_value(), 0x7f);
        let m = optional(ImmType::Count, 0xff);
        assert_eq!(m.default_value(), 0xff);
    }

    #[test]
    fn presence() {
        let m = optional(ImmType::Count, 1);
        assert!(!m.is_present(1));
        assert!(m.is_present(0));
        assert!(m.is_present(2));
        assert!(required(ImmType::Count).is_present(0));
        assert!(!none().is_present(7));
    }

    fn enc(m: ImmMeta, v: u64) -> Vec<u8> { m.encode(v).as_ref().to_vec() }

    #[test]
    fn encode_unsigned_widths() {
        let m = required(ImmType::Uint);
        assert_eq!(enc(m, 0x00), vec![0x00]);
        assert_eq!(enc(m, 0x01), vec![0x01]);
        assert_eq!(enc(m, 0x7f), vec![0x7f]);
        assert_eq!(enc(m, 0x80), vec![0x80]);
        assert_eq!(enc(m, 0xff), vec![0xff]);
        assert_eq!(enc(m, 0x100), vec![0x00, 0x01]);
        assert_eq!(enc(m, 0x7fff), vec![0xff, 0x7f]);
        assert_eq!(enc(m, 0x8000), vec![0x00, 0x80]);
        assert_eq!(enc(m, 0xffff), vec![0xff, 0xff]);
        assert_eq!(enc(m, 0x1_0000), vec![0x00, 0x00, 0x01, 0x00]);
        assert_eq!(enc(m, 0xffff_ffff), vec![0xff, 0xff, 0xff, 0xff]);
        assert_eq!(enc(m, 0x1_0000_0000), vec![0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(enc(m, u64::MAX), vec![0xff; 8]);
    }

    #[test]
    fn encode_signed_widths() {
        let m = required(ImmType::Sint);
        assert_eq!(enc(m, 0x00), vec![0x00]);
        assert_eq!(enc(m, 0x7f), vec![0x7f]);
        // A positive value whose top candidate bit reads as negative is
        // pushed to the next width.
        assert_eq!(enc(m, 0x80), vec![0x80, 0x00]);
        assert_eq!(enc(m, 0xff), vec![0xff, 0x00]);
        assert_eq!(enc(m, 0x100), vec![0x00, 0x01]);
        assert_eq!(enc(m, (-1i64) as u64), vec![0xff]);
        assert_eq!(enc(m, (-2i64) as u64), vec![0xfe]);
        assert_eq!(enc(m, (-128i64) as u64), vec![0x80]);
        assert_eq!(enc(m, (-129i64) as u64), vec![0x7f, 0xff]);
        assert_eq!(enc(m, (-32768i64) as u64), vec![0x00, 0x80]);
        assert_eq!(enc(m, (-32769i64) as u64), vec![0xff, 0x7f, 0xff, 0xff]);
    }

    #[test]
    fn encode_optional_defaults() {
        let m = optional(ImmType::Uint, 0x01);
        assert!(enc(m, 0x01).is_empty());
        assert_eq!(enc(m, 0x00), vec![0x00]);
        assert_eq!(enc(m, 0xfe), vec![0xfe]);

        let m = optional(ImmType::Sint, 0xff);
        assert!(enc(m, u64::MAX).is_empty());
        assert_eq!(enc(m, 0x00), vec![0x00]);
        assert_eq!(enc(m, 0x80), vec![0x80, 0x00]);
    }

    #[test]
    fn decode_extension() {
        let unsigned = required(ImmType::Uint);
        let signed = required(ImmType::Sint);
        assert_eq!(unsigned.decode(&[0xff]), Ok(0xff));
        assert_eq!(signed.decode(&[0xff]), Ok(u64::MAX));
        assert_eq!(signed.decode(&[0x7f]), Ok(0x7f));
        assert_eq!(signed.decode(&[0x80, 0x00]), Ok(0x80));
        assert_eq!(signed.decode(&[0x00, 0x80]), Ok((-32768i64) as u64));
    }

    #[test]
    fn decode_slot_mismatches() {
        assert_eq!(
            required(ImmType::Count).decode(&[]),
            Err(DisassembleErrorKind::MissingImmediate)
        );
        assert_eq!(none().decode(&[0x01]), Err(DisassembleErrorKind::UnexpectedImmediate));
        assert_eq!(none().decode(&[]), Ok(0));
        assert_eq!(optional(ImmType::Count, 1).decode(&[]), Ok(1));
    }

    #[test]
    fn roundtrip_all_widths() {
        let metas = [
            required(ImmType::Uint),
            required(ImmType::Sint),
            optional(ImmType::Count, 1),
            optional(ImmType::Sint, 0xff),
        ];
        let values = [
            0u64,
            1,
            0x7f,
            0x80,
            0xff,
            0x100,
            0xffff,
            0x1_0000,
            0xffff_ffff,
            0x1_0000_0000,
            u64::MAX,
            (-1i64) as u64,
            (-128i64) as u64,
            (-129i64) as u64,
            i64::MIN as u64,
        ];
        for m in metas {
            for v in values {
                let bytes = m.encode(v);
                let decoded = m.decode(bytes.as_ref()).expect("well-formed immediate");
                assert_eq!(decoded, v, "{:?} value {v:#x}", m.ty);
            }
        }
    }
}
