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

use std::collections::BTreeSet;
use std::io::{self, Write};

use super::Program;
use crate::isa::{add_offset, DisassembleError, ImmType, Op, OffsetOverflow};

/// Errors producing a disassembly listing.
#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum DisasmError {
    /// Error writing the listing out.
    #[from]
    Io(io::Error),

    /// Malformed instruction in the bytecode.
    #[from]
    Decode(DisassembleError),

    /// Jump immediate pointing outside the addressable code space.
    #[from]
    Offset(OffsetOverflow),
}

/// C-style control escape letter for the well-known control characters.
fn control_escape(r: u32) -> Option<char> {
    Some(match r {
        0x07 => 'a',
        0x08 => 'b',
        0x09 => 't',
        0x0a => 'n',
        0x0b => 'v',
        0x0c => 'f',
        0x0d => 'r',
        _ => return None,
    })
}

fn write_byte_literal(w: &mut impl Write, b: u8) -> io::Result<()> {
    if let Some(c) = control_escape(b as u32) {
        write!(w, "'\\{c}'")
    } else if b == b'\\' || b == b'\'' {
        write!(w, "'\\{}'", b as char)
    } else if (0x20..0x7f).contains(&b) {
        write!(w, "'{}'", b as char)
    } else {
        write!(w, "${b:02x}")
    }
}

fn write_rune_literal(w: &mut impl Write, r: u32) -> io::Result<()> {
    if let Some(c) = control_escape(r) {
        write!(w, "'\\{c}'")
    } else if r == u32::from('\\') || r == u32::from('\'') {
        write!(w, "'\\{}'", char::from_u32(r).expect("ASCII"))
    } else if let Some(c) = char::from_u32(r).filter(|c| !c.is_control()) {
        write!(w, "'{c}'")
    } else {
        write!(w, "${r:04x}")
    }
}

impl Program {
    /// Converts the program's bytecode into an assembly listing, writing
    /// the result to the provided writer.
    ///
    /// The listing starts with `%literal`, `%matcher`, `%captures` and
    /// `%namedcapture` directives describing the side tables, followed by
    /// the instructions, one per line. Jump targets get label lines of
    /// their own, using the program's label table where possible and
    /// synthetic `.ANON@…` names elsewhere.
    pub fn disassemble(&self, w: &mut impl Write) -> Result<(), DisasmError> {
        for literal in self.literals() {
            write!(w, "%literal ")?;
            match std::str::from_utf8(literal) {
                Ok(s) => writeln!(w, "{s:?}")?,
                Err(_) => {
                    for (i, b) in literal.iter().enumerate() {
                        if i > 0 {
                            write!(w, ", ")?;
                        }
                        write!(w, "{b:#04x}")?;
                    }
                    writeln!(w)?;
                }
            }
        }

        for matcher in self.matchers() {
            writeln!(w, "%matcher {matcher}")?;
        }

        writeln!(w, "%captures {}", self.captures().len())?;
        for (i, capture) in self.captures().iter().enumerate() {
            if let Some(name) = &capture.name {
                writeln!(w, "%namedcapture {i} {name:?}")?;
            }
        }
        writeln!(w)?;

        // First pass: identify the code offsets needing label lines.
        let mut targets = BTreeSet::new();
        let mut xp = 0u64;
        while let Some(op) = Op::decode(self.bytes(), xp)? {
            xp += op.len as u64;
            let meta = op.meta();
            for (imm, v) in
                [(&meta.imm0, op.imm0), (&meta.imm1, op.imm1), (&meta.imm2, op.imm2)]
            {
                if imm.ty == ImmType::CodeOffset {
                    targets.insert(add_offset(xp, v as i64)?);
                }
            }
        }

        // Second pass: generate the actual listing.
        let mut xp = 0u64;
        while let Some(op) = Op::decode(self.bytes(), xp)? {
            if targets.contains(&xp) {
                writeln!(w, "{}:", self.find_label(xp).name)?;
            }
            xp += op.len as u64;
            write!(w, "\t")?;
            self.write_op(w, &op, xp)?;
            writeln!(w)?;
        }
        Ok(())
    }

    /// Formats one instruction with context-sensitive immediate rendering;
    /// `next_xp` is the code address of the following instruction, which
    /// code offsets are relative to.
    fn write_op(&self, w: &mut impl Write, op: &Op, next_xp: u64) -> Result<(), DisasmError> {
        let meta = op.meta();
        write!(w, "{}", meta.name)?;
        let mut first = true;
        for (imm, v) in [(&meta.imm0, op.imm0), (&meta.imm1, op.imm1), (&meta.imm2, op.imm2)] {
            if !imm.is_present(v) {
                continue;
            }
            if !first {
                write!(w, ",")?;
            }
            write!(w, " ")?;
            first = false;
            match imm.ty {
                ImmType::Sint => write!(w, "{}", v as i64)?,
                ImmType::Byte => write_byte_literal(w, v as u8)?,
                ImmType::Rune => write_rune_literal(w, v as u32)?,
                ImmType::CodeOffset => {
                    let s = v as i64;
                    let label = self.find_label(add_offset(next_xp, s)?);
                    write!(w, "{} <.{s:+}>", label.name)?;
                }
                ImmType::LiteralIdx => {
                    write!(w, "{v}")?;
                    if self.literal(v).is_none() {
                        write!(w, " <bad-literal>")?;
                    }
                }
                ImmType::MatcherIdx => {
                    write!(w, "{v}")?;
                    if self.matcher(v).is_none() {
                        write!(w, " <bad-matcher>")?;
                    }
                }
                ImmType::CaptureIdx => {
                    write!(w, "{v}")?;
                    if v >= self.captures().len() as u64 {
                        write!(w, " <bad-capture>")?;
                    }
                }
                _ => write!(w, "{v}")?,
            }
        }
        Ok(())
    }
}
