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

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use super::{CaptureMeta, Label, Program};
use crate::byteset::Matcher;
use crate::isa::{ImmType, OpCode, OpMeta};

/// Handle to an assembler label, returned by [`Assembler::grab_label`].
///
/// A label may be referenced by jump operands before the point where it is
/// emitted into the instruction stream.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct LabelRef(usize);

/// A value for one of the three immediate slots of an emitted instruction.
///
/// Use [`Operand::Absent`] (or a short operand list) for slots the opcode
/// does not take or whose default should apply. Numeric operands encode
/// verbatim; a label operand turns the slot into a jump fixup resolved at
/// [`Assembler::finish`] time.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Operand {
    /// No value; the slot takes its default.
    Absent,

    /// Value for an unsigned slot.
    Uint(u64),

    /// Value for a signed slot.
    Sint(i64),

    /// Symbolic jump target for a code-offset slot.
    Label(LabelRef),
}

impl From<u64> for Operand {
    fn from(v: u64) -> Self { Operand::Uint(v) }
}

impl From<u32> for Operand {
    fn from(v: u32) -> Self { Operand::Uint(v as u64) }
}

impl From<u16> for Operand {
    fn from(v: u16) -> Self { Operand::Uint(v as u64) }
}

impl From<u8> for Operand {
    fn from(v: u8) -> Self { Operand::Uint(v as u64) }
}

impl From<usize> for Operand {
    fn from(v: usize) -> Self { Operand::Uint(v as u64) }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self { Operand::Sint(v) }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self { Operand::Sint(v as i64) }
}

impl From<char> for Operand {
    fn from(v: char) -> Self { Operand::Uint(u32::from(v) as u64) }
}

impl From<LabelRef> for Operand {
    fn from(label: LabelRef) -> Self { Operand::Label(label) }
}

struct LabelState {
    name: String,
    public: bool,
    /// Index of the label's item once the label has been emitted.
    item: Option<usize>,
}

struct OpItem {
    meta: &'static OpMeta,
    imm: [u64; 3],
    /// Slot index and label of the unresolved jump operand, if any.
    fixup: Option<(usize, usize)>,
    /// Generated bytecode; meaningful only once `fixed`.
    bytes: Vec<u8>,
    /// Upper bound on the encoded length while not yet `fixed`. Never
    /// grows during fixup.
    max_len: usize,
    fixed: bool,
}

enum ItemKind {
    Label(usize),
    Op(OpItem),
}

struct AsmItem {
    kind: ItemKind,
    known_xp: bool,
    xp: u64,
}

impl AsmItem {
    /// Concrete encoded length, or `None` while the item is still subject
    /// to fixup.
    fn exact_len(&self) -> Option<usize> {
        match &self.kind {
            ItemKind::Label(_) => Some(0),
            ItemKind::Op(op) if op.fixed => Some(op.bytes.len()),
            ItemKind::Op(_) => None,
        }
    }
}

/// Turns a stream of labels and instructions with symbolic jump targets
/// into a [`Program`].
///
/// Jump immediates are PC-relative and variable-width, so an instruction's
/// encoded length depends on the distance to its target, which in turn
/// depends on the lengths of the instructions in between. The assembler
/// solves this circularity with an iterative relaxation over conservative
/// length bounds, followed by a final arbitration pass for the residual
/// cyclic cases (see [`Assembler::finish`]).
///
/// API misuse (an operand whose type does not fit the slot, a label
/// emitted twice or referenced but never emitted) panics.
#[derive(Default)]
pub struct Assembler {
    items: Vec<AsmItem>,
    labels: Vec<LabelState>,
    labels_by_name: BTreeMap<String, usize>,
    literals: Vec<Vec<u8>>,
    matchers: Vec<Matcher>,
    captures: Vec<CaptureMeta>,
    named_captures: BTreeMap<String, u64>,
}

impl Assembler {
    /// Constructs an empty assembler.
    pub fn new() -> Self { default!() }

    /// Adds a byte-string literal to the future program's literal table,
    /// returning its index for use in LITB / TLITB operands.
    pub fn declare_literal(&mut self, literal: impl Into<Vec<u8>>) -> u64 {
        self.literals.push(literal.into());
        self.literals.len() as u64 - 1
    }

    /// Adds a matcher to the future program's matcher table, returning its
    /// index for use in MATCHB / TMATCHB / SPANB operands.
    pub fn declare_matcher(&mut self, matcher: Matcher) -> u64 {
        self.matchers.push(matcher);
        self.matchers.len() as u64 - 1
    }

    /// Declares the number of captures, including the whole-match capture
    /// at index 0.
    pub fn declare_captures(&mut self, n: u64) {
        self.captures = vec![CaptureMeta::default(); n as usize];
    }

    /// Assigns a name to a declared capture index.
    ///
    /// # Panics
    ///
    /// If the index is outside the declared capture count.
    pub fn declare_named_capture(&mut self, index: u64, name: impl Into<String>) {
        let name = name.into();
        let meta = self
            .captures
            .get_mut(index as usize)
            .expect("capture index out of range");
        meta.name = Some(name.clone());
        self.named_captures.insert(name, index);
    }

    /// Returns a handle for the label with the given name, creating it if
    /// this is the first reference. Names starting with `.` denote private
    /// labels.
    pub fn grab_label(&mut self, name: &str) -> LabelRef {
        if let Some(id) = self.labels_by_name.get(name) {
            return LabelRef(*id);
        }
        assert!(!name.is_empty(), "empty label name");
        let id = self.labels.len();
        self.labels.push(LabelState {
            name: name.to_owned(),
            public: !name.starts_with('.'),
            item: None,
        });
        self.labels_by_name.insert(name.to_owned(), id);
        LabelRef(id)
    }

    /// Emits the label into the instruction stream at the current
    /// position.
    ///
    /// # Panics
    ///
    /// If a label with this name has already been emitted.
    pub fn emit_label(&mut self, name: &str) {
        let LabelRef(id) = self.grab_label(name);
        assert!(self.labels[id].item.is_none(), "label {name} emitted twice");
        self.labels[id].item = Some(self.items.len());
        self.items.push(AsmItem { kind: ItemKind::Label(id), known_xp: false, xp: 0 });
    }

    /// Emits an instruction with up to three operands. Missing trailing
    /// operands are [`Operand::Absent`].
    ///
    /// # Panics
    ///
    /// If an operand's type does not match the slot metadata (signedness,
    /// required slots, label operands on non-offset slots) or more than
    /// one operand is a label.
    pub fn emit(&mut self, code: OpCode, operands: &[Operand]) {
        assert!(operands.len() <= 3, "{code} given more than three operands");
        let meta = code.meta();

        let mut imm = [0u64; 3];
        let mut fixup = None;
        for slot in 0..3 {
            let slot_meta = meta.imm(slot as u8);
            match operands.get(slot).copied().unwrap_or(Operand::Absent) {
                Operand::Absent => {
                    assert!(
                        slot_meta.ty == ImmType::None || !slot_meta.required,
                        "{code} immediate {slot} is required"
                    );
                    imm[slot] = slot_meta.default_value();
                }
                Operand::Uint(v) => {
                    assert!(
                        slot_meta.ty != ImmType::None && !slot_meta.ty.signed(),
                        "{code} immediate {slot} cannot take an unsigned value"
                    );
                    imm[slot] = v;
                }
                Operand::Sint(v) => {
                    assert!(
                        slot_meta.ty.signed(),
                        "{code} immediate {slot} cannot take a signed value"
                    );
                    imm[slot] = v as u64;
                }
                Operand::Label(LabelRef(id)) => {
                    assert!(
                        slot_meta.ty == ImmType::CodeOffset,
                        "{code} immediate {slot} is not a code offset"
                    );
                    assert!(fixup.is_none(), "{code} given multiple label operands");
                    fixup = Some((slot, id));
                }
            }
        }

        let mut op = OpItem { meta, imm, fixup, bytes: vec![], max_len: 26, fixed: false };
        match fixup {
            None => {
                op.bytes = meta.encode(op.imm[0], op.imm[1], op.imm[2]);
                op.max_len = op.bytes.len();
                op.fixed = true;
            }
            Some((slot, _)) => {
                // Conservative worst case: the placeholder needs the widest
                // immediate encoding the slot can produce.
                op.imm[slot] = i64::MIN as u64;
                op.max_len = meta.encode(op.imm[0], op.imm[1], op.imm[2]).len();
            }
        }
        self.items.push(AsmItem { kind: ItemKind::Op(op), known_xp: false, xp: 0 });
    }

    /// Performs fixup and hands out the assembled program.
    ///
    /// Proceeds in three stages: an iterative relaxation propagating known
    /// positions and shrinking length bounds until no further progress; a
    /// final arbitration ("jiggle") pass resolving the cyclic leftovers
    /// from their current bounds; and one more relaxation round to settle
    /// all positions.
    ///
    /// # Panics
    ///
    /// If a referenced label was never emitted.
    pub fn finish(mut self) -> Program {
        for item in &self.items {
            if let ItemKind::Op(OpItem { fixup: Some((_, id)), .. }) = &item.kind {
                assert!(
                    self.labels[*id].item.is_some(),
                    "label {} is referenced but never emitted",
                    self.labels[*id].name
                );
            }
        }

        self.fix();

        let mut bytes = Vec::new();
        let mut labels = Vec::new();
        for item in &self.items {
            match &item.kind {
                ItemKind::Op(op) => bytes.extend_from_slice(&op.bytes),
                ItemKind::Label(id) => {
                    let state = &self.labels[*id];
                    labels.push(Label {
                        offset: item.xp,
                        public: state.public,
                        name: state.name.clone(),
                    });
                }
            }
        }

        Program::with(
            bytes,
            self.literals,
            self.matchers,
            self.captures,
            self.named_captures,
            labels,
        )
    }

    fn fix(&mut self) {
        // First, reason out as many lengths and positions as possible.
        while self.process() {}

        // Last resort: resolve the remaining cyclic dependencies from the
        // current length bounds.
        for i in 0..self.items.len() {
            let (slot, target) = match &self.items[i].kind {
                ItemKind::Op(op) if !op.fixed => {
                    let (slot, id) = op.fixup.expect("unfixed op without fixup");
                    (slot, self.labels[id].item.expect("checked in finish"))
                }
                _ => continue,
            };

            let (n, _) = self.distance(i, target);
            let first = self.encode_with(i, slot, n).len();

            // A backward jump spans its own encoding, so the distance
            // computed from the length bound may overshoot by the amount
            // the instruction itself is about to shrink. Accept the
            // one-shorter offset only when it changes the encoded size.
            if i > target {
                let second = self.encode_with(i, slot, n + 1).len();
                if second == first {
                    self.set_slot(i, slot, n);
                }
            }
            self.generate(i);
        }

        // All lengths are now concrete; settle the positions.
        while self.process() {}

        for (i, item) in self.items.iter().enumerate() {
            let fixed = matches!(&item.kind, ItemKind::Label(_))
                || matches!(&item.kind, ItemKind::Op(op) if op.fixed);
            assert!(item.known_xp && fixed, "assembler failed to place item #{i}");
        }
    }

    fn process(&mut self) -> bool {
        let mut progress = false;
        for i in 0..self.items.len() {
            progress |= self.try_set_xp(i);
            progress |= self.try_fix(i);
        }
        progress
    }

    fn try_set_xp(&mut self, i: usize) -> bool {
        if self.items[i].known_xp {
            return false;
        }
        let xp = if i == 0 {
            0
        } else {
            let prev = &self.items[i - 1];
            match (prev.known_xp, prev.exact_len()) {
                (true, Some(len)) => prev.xp + len as u64,
                _ => return false,
            }
        };
        self.items[i].xp = xp;
        self.items[i].known_xp = true;
        true
    }

    fn try_fix(&mut self, i: usize) -> bool {
        let (slot, target) = match &self.items[i].kind {
            ItemKind::Op(op) if !op.fixed => match op.fixup {
                Some((slot, id)) => match self.labels[id].item {
                    Some(target) => (slot, target),
                    None => return false,
                },
                None => return false,
            },
            _ => return false,
        };

        let (n, exact) = self.distance(i, target);
        self.set_slot(i, slot, n);
        if exact {
            self.generate(i);
            return true;
        }

        let len = self.encode_with(i, slot, n).len();
        let op = self.op_mut(i);
        if len < op.max_len {
            op.max_len = len;
            return true;
        }
        assert!(len == op.max_len, "length bound of item #{i} grew");
        false
    }

    /// Measures the distance between the *end* of item `p` and the *start*
    /// of item `q`, using exact lengths where available and length bounds
    /// otherwise. A backward distance includes the length of `p` itself.
    fn distance(&self, p: usize, q: usize) -> (i64, bool) {
        let (lo, hi, backward) = if p + 1 > q { (q, p + 1, true) } else { (p + 1, q, false) };
        let mut total = 0i64;
        let mut exact = true;
        for item in &self.items[lo..hi] {
            match item.exact_len() {
                Some(len) => total += len as i64,
                None => {
                    total += self.op_ref_of(item).max_len as i64;
                    exact = false;
                }
            }
        }
        (if backward { -total } else { total }, exact)
    }

    fn op_ref_of<'a>(&self, item: &'a AsmItem) -> &'a OpItem {
        match &item.kind {
            ItemKind::Op(op) => op,
            ItemKind::Label(_) => unreachable!("labels always have exact length"),
        }
    }

    fn op_mut(&mut self, i: usize) -> &mut OpItem {
        match &mut self.items[i].kind {
            ItemKind::Op(op) => op,
            ItemKind::Label(_) => unreachable!("item #{i} is not an op"),
        }
    }

    fn set_slot(&mut self, i: usize, slot: usize, value: i64) {
        self.op_mut(i).imm[slot] = value as u64;
    }

    fn encode_with(&mut self, i: usize, slot: usize, value: i64) -> Vec<u8> {
        self.set_slot(i, slot, value);
        let op = self.op_mut(i);
        op.meta.encode(op.imm[0], op.imm[1], op.imm[2])
    }

    fn generate(&mut self, i: usize) {
        let op = self.op_mut(i);
        op.bytes = op.meta.encode(op.imm[0], op.imm[1], op.imm[2]);
        op.max_len = op.bytes.len();
        op.fixed = true;
        op.fixup = None;
    }
}

impl Display for Assembler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if item.known_xp {
                write!(f, "{:05x} ", item.xp)?;
            } else {
                write!(f, "    - ")?;
            }
            write!(f, "#{i:02} ")?;
            match &item.kind {
                ItemKind::Label(id) => writeln!(f, "00    {}", self.labels[*id].name)?,
                ItemKind::Op(op) => {
                    if op.fixed {
                        write!(f, "{:02x}    ", op.bytes.len())?;
                    } else {
                        write!(f, "??/{:02x} ", op.max_len)?;
                    }
                    write!(f, "{}", op.meta.name)?;
                    if let Some((_, id)) = op.fixup {
                        write!(f, " {}", self.labels[id].name)?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
