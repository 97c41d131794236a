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

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::byteset::Matcher;
use crate::vm::{ExecError, Execution, MatchResult};

/// Metadata about one of a program's captures.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaptureMeta {
    /// The capture's name, if it has one.
    pub name: Option<String>,

    /// Whether the compiled program can record multiple input ranges for
    /// this capture. Informational.
    pub repeat: bool,
}

/// Metadata about a bytecode label, used while disassembling or debugging
/// a program.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("{name} @ {offset}")]
pub struct Label {
    /// Code address the label points at.
    pub offset: u64,

    /// Whether the label is part of the program's public surface. Labels
    /// with names starting with `.` are private.
    pub public: bool,

    /// The label name.
    pub name: String,
}

impl PartialOrd for Label {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset
            .cmp(&other.offset)
            .then_with(|| other.public.cmp(&self.public))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// A PEG pattern compiled to bytecode, together with its side tables.
///
/// Programs are produced by the [`crate::Assembler`] and are read-only
/// afterwards; a program may be shared between any number of concurrent
/// [`Execution`]s.
#[derive(Clone, Debug, Default)]
pub struct Program {
    bytes: Vec<u8>,
    literals: Vec<Vec<u8>>,
    matchers: Vec<Matcher>,
    captures: Vec<CaptureMeta>,
    named_captures: BTreeMap<String, u64>,
    labels: Vec<Label>,
    labels_by_name: BTreeMap<String, usize>,
}

impl Program {
    /// Constructs a program from bytecode and side tables.
    ///
    /// The label table is re-sorted by offset, then by public flag
    /// (public labels first), then by name.
    pub fn with(
        bytes: Vec<u8>,
        literals: Vec<Vec<u8>>,
        matchers: Vec<Matcher>,
        captures: Vec<CaptureMeta>,
        named_captures: BTreeMap<String, u64>,
        mut labels: Vec<Label>,
    ) -> Self {
        labels.sort();
        let labels_by_name =
            labels.iter().enumerate().map(|(i, l)| (l.name.clone(), i)).collect();
        Program { bytes, literals, matchers, captures, named_captures, labels, labels_by_name }
    }

    /// Returns the program bytecode.
    #[inline]
    pub fn bytes(&self) -> &[u8] { &self.bytes }

    /// Returns the table of byte literals referenced by the LITB / TLITB
    /// instruction family.
    #[inline]
    pub fn literals(&self) -> &[Vec<u8>] { &self.literals }

    /// Returns the literal with the given index, if it is within the
    /// literal table.
    #[inline]
    pub fn literal(&self, index: u64) -> Option<&[u8]> {
        usize::try_from(index).ok().and_then(|i| self.literals.get(i)).map(Vec::as_slice)
    }

    /// Returns the table of byte-set matchers referenced by the MATCHB /
    /// TMATCHB / SPANB instruction family.
    #[inline]
    pub fn matchers(&self) -> &[Matcher] { &self.matchers }

    /// Returns the matcher with the given index, if it is within the
    /// matcher table.
    #[inline]
    pub fn matcher(&self, index: u64) -> Option<&Matcher> {
        usize::try_from(index).ok().and_then(|i| self.matchers.get(i))
    }

    /// Returns the capture metadata table. The whole match is always
    /// capture index 0; user-specified captures follow.
    #[inline]
    pub fn captures(&self) -> &[CaptureMeta] { &self.captures }

    /// Returns the index of a named capture.
    #[inline]
    pub fn named_capture(&self, name: &str) -> Option<u64> {
        self.named_captures.get(name).copied()
    }

    /// Returns the map from capture names to capture indices.
    #[inline]
    pub fn named_captures(&self) -> &BTreeMap<String, u64> { &self.named_captures }

    /// Returns the program's label table, sorted by offset.
    #[inline]
    pub fn labels(&self) -> &[Label] { &self.labels }

    /// Returns the label with the given name.
    pub fn label_by_name(&self, name: &str) -> Option<&Label> {
        self.labels_by_name.get(name).map(|i| &self.labels[*i])
    }

    /// Returns the best available label for the given code address. If no
    /// label is defined for the address, a synthetic private label is
    /// returned.
    pub fn find_label(&self, xp: u64) -> Label {
        let i = self.labels.partition_point(|l| l.offset < xp);
        match self.labels.get(i) {
            Some(label) if label.offset == xp => label.clone(),
            _ => Label { offset: xp, public: false, name: format!(".ANON@{xp:x}") },
        }
    }

    /// Constructs a fresh execution of this program over the given input.
    #[inline]
    pub fn execution<'a>(&'a self, input: &'a [u8]) -> Execution<'a> {
        Execution::with(self, input)
    }

    /// Runs the program against the input to completion and harvests the
    /// match outcome.
    ///
    /// WARNING: no time limit is enforced, and it is easy to compile an
    /// infinite loop. Callers running untrusted bytecode should drive
    /// [`Execution::step`] themselves.
    pub fn match_input(&self, input: &[u8]) -> Result<MatchResult, ExecError> {
        let mut exec = self.execution(input);
        exec.run()?;
        Ok(exec.results())
    }
}
