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

/// The start and end position of a single capture event. `start` indexes
/// the first captured byte, `end` one past the last.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display)]
#[display("({start},{end})")]
pub struct CapturePair {
    /// Input offset of the first captured byte.
    pub start: u64,

    /// Input offset one past the last captured byte.
    pub end: u64,
}

/// All capture events recorded for a single capture index during one
/// match, in the order they were recorded.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Capture {
    /// Whether at least one event is recorded.
    pub exists: bool,

    /// The most recent event.
    pub solo: CapturePair,

    /// All events, oldest first.
    pub multi: Vec<CapturePair>,
}

impl Capture {
    /// Constructs a capture record from a list of events, oldest first.
    pub fn with(pairs: impl IntoIterator<Item = CapturePair>) -> Self {
        let multi: Vec<CapturePair> = pairs.into_iter().collect();
        match multi.last().copied() {
            Some(last) => Capture { exists: true, solo: last, multi },
            None => Capture::default(),
        }
    }
}

impl Display for Capture {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.exists {
            return f.write_str("-");
        }
        write!(f, "{{{}", self.solo)?;
        if !self.multi.is_empty() {
            f.write_str(" [")?;
            for (i, pair) in self.multi.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                Display::fmt(pair, f)?;
            }
            f.write_str("]")?;
        }
        f.write_str("}")
    }
}

/// The outcome of running a program against an input to completion.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct MatchResult {
    /// Whether the program matched the input.
    pub success: bool,

    /// Per-index capture records; index 0 is the whole match. All records
    /// are empty when the match failed.
    pub captures: Vec<Capture>,
}

impl MatchResult {
    /// Returns the capture record at the given index, if the index is
    /// within the program's capture table.
    #[inline]
    pub fn capture(&self, index: u64) -> Option<&Capture> { self.captures.get(index as usize) }
}

impl Display for MatchResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.success)?;
        if self.success {
            f.write_str(" [")?;
            for (i, capture) in self.captures.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{i}:{capture}")?;
            }
            f.write_str("]")?;
        }
        f.write_str("}")
    }
}
