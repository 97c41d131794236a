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

/// A single frame of the control stack.
///
/// Call/return and choice/fail frames share one stack: failing must pop
/// through pending call frames silently to reach the innermost choice
/// point, which a pair of parallel stacks could not express.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display)]
pub enum Frame {
    /// Frame pushed by CALL and popped by RET.
    #[display("call(ret={ret_xp})")]
    Call {
        /// Code address of the instruction following the CALL.
        ret_xp: u64,
    },

    /// Backtracking checkpoint pushed by CHOICE and consumed by COMMIT,
    /// PCOMMIT, BCOMMIT, FAIL2X or a failure.
    #[display("choice(alt={alt_xp}, dp={dp}, ks={ks_len})")]
    Choice {
        /// Code address of the alternative execution path.
        alt_xp: u64,

        /// Data position to rewind to on failure.
        dp: u64,

        /// Capture-stack depth to truncate to on failure. A length
        /// snapshot suffices: the capture stack only ever grows by
        /// appending, so truncation undoes everything pushed after the
        /// choice point.
        ks_len: usize,
    },
}

/// Records the start or end position of a capture on the capture stack.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Assignment {
    /// The recorded data position. For a start assignment this is the
    /// first captured byte; for an end assignment, one past the last.
    pub dp: u64,

    /// Index of the capture being assigned to.
    pub index: u64,

    /// Whether the end (rather than the start) of the capture is being
    /// assigned.
    pub is_end: bool,
}
