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

use super::{Assignment, Capture, CapturePair, Frame, MatchResult};
use crate::isa::{add_offset, DisassembleError, Op, OpCode};
use crate::library::Program;

/// Reports whether an execution has terminated, and why it terminated if
/// it has.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Default)]
pub enum Status {
    /// The execution has not terminated.
    #[default]
    #[display("running")]
    Running,

    /// The execution has terminated normally with a successful match.
    #[display("success")]
    Success,

    /// The execution has terminated normally but was unable to match the
    /// input.
    #[display("failure")]
    Failure,

    /// The execution has terminated abnormally due to an error in the
    /// program itself.
    #[display("error")]
    Error,
}

/// Kinds of illegal operations a well-formed instruction can attempt at
/// runtime.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum RuntimeErrorKind {
    /// pop from an empty control stack.
    EmptyStack,

    /// encountered CALL/RET stack frame.
    CallRetFrame,

    /// encountered CHOICE/FAIL stack frame.
    ChoiceFailFrame,

    /// index out of range.
    IndexRange,

    /// count out of range.
    CountRange,

    /// code offset out of range.
    CodeOffsetOutOfRange,
}

/// Error encountered while executing a well-formed bytecode instruction.
/// Typically means that there is a bug in the bytecode compiler, or that
/// corrupt or hostile bytecode is being run.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display("runtime error @ XP {xp} DP {dp}: {op}: {kind}")]
pub struct RuntimeError {
    /// Specific illegal operation.
    pub kind: RuntimeErrorKind,

    /// Code address of the offending instruction.
    pub xp: u64,

    /// Data position at the time of the error.
    pub dp: u64,

    /// Mnemonic of the offending instruction.
    pub op: &'static str,
}

/// Errors surfaced by [`Execution::step`] and [`Execution::run`].
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Error, From)]
pub enum ExecError {
    /// The execution has already reached a terminal status.
    Halted,

    /// Malformed bytecode reached by the execution pointer.
    #[from]
    Disassemble(DisassembleError),

    /// Well-formed instruction attempting an illegal operation.
    #[from]
    Runtime(RuntimeError),
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Halted => f.write_str("execution already halted"),
            ExecError::Disassemble(err) => std::fmt::Display::fmt(err, f),
            ExecError::Runtime(err) => std::fmt::Display::fmt(err, f),
        }
    }
}

/// The context of a single match-in-progress: one program, one input, and
/// the machine state between steps.
///
/// The machine state consists of the data pointer DP (position in the
/// input), the execution pointer XP (position in the bytecode), the
/// capture stack KS and the control stack CS. The capture stack is
/// append-only; it is only ever cut back to a length snapshotted in a
/// choice frame. An execution is single-use: drive it with [`Self::step`]
/// or [`Self::run`] until it reaches a terminal [`Status`], then harvest
/// [`Self::results`].
#[derive(Clone, Debug)]
pub struct Execution<'a> {
    program: &'a Program,
    input: &'a [u8],
    dp: u64,
    xp: u64,
    ks: Vec<Assignment>,
    cs: Vec<Frame>,
    status: Status,
}

impl<'a> Execution<'a> {
    /// Constructs an execution of `program` over `input`, positioned at
    /// the start of both.
    pub fn with(program: &'a Program, input: &'a [u8]) -> Self {
        Execution {
            program,
            input,
            dp: 0,
            xp: 0,
            ks: Vec::with_capacity(2 * program.captures().len()),
            cs: Vec::with_capacity(16),
            status: Status::Running,
        }
    }

    /// Current data pointer (offset into the input).
    #[inline]
    pub fn dp(&self) -> u64 { self.dp }

    /// Current execution pointer (offset into the bytecode).
    #[inline]
    pub fn xp(&self) -> u64 { self.xp }

    /// Current execution status.
    #[inline]
    pub fn status(&self) -> Status { self.status }

    #[inline]
    fn available(&self) -> u64 { self.input.len() as u64 - self.dp }

    fn match_n(&self, pred: impl Fn(u8) -> bool, n: u64) -> bool {
        if self.available() < n {
            return false;
        }
        let start = self.dp as usize;
        self.input[start..start + n as usize].iter().all(|b| pred(*b))
    }

    fn match_lit(&self, lit: &[u8]) -> Option<u64> {
        let n = lit.len() as u64;
        if self.available() < n {
            return None;
        }
        let start = self.dp as usize;
        (&self.input[start..start + lit.len()] == lit).then_some(n)
    }

    /// Backtracks to the innermost choice point: pops frames, discarding
    /// call frames silently, until a choice frame restores the saved state.
    /// An exhausted stack terminates the match with [`Status::Failure`].
    fn fail(&mut self) {
        loop {
            match self.cs.pop() {
                None => {
                    self.status = Status::Failure;
                    self.ks.clear();
                    return;
                }
                Some(Frame::Choice { alt_xp, dp, ks_len }) => {
                    self.dp = dp;
                    self.xp = alt_xp;
                    self.ks.truncate(ks_len);
                    return;
                }
                Some(Frame::Call { .. }) => {}
            }
        }
    }

    fn pop_choice(&mut self) -> Result<(u64, u64, usize), RuntimeErrorKind> {
        match self.cs.pop() {
            Some(Frame::Choice { alt_xp, dp, ks_len }) => Ok((alt_xp, dp, ks_len)),
            Some(Frame::Call { .. }) => Err(RuntimeErrorKind::CallRetFrame),
            None => Err(RuntimeErrorKind::EmptyStack),
        }
    }

    #[inline]
    fn jump_target(&self, imm: u64) -> Result<u64, RuntimeErrorKind> {
        add_offset(self.xp, imm as i64).map_err(|_| RuntimeErrorKind::CodeOffsetOutOfRange)
    }

    fn push_assignment(&mut self, index: u64, is_end: bool, dp: u64) {
        self.ks.push(Assignment { dp, index, is_end });
    }

    /// Attempts to execute the next bytecode instruction.
    ///
    /// Reaching the end of the bytecode terminates the execution with
    /// [`Status::Success`]. Decode and runtime errors terminate it with
    /// [`Status::Error`], clear the capture stack and surface the error.
    /// Calling `step` on an already-terminated execution errors with
    /// [`ExecError::Halted`] without changing the status.
    pub fn step(&mut self) -> Result<(), ExecError> {
        if self.status != Status::Running {
            return Err(ExecError::Halted);
        }

        let op = match Op::decode(self.program.bytes(), self.xp) {
            Ok(Some(op)) => op,
            Ok(None) => {
                self.status = Status::Success;
                return Ok(());
            }
            Err(err) => {
                self.status = Status::Error;
                self.ks.clear();
                return Err(err.into());
            }
        };

        // Fall-through addressing: jumps overwrite XP afterwards, all
        // other instructions rely on this increment.
        self.xp += op.len as u64;

        if let Err(kind) = self.dispatch(&op) {
            self.status = Status::Error;
            self.ks.clear();
            return Err(RuntimeError { kind, xp: op.xp, dp: self.dp, op: op.code.mnemonic() }.into());
        }
        Ok(())
    }

    fn dispatch(&mut self, op: &Op) -> Result<(), RuntimeErrorKind> {
        match op.code {
            OpCode::Nop => {}

            OpCode::Choice => {
                let alt_xp = self.jump_target(op.imm0)?;
                self.cs.push(Frame::Choice { alt_xp, dp: self.dp, ks_len: self.ks.len() });
            }

            OpCode::Commit => {
                self.pop_choice()?;
                self.xp = self.jump_target(op.imm0)?;
            }

            OpCode::Fail => self.fail(),

            OpCode::AnyB => {
                if self.available() >= op.imm0 {
                    self.dp += op.imm0;
                } else {
                    self.fail();
                }
            }

            OpCode::SameB => {
                let byte = op.imm0 as u8;
                if self.match_n(|b| b == byte, op.imm1) {
                    self.dp += op.imm1;
                } else {
                    self.fail();
                }
            }

            OpCode::LitB => {
                let lit = self
                    .program
                    .literal(op.imm0)
                    .ok_or(RuntimeErrorKind::IndexRange)?;
                match self.match_lit(lit) {
                    Some(n) => self.dp += n,
                    None => self.fail(),
                }
            }

            OpCode::MatchB => {
                let matcher = self
                    .program
                    .matcher(op.imm0)
                    .ok_or(RuntimeErrorKind::IndexRange)?;
                if self.match_n(|b| matcher.matches(b), op.imm1) {
                    self.dp += op.imm1;
                } else {
                    self.fail();
                }
            }

            OpCode::Jmp => self.xp = self.jump_target(op.imm0)?,

            OpCode::Call => {
                self.cs.push(Frame::Call { ret_xp: self.xp });
                self.xp = self.jump_target(op.imm0)?;
            }

            OpCode::Ret => match self.cs.pop() {
                Some(Frame::Call { ret_xp }) => self.xp = ret_xp,
                Some(Frame::Choice { .. }) => return Err(RuntimeErrorKind::ChoiceFailFrame),
                None => return Err(RuntimeErrorKind::EmptyStack),
            },

            OpCode::TAnyB => {
                if self.available() >= op.imm1 {
                    self.dp += op.imm1;
                } else {
                    self.xp = self.jump_target(op.imm0)?;
                }
            }

            OpCode::TSameB => {
                let byte = op.imm1 as u8;
                if self.match_n(|b| b == byte, op.imm2) {
                    self.dp += op.imm2;
                } else {
                    self.xp = self.jump_target(op.imm0)?;
                }
            }

            OpCode::TLitB => {
                let lit = self
                    .program
                    .literal(op.imm1)
                    .ok_or(RuntimeErrorKind::IndexRange)?;
                match self.match_lit(lit) {
                    Some(n) => self.dp += n,
                    None => self.xp = self.jump_target(op.imm0)?,
                }
            }

            OpCode::TMatchB => {
                let matcher = self
                    .program
                    .matcher(op.imm1)
                    .ok_or(RuntimeErrorKind::IndexRange)?;
                if self.match_n(|b| matcher.matches(b), op.imm2) {
                    self.dp += op.imm2;
                } else {
                    self.xp = self.jump_target(op.imm0)?;
                }
            }

            OpCode::PCommit => {
                self.pop_choice()?;
                let alt_xp = self.jump_target(op.imm0)?;
                self.cs.push(Frame::Choice { alt_xp, dp: self.dp, ks_len: self.ks.len() });
            }

            OpCode::BCommit => {
                let (_, dp, ks_len) = self.pop_choice()?;
                self.dp = dp;
                self.ks.truncate(ks_len);
                self.xp = self.jump_target(op.imm0)?;
            }

            OpCode::SpanB => {
                let matcher = self
                    .program
                    .matcher(op.imm0)
                    .ok_or(RuntimeErrorKind::IndexRange)?;
                while self.dp < self.input.len() as u64 && matcher.matches(self.input[self.dp as usize])
                {
                    self.dp += 1;
                }
            }

            OpCode::Fail2X => {
                self.pop_choice()?;
                self.fail();
            }

            OpCode::RwndB => {
                if op.imm0 > self.dp {
                    return Err(RuntimeErrorKind::CountRange);
                }
                self.dp -= op.imm0;
            }

            OpCode::FCap => {
                if op.imm0 >= self.program.captures().len() as u64 {
                    return Err(RuntimeErrorKind::IndexRange);
                }
                if op.imm1 > self.dp {
                    return Err(RuntimeErrorKind::CountRange);
                }
                self.push_assignment(op.imm0, false, self.dp - op.imm1);
                self.push_assignment(op.imm0, true, self.dp);
            }

            OpCode::BCap => {
                if op.imm0 >= self.program.captures().len() as u64 {
                    return Err(RuntimeErrorKind::IndexRange);
                }
                self.push_assignment(op.imm0, false, self.dp);
            }

            OpCode::ECap => {
                if op.imm0 >= self.program.captures().len() as u64 {
                    return Err(RuntimeErrorKind::IndexRange);
                }
                self.push_assignment(op.imm0, true, self.dp);
            }

            OpCode::GiveUp => {
                self.status = Status::Failure;
                self.ks.clear();
            }

            OpCode::End => self.status = Status::Success,
        }
        Ok(())
    }

    /// Executes the program to completion.
    ///
    /// No time limit is enforced and an infinite loop is easy to write;
    /// callers running untrusted bytecode should drive [`Self::step`]
    /// themselves and check a deadline between steps.
    pub fn run(&mut self) -> Result<(), ExecError> {
        while self.status == Status::Running {
            self.step()?;
        }
        Ok(())
    }

    /// Materialises capture results from the capture stack of a terminated
    /// execution.
    ///
    /// Walks the stack in insertion order: each start assignment records a
    /// pending start position for its index, each end assignment closes
    /// the pending start into a pair.
    ///
    /// # Panics
    ///
    /// If the capture stack references a capture index outside the
    /// program's capture table, which the capture instructions make
    /// unrepresentable.
    pub fn results(&self) -> MatchResult {
        let n = self.program.captures().len();
        let mut events: Vec<Vec<CapturePair>> = vec![Vec::new(); n];
        let mut pending = vec![0u64; n];
        for a in &self.ks {
            let index = a.index as usize;
            assert!(index < n, "capture index out of range");
            if a.is_end {
                events[index].push(CapturePair { start: pending[index], end: a.dp });
                pending[index] = 0;
            } else {
                pending[index] = a.dp;
            }
        }
        MatchResult {
            success: self.status == Status::Success,
            captures: events.into_iter().map(Capture::with).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::library::CaptureMeta;

    fn assemble(ops: &[(OpCode, u64, u64, u64)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &(code, imm0, imm1, imm2) in ops {
            bytes.extend(code.meta().encode(imm0, imm1, imm2));
        }
        bytes
    }

    fn program(ops: &[(OpCode, u64, u64, u64)], captures: usize) -> Program {
        Program::with(
            assemble(ops),
            vec![],
            vec![],
            vec![CaptureMeta::default(); captures],
            bmap! {},
            vec![],
        )
    }

    fn run(program: &Program, input: &[u8]) -> Status {
        let mut exec = Execution::with(program, input);
        exec.run().expect("execution error");
        exec.status()
    }

    #[test]
    fn empty_program_succeeds() {
        let p = program(&[], 0);
        assert_eq!(run(&p, b"anything"), Status::Success);
    }

    #[test]
    fn end_of_stream_is_success() {
        let p = program(&[(OpCode::AnyB, 1, 0, 0)], 0);
        assert_eq!(run(&p, b"a"), Status::Success);
        assert_eq!(run(&p, b""), Status::Failure);
    }

    #[test]
    fn giveup_ignores_choice_frames() {
        use OpCode::*;
        let p = program(&[(Choice, 2, 0, 0), (GiveUp, 0, 0, 0), (End, 0, 0, 0)], 0);
        assert_eq!(run(&p, b""), Status::Failure);
    }

    #[test]
    fn anyb_counts() {
        use OpCode::*;
        let p = program(&[(AnyB, 3, 0, 0), (End, 0, 0, 0)], 0);
        assert_eq!(run(&p, b"abc"), Status::Success);
        assert_eq!(run(&p, b"abcd"), Status::Success);
        assert_eq!(run(&p, b"ab"), Status::Failure);
    }

    #[test]
    fn sameb_run() {
        use OpCode::*;
        let p = program(&[(SameB, b'z' as u64, 2, 0), (End, 0, 0, 0)], 0);
        assert_eq!(run(&p, b"zz"), Status::Success);
        assert_eq!(run(&p, b"za"), Status::Failure);
        assert_eq!(run(&p, b"z"), Status::Failure);
    }

    #[test]
    fn ordered_choice_backtracks() {
        use OpCode::*;
        // 'a' / 'b', then end of input.
        let p = program(
            &[
                (Choice, 4, 0, 0),              // -> alternative at SAMEB 'b'
                (SameB, b'a' as u64, 1, 0),     // 2 bytes
                (Commit, 2, 0, 0),              // -> END
                (SameB, b'b' as u64, 1, 0),
                (End, 0, 0, 0),
            ],
            0,
        );
        assert_eq!(run(&p, b"a"), Status::Success);
        assert_eq!(run(&p, b"b"), Status::Success);
        assert_eq!(run(&p, b"c"), Status::Failure);
    }

    #[test]
    fn call_and_ret() {
        use OpCode::*;
        // CALL a subroutine matching one byte, then END; subroutine after
        // the END.
        let p = program(
            &[
                (Call, 2, 0, 0),  // 3 bytes -> subroutine
                (End, 0, 0, 0),   // 2 bytes
                (AnyB, 1, 0, 0),  // 1 byte
                (Ret, 0, 0, 0),
            ],
            0,
        );
        assert_eq!(run(&p, b"x"), Status::Success);
        assert_eq!(run(&p, b""), Status::Failure);
    }

    #[test]
    fn fail_discards_call_frames() {
        use OpCode::*;
        // A CHOICE below a CALL frame: failing inside the subroutine must
        // pop through the call frame to the choice alternative.
        let p = program(
            &[
                (Choice, 6, 0, 0),  // 2 bytes -> END
                (Call, 2, 0, 0),    // 3 bytes -> FAIL
                (GiveUp, 0, 0, 0),  // 2 bytes; never reached
                (Fail, 0, 0, 0),
                (End, 0, 0, 0),
            ],
            0,
        );
        assert_eq!(run(&p, b""), Status::Success);
    }

    #[test]
    fn tany_jumps_instead_of_failing() {
        use OpCode::*;
        let p = program(
            &[
                (TAnyB, 2, 1, 0),   // 3 bytes; on empty input jump to GIVEUP
                (End, 0, 0, 0),     // 2 bytes
                (GiveUp, 0, 0, 0),
            ],
            0,
        );
        assert_eq!(run(&p, b"q"), Status::Success);
        assert_eq!(run(&p, b""), Status::Failure);
    }

    #[test]
    fn span_never_fails() {
        use OpCode::*;
        let p = Program::with(
            assemble(&[(SpanB, 0, 0, 0), (AnyB, 1, 0, 0), (End, 0, 0, 0)]),
            vec![],
            vec![crate::byteset::Matcher::Exactly(b'a')],
            vec![],
            bmap! {},
            vec![],
        );
        assert_eq!(run(&p, b"aaab"), Status::Success);
        assert_eq!(run(&p, b"b"), Status::Success);
        assert_eq!(run(&p, b"aaa"), Status::Failure, "span consumed all input");
    }

    #[test]
    fn rewind_moves_dp_back() {
        use OpCode::*;
        let p = program(
            &[(AnyB, 2, 0, 0), (RwndB, 1, 0, 0), (AnyB, 1, 0, 0), (End, 0, 0, 0)],
            0,
        );
        assert_eq!(run(&p, b"ab"), Status::Success);
    }

    #[test]
    fn fcap_records_trailing_range() {
        use OpCode::*;
        let p = program(&[(AnyB, 3, 0, 0), (FCap, 0, 2, 0), (End, 0, 0, 0)], 1);
        let mut exec = Execution::with(&p, b"abcd");
        exec.run().unwrap();
        let r = exec.results();
        assert!(r.success);
        assert_eq!(r.captures[0].solo, CapturePair { start: 1, end: 3 });
    }

    #[test]
    fn backtracking_discards_captures() {
        use OpCode::*;
        // First alternative records a capture and fails; the capture must
        // not survive into the second alternative.
        let p = program(
            &[
                (Choice, 7, 0, 0),   // 2 bytes -> second alternative
                (BCap, 0, 0, 0),     // 3 bytes
                (ECap, 0, 0, 0),     // 3 bytes
                (Fail, 0, 0, 0),     // 1 byte
                (End, 0, 0, 0),
            ],
            1,
        );
        let mut exec = Execution::with(&p, b"");
        exec.run().unwrap();
        assert_eq!(exec.status(), Status::Success);
        let r = exec.results();
        assert!(!r.captures[0].exists);
    }

    #[test]
    fn step_after_halt() {
        let p = program(&[(OpCode::End, 0, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"");
        exec.run().unwrap();
        assert_eq!(exec.status(), Status::Success);
        assert_eq!(exec.step(), Err(ExecError::Halted));
        assert_eq!(exec.status(), Status::Success, "halted call must not change status");
    }

    #[test]
    fn ret_on_choice_frame_errors() {
        use OpCode::*;
        let p = program(&[(Choice, 0, 0, 0), (Ret, 0, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"");
        let err = exec.run().unwrap_err();
        match err {
            ExecError::Runtime(e) => {
                assert_eq!(e.kind, RuntimeErrorKind::ChoiceFailFrame);
                assert_eq!(e.op, "RET");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(exec.status(), Status::Error);
    }

    #[test]
    fn commit_on_call_frame_errors() {
        use OpCode::*;
        let p = program(&[(Call, 0, 0, 0), (Commit, 0, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"");
        let err = exec.run().unwrap_err();
        match err {
            ExecError::Runtime(e) => assert_eq!(e.kind, RuntimeErrorKind::CallRetFrame),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn commit_on_empty_stack_errors() {
        use OpCode::*;
        let p = program(&[(Commit, 0, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"");
        match exec.run().unwrap_err() {
            ExecError::Runtime(e) => assert_eq!(e.kind, RuntimeErrorKind::EmptyStack),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn literal_index_out_of_range() {
        use OpCode::*;
        let p = program(&[(LitB, 0, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"");
        match exec.run().unwrap_err() {
            ExecError::Runtime(e) => {
                assert_eq!(e.kind, RuntimeErrorKind::IndexRange);
                assert_eq!(e.op, "LITB");
                assert_eq!(e.xp, 0);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn rewind_past_start_errors() {
        use OpCode::*;
        let p = program(&[(RwndB, 1, 0, 0)], 0);
        let mut exec = Execution::with(&p, b"xyz");
        match exec.run().unwrap_err() {
            ExecError::Runtime(e) => assert_eq!(e.kind, RuntimeErrorKind::CountRange),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn decode_error_poisons_execution() {
        // Raw stream with a reserved opcode.
        let p = Program::with(vec![0x92, 0x00], vec![], vec![], vec![], bmap! {}, vec![]);
        let mut exec = Execution::with(&p, b"");
        match exec.run().unwrap_err() {
            ExecError::Disassemble(e) => {
                assert_eq!(e.kind, crate::isa::DisassembleErrorKind::UnknownOpcode)
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(exec.status(), Status::Error);
        assert_eq!(exec.step(), Err(ExecError::Halted));
    }

    #[test]
    fn determinism() {
        use OpCode::*;
        let p = program(
            &[
                (Choice, 4, 0, 0),
                (SameB, b'a' as u64, 1, 0),
                (Commit, 1, 0, 0),
                (AnyB, 1, 0, 0),
                (BCap, 0, 0, 0),
                (ECap, 0, 0, 0),
                (End, 0, 0, 0),
            ],
            1,
        );
        let mut first: Option<MatchResult> = None;
        for _ in 0..3 {
            let mut exec = Execution::with(&p, b"a");
            exec.run().unwrap();
            let r = exec.results();
            if let Some(prev) = &first {
                assert_eq!(prev, &r);
            }
            first = Some(r);
        }
    }
}
