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

#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code,
    missing_docs
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Rust implementation of PegVM, a virtual machine executing parsing
//! expression grammars (PEGs) compiled to bytecode, together with an
//! assembler producing that bytecode from symbolic instruction streams.
//!
//! A compiled [`Program`] consists of bytecode plus side tables: byte-string
//! literals, [`byteset::Matcher`] byte-set predicates, capture metadata and
//! debugging labels. Running a program against an input byte string either
//! succeeds, yielding the set of captured input ranges, or fails. The
//! instruction set follows the LPeg parsing-machine school: ordered choice
//! with explicit backtracking, a single control stack holding both
//! call/return and choice/fail frames, greedy repetition via span and
//! partial-commit, and lookahead via back-commit and double-fail.
//!
//!
//! ## Instruction encoding
//!
//! Bytecode uses a variable-length, self-describing instruction format.
//! One-byte header, up to two immediates:
//!
//! ```text
//!   [ 0aaa | bbcc ] ...imm0 ...imm1
//!
//!   aaa = opcode              bb/cc = encoded width of imm0/imm1
//!
//!   width code:  00 = absent,  01 = 8 bit,  10 = 16 bit,  11 = 32 bit
//! ```
//!
//! Two-byte header, up to three immediates:
//!
//! ```text
//!   [ 1aaa | aaab ] [ bbcc | cddd ] ...imm0 ...imm1 ...imm2
//!
//!   aaaaaa = opcode           bbb/ccc/ddd = encoded width of imm0/imm1/imm2
//!
//!   width code:  000 = absent,  001 = 8 bit,   010 = 16 bit,
//!                011 = 32 bit,  100 = 64 bit,  101..111 = invalid
//! ```
//!
//! Leftmost bits are most significant; immediates are little-endian; signed
//! immediates are 2's complement and sign-extend to 64 bits on decode. The
//! one-byte form is preferred whenever the opcode is in `0..=7`, no third
//! immediate is present and both immediates fit in 32 bits.
//!
//!
//! ## Instruction set
//!
//! ```text
//!   +------+---------+---------+---------+---------+
//!   |      | 00      | 01      | 10      | 11      |
//!   +------+---------+---------+---------+---------+
//!   | 0000 | NOP     | CHOICE  | COMMIT  | FAIL    |
//!   | 0001 | ANYB    | SAMEB   | LITB    | MATCHB  |
//!   | 0010 | JMP     | -       | CALL    | RET     |
//!   | 0011 | TANYB   | TSAMEB  | TLITB   | TMATCHB |
//!   | 0100 | PCOMMIT | BCOMMIT | SPANB   | FAIL2X  |
//!   | 0101 | RWNDB   | FCAP    | BCAP    | ECAP    |
//!   | .... | -       | -       | -       | -       |
//!   | 1111 | -       | -       | GIVEUP  | END     |
//!   +------+---------+---------+---------+---------+
//!   (left: code bits 5-2; top: code bits 1-0)
//! ```
//!
//! Opcode semantics are documented on [`isa::OpCode`]; the execution model
//! (data pointer, execution pointer, control stack, capture stack) on
//! [`vm::Execution`].

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

pub mod byteset;
pub mod isa;
pub mod library;
pub mod vm;

pub use isa::{DisassembleError, Op, OpCode};
pub use library::{Assembler, CaptureMeta, Label, LabelRef, Operand, Program};
pub use vm::{Capture, CapturePair, ExecError, Execution, MatchResult, RuntimeError, Status};
