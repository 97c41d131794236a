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

//! PegVM instruction set architecture: opcode and immediate-slot metadata,
//! plus the variable-length instruction codec.

mod bytecode;
mod opcodes;

pub use bytecode::{
    add_offset, imm_width_decode, imm_width_encode, DisassembleError, DisassembleErrorKind, Op,
    OffsetOverflow,
};
pub use opcodes::{ImmBytes, ImmMeta, ImmType, OpCode, OpMeta};
