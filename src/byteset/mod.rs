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

//! Byte-set matchers: pure predicates over single bytes, referenced from
//! bytecode by the MATCHB / TMATCHB / SPANB instruction family.

mod dense;

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

pub use self::dense::DenseSet;

/// A range of consecutive bytes, inclusive on both ends.
///
/// A range with `lo > hi` denotes the empty set and is dropped during
/// matcher construction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ByteRange {
    /// The smallest byte in the range.
    pub lo: u8,
    /// The largest byte in the range.
    pub hi: u8,
}

impl ByteRange {
    /// Constructs a range covering `lo..=hi`.
    #[inline]
    pub fn new(lo: u8, hi: u8) -> Self { ByteRange { lo, hi } }
}

/// A predicate matching a set of bytes.
///
/// Matching is pure: no variant mutates its state on [`Matcher::matches`].
/// Matchers are immutable once constructed and may be freely shared between
/// program executions.
///
/// Construction does not normalise representation (except for
/// [`Matcher::ranges`], which sorts and coalesces its intervals);
/// [`Matcher::optimize`] must be called explicitly where compactness
/// matters.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Matcher {
    /// Matches no byte at all.
    None,

    /// Matches every possible byte.
    All,

    /// Matches one specific byte. The best choice for single-byte sets.
    Exactly(u8),

    /// Matches any byte of an explicitly enumerated set. The best choice
    /// for small-ish sets of mostly non-consecutive bytes.
    Sparse(BTreeSet<u8>),

    /// Matches against a 256-bit bitmap. The best choice for sets without
    /// a clear pattern.
    Dense(DenseSet),

    /// Matches any byte falling into one of the sorted, coalesced ranges.
    /// The best choice when the set consists of a few runs of consecutive
    /// bytes.
    Ranges(Vec<ByteRange>),

    /// Matches any byte the inner matcher does not match.
    Not(Box<Matcher>),

    /// Matches bytes matched by every inner matcher.
    And(Vec<Matcher>),

    /// Matches bytes matched by at least one inner matcher.
    Or(Vec<Matcher>),
}

impl Matcher {
    /// Constructs a matcher for an enumerated set of bytes.
    #[inline]
    pub fn sparse(bytes: impl IntoIterator<Item = u8>) -> Self {
        Matcher::Sparse(bytes.into_iter().collect())
    }

    /// Constructs a bitmap-backed matcher for an enumerated set of bytes.
    #[inline]
    pub fn dense(bytes: impl IntoIterator<Item = u8>) -> Self {
        Matcher::Dense(bytes.into_iter().collect())
    }

    /// Constructs a matcher for a set of byte ranges.
    ///
    /// Normalises the representation: empty ranges (`lo > hi`) are dropped,
    /// the rest are sorted by `lo` and overlapping or adjacent ranges are
    /// coalesced into single entries.
    pub fn ranges(ranges: impl IntoIterator<Item = ByteRange>) -> Self {
        let mut sorted: Vec<ByteRange> = ranges.into_iter().filter(|r| r.lo <= r.hi).collect();
        sorted.sort_by_key(|r| r.lo);

        let mut coalesced: Vec<ByteRange> = Vec::with_capacity(sorted.len());
        for r in sorted {
            match coalesced.last_mut() {
                // Fully contained in the previous range.
                Some(last) if last.hi >= r.hi => {}
                // Overlapping or adjacent: extend the previous range.
                Some(last) if u16::from(last.hi) + 1 >= u16::from(r.lo) => last.hi = r.hi,
                _ => coalesced.push(r),
            }
        }
        Matcher::Ranges(coalesced)
    }

    /// Constructs the negation of the given matcher.
    #[inline]
    pub fn not(inner: Matcher) -> Self { Matcher::Not(Box::new(inner)) }

    /// Constructs the intersection of the given matchers.
    #[inline]
    pub fn and(list: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::And(list.into_iter().collect())
    }

    /// Constructs the union of the given matchers.
    #[inline]
    pub fn or(list: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::Or(list.into_iter().collect())
    }

    /// Returns whether byte `b` is in the set.
    pub fn matches(&self, b: u8) -> bool {
        match self {
            Matcher::None => false,
            Matcher::All => true,
            Matcher::Exactly(e) => b == *e,
            Matcher::Sparse(set) => set.contains(&b),
            Matcher::Dense(set) => set.contains(b),
            Matcher::Ranges(ranges) => {
                let i = ranges.partition_point(|r| r.hi < b);
                ranges.get(i).map(|r| r.lo <= b && b <= r.hi).unwrap_or_default()
            }
            Matcher::Not(inner) => !inner.matches(b),
            Matcher::And(list) => list.iter().all(|m| m.matches(b)),
            Matcher::Or(list) => list.iter().any(|m| m.matches(b)),
        }
    }

    /// Calls `f` exactly once for each byte in the set; successive calls
    /// receive strictly ascending byte values.
    pub fn for_each(&self, mut f: impl FnMut(u8)) { self.for_each_dyn(&mut f); }

    // Recursive calls go through a `dyn` callback so that matcher nesting
    // depth does not cause unbounded monomorphization of `for_each`.
    fn for_each_dyn(&self, f: &mut dyn FnMut(u8)) {
        match self {
            Matcher::None => {}
            Matcher::All => (0u8..=255).for_each(f),
            Matcher::Exactly(e) => f(*e),
            Matcher::Sparse(set) => set.iter().copied().for_each(f),
            Matcher::Dense(set) => set.for_each(f),
            Matcher::Ranges(ranges) => {
                for r in ranges {
                    (r.lo..=r.hi).for_each(&mut *f);
                }
            }
            Matcher::And(list) if !list.is_empty() => {
                let (first, rest) = list.split_first().expect("non-empty list");
                first.for_each_dyn(&mut |b| {
                    if rest.iter().all(|m| m.matches(b)) {
                        f(b)
                    }
                });
            }
            Matcher::Or(list) => {
                // Aggregating into a set deduplicates across the children
                // and restores ascending order.
                let mut set = BTreeSet::new();
                for m in list {
                    m.for_each_dyn(&mut |b| {
                        set.insert(b);
                    });
                }
                set.into_iter().for_each(f);
            }
            // Negation and the empty intersection have no better strategy
            // than scanning the whole alphabet.
            _ => {
                for b in 0u8..=255 {
                    if self.matches(b) {
                        f(b)
                    }
                }
            }
        }
    }

    /// Collects every byte in the set into a vector, in ascending order.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.for_each(|b| out.push(b));
        out
    }

    /// Materialises the set as a 256-bit bitmap.
    pub fn as_dense(&self) -> DenseSet {
        if let Matcher::Dense(set) = self {
            return *set;
        }
        let mut set = DenseSet::new();
        self.for_each(|b| set.insert(b));
        set
    }

    /// Returns a matcher accepting the same set of bytes, but possibly with
    /// a smaller or faster representation. If no better representation can
    /// be found, returns the matcher unchanged.
    pub fn optimize(self) -> Matcher {
        match self {
            Matcher::Sparse(set) if set.is_empty() => Matcher::None,
            Matcher::Sparse(set) if set.len() == 1 => {
                Matcher::Exactly(*set.first().expect("single element"))
            }
            Matcher::Dense(set) => match set.count() {
                0 => Matcher::None,
                256 => Matcher::All,
                1 => {
                    let mut byte = 0;
                    set.for_each(|b| byte = b);
                    Matcher::Exactly(byte)
                }
                _ => Matcher::Dense(set),
            },
            Matcher::Ranges(ranges) if ranges.is_empty() => Matcher::None,
            Matcher::Not(inner) => match inner.optimize() {
                Matcher::All => Matcher::None,
                Matcher::None => Matcher::All,
                Matcher::Not(x) => *x,
                Matcher::Dense(set) => Matcher::Dense(set.complement()),
                other => Matcher::not(other),
            },
            Matcher::And(list) if list.is_empty() => Matcher::All,
            Matcher::Or(list) if list.is_empty() => Matcher::None,
            Matcher::And(mut list) | Matcher::Or(mut list) if list.len() == 1 => {
                list.pop().expect("single element").optimize()
            }
            m @ Matcher::And(_) | m @ Matcher::Or(_) => Matcher::Dense(m.as_dense()).optimize(),
            other => other,
        }
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::All => f.write_str("."),
            Matcher::None => f.write_str("!."),
            Matcher::Not(inner) => write!(f, "!{inner}"),
            _ => {
                f.write_str("[")?;
                let mut err = Ok(());
                self.for_each(|b| {
                    if err.is_ok() {
                        err = write!(f, "\\x{b:02x}");
                    }
                });
                err?;
                f.write_str("]")
            }
        }
    }
}
