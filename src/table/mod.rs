/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Minimal perfect hash tables.

A [`Table`] is made of a [header](TableInfoOnDisk) and of an assignment array
built by a [`ChmBuilder`](crate::chm::ChmBuilder). The index of a key is
obtained by hashing it twice, masking the two hashes to two positions of the
assignment array, and masking the sum of the two values found there.

Tables can be persisted in the native format (a header followed by the
assignment array, see [`Table::store`] and [`Table::load`]) or serialized
with [ε-serde](`epserde`).

*/

mod info;
pub use info::*;

mod runtime;
pub use runtime::*;
