//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Multiparty private set intersection by commutative encryption on
//! Ristretto points.

pub mod exchange;
pub mod multiparty;
pub mod party;
pub mod traits;

pub use exchange::intersect;
pub use exchange::Intersection;
pub use exchange::PsiMode;
pub use multiparty::run_n_party_psi;
pub use party::Party;
