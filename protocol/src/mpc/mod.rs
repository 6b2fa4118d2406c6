//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Additive secret sharing of fixed-point numbers over Z/2^64.
//!
//! Provides the runtime both the PSI exchange and the regression trainer
//! run on: start, broadcast, input, arithmetic, reveal and shutdown.

pub mod channel;
pub mod dealer;
pub mod runtime;
pub mod share;

pub use channel::Channel;
pub use channel::LocalChannel;
pub use runtime::Runtime;
pub use share::SecFxp;
