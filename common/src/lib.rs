//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

/// Simple timer
pub mod timer;

/// Simple file io
pub mod files;

/// Permutation utils
pub mod permutations;

/// Model evaluation metrics
pub mod metrics;
