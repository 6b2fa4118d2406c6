//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

extern crate protocol;

pub mod tcp;

pub use tcp::connect;
pub use tcp::ConnectError;
pub use tcp::MeshConfig;
pub use tcp::TcpChannel;
