//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![crate_name = "protocol"]

#[macro_use]
extern crate log;

pub mod artifact;
pub mod fileio;
pub mod identifier;
pub mod mpc;
pub mod normalizer;
pub mod pipeline;
pub mod psi;
pub mod regression;

pub mod shared {
    extern crate crypto;

    use crypto::eccipher::CipherError;
    use thiserror::Error;

    /// Plaintext numeric domain of features and labels
    pub type TDomain = f64;

    /// Row-major feature matrix type
    pub type TFeatures = Vec<Vec<TDomain>>;

    #[derive(Debug, Error)]
    pub enum ProtocolError {
        #[error("deserialization failed: {0}")]
        ErrorDeserialization(String),
        #[error("serialization failed: {0}")]
        ErrorSerialization(String),
        #[error("encryption failed: {0}")]
        ErrorEncryption(String),
        #[error("channel failure: {0}")]
        ErrorChannel(String),
        #[error("reveal failed: {0}")]
        ErrorReveal(String),
        #[error("io error: {0}")]
        ErrorIO(String),
        #[error("bad input data: {0}")]
        ErrorData(String),
        #[error("invalid configuration: {0}")]
        ErrorConfig(String),
    }

    impl From<CipherError> for ProtocolError {
        fn from(e: CipherError) -> Self {
            ProtocolError::ErrorEncryption(e.to_string())
        }
    }

    impl From<common::files::FileError> for ProtocolError {
        fn from(e: common::files::FileError) -> Self {
            ProtocolError::ErrorIO(e.to_string())
        }
    }

    impl From<std::io::Error> for ProtocolError {
        fn from(e: std::io::Error) -> Self {
            ProtocolError::ErrorIO(e.to_string())
        }
    }
}
