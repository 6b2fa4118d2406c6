//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use common::timer;
use crypto::eccipher::key_product;
use crypto::eccipher::ECCipher;
use crypto::eccipher::ECRistrettoParallel as ECRistretto;
use crypto::prelude::*;

use super::traits::PsiParty;
use crate::shared::ProtocolError;

/// A party holding its identifiers and a fresh key
pub struct Party {
    index: usize,
    identifiers: Vec<String>,
    key: EphemeralKey,
    ec_cipher: ECRistretto,
    encrypted: TPayload,
}

impl Party {
    pub fn new(index: usize, identifiers: Vec<String>) -> Party {
        let mut t = timer::Timer::new_silent("psi party");
        let key = EphemeralKey::generate();
        let ec_cipher = ECRistretto::default();
        let encrypted = ec_cipher.hash_encrypt_to_bytes(&identifiers, key.scalar());
        t.qps("hash+encrypt", identifiers.len());
        Party {
            index,
            identifiers,
            key,
            ec_cipher,
            encrypted,
        }
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub(crate) fn key(&self) -> &EphemeralKey {
        &self.key
    }

    /// Own identifiers keyed by every party's key, paired with the
    /// identifier they came from
    pub fn fully_keyed_items(&self, all_parties: &[Party]) -> Vec<(ByteBuffer, String)> {
        let product = key_product(all_parties.iter().map(|p| p.key()));
        self.ec_cipher
            .hash_encrypt_to_bytes(&self.identifiers, &product)
            .into_iter()
            .zip(self.identifiers.iter().cloned())
            .collect()
    }
}

impl PsiParty for Party {
    fn index(&self) -> usize {
        self.index
    }

    fn encrypted_set(&self) -> TPayload {
        self.encrypted.clone()
    }

    fn re_encrypt(&self, payload: &[ByteBuffer]) -> Result<TPayload, ProtocolError> {
        let points = self
            .ec_cipher
            .to_points_encrypt(payload, self.key.scalar())
            .map_err(|e| {
                error!("party {} cannot re-encrypt: {}", self.index, e);
                ProtocolError::from(e)
            })?;
        Ok(self.ec_cipher.to_bytes(&points))
    }
}

impl std::fmt::Debug for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Party {{ index: {}, identifiers: {} }}",
            self.index,
            self.identifiers.len()
        )
    }
}
