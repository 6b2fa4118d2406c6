//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Neg;
use std::ops::Sub;
use std::ops::SubAssign;

use crypto::prelude::TShare;
use serde::Deserialize;
use serde::Serialize;

/// This party's additive share of a secret fixed-point number.
///
/// Linear operations are local; everything else goes through
/// [`super::Runtime`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecFxp(pub(crate) TShare);

impl SecFxp {
    pub fn zero() -> SecFxp {
        SecFxp(0)
    }

    pub fn raw(&self) -> TShare {
        self.0
    }

    pub fn sum(items: &[SecFxp]) -> SecFxp {
        items.iter().fold(SecFxp::zero(), |acc, x| acc + *x)
    }
}

impl Add for SecFxp {
    type Output = SecFxp;

    fn add(self, rhs: SecFxp) -> SecFxp {
        SecFxp(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for SecFxp {
    type Output = SecFxp;

    fn sub(self, rhs: SecFxp) -> SecFxp {
        SecFxp(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for SecFxp {
    type Output = SecFxp;

    fn neg(self) -> SecFxp {
        SecFxp(self.0.wrapping_neg())
    }
}

impl AddAssign for SecFxp {
    fn add_assign(&mut self, rhs: SecFxp) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl SubAssign for SecFxp {
    fn sub_assign(&mut self, rhs: SecFxp) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

#[cfg(test)]
mod tests {
    use crypto::fixed::decode;
    use crypto::fixed::encode;

    use super::*;

    #[test]
    fn linear_ops_wrap() {
        let a = SecFxp(encode(1.5));
        let b = SecFxp(encode(-4.0));
        assert_eq!(decode((a + b).raw()), -2.5);
        assert_eq!(decode((a - b).raw()), 5.5);
        assert_eq!(decode((-b).raw()), 4.0);
        assert_eq!(decode(SecFxp::sum(&[a, a, b]).raw()), -1.0);

        let mut c = a;
        c += b;
        c -= b;
        assert_eq!(c, a);
    }
}
