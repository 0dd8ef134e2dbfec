//! Invertible PRF.
//!
//! `F(x) = S(P(x))`: a small-domain PRP scrambles the input, then the
//! PMNS assigns the permuted value to a bin. Because the PMNS preimage of
//! a bin is one contiguous range of permuted values, the full preimage
//! set of `F` is recovered by pulling that range back through `P⁻¹`.
//!
//! The two subkeys are derived from the master secret under separate
//! context strings, so the same `(master, n, m)` always reproduces the
//! same function.

use crate::error::{PirError, Result};
use crate::keys::{MasterSecret, CTX_PMNS, CTX_PRP};
use crate::pmns::Pmns;
use crate::prp::{Prp, PrpKind};

pub struct Iprf {
    prp: Prp,
    pmns: Pmns,
    domain: u64,
    range: u64,
}

impl Iprf {
    /// Builds an iPRF with domain `[0, n)` and range `[0, m)`. The PRP
    /// backing is a construction-time choice; the contract is identical
    /// for both kinds.
    pub fn new(master: &MasterSecret, domain: u64, range: u64, prp: PrpKind) -> Self {
        Self {
            prp: Prp::new(prp, master.derive(CTX_PRP), domain),
            pmns: Pmns::new(master.derive(CTX_PMNS), domain, range),
            domain,
            range,
        }
    }

    pub fn domain(&self) -> u64 {
        self.domain
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    /// Forward evaluation. One PRP walk plus one PMNS descent.
    pub fn eval(&self, x: u64) -> Result<u64> {
        if x >= self.domain {
            return Err(PirError::Domain {
                what: "iPRF input",
                bound: self.domain,
            });
        }
        let permuted = self.prp.permute(x)?;
        Ok(self.pmns.assign(permuted))
    }

    /// The full preimage set `{ x : F(x) = y }`, materialized. Expected
    /// size is `n / m`.
    pub fn preimage(&self, y: u64) -> Result<Vec<u64>> {
        if y >= self.range {
            return Err(PirError::Domain {
                what: "iPRF preimage bin",
                bound: self.range,
            });
        }
        self.pmns
            .preimage(y)
            .iter()
            .map(|z| self.prp.inverse(z))
            .collect()
    }
}
