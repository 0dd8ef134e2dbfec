//! Keyed AES-128 block PRF.
//!
//! A single 128-bit block cipher supplies every bit of pseudorandomness in
//! the core: PRP round functions, PMNS node streams, and the table-PRP
//! shuffle keystream. Inputs are encoded big-endian so outputs are
//! bit-identical across implementations.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::keys::PrfKey128;

pub struct BlockPrf {
    cipher: Aes128,
}

impl BlockPrf {
    pub fn new(key: PrfKey128) -> Self {
        Self {
            cipher: Aes128::new(&GenericArray::from(key)),
        }
    }

    /// Encrypts one 16-byte block.
    pub fn eval_block(&self, input: [u8; 16]) -> [u8; 16] {
        let mut block = GenericArray::from(input);
        self.cipher.encrypt_block(&mut block);
        block.into()
    }

    /// PRF on a pair of words: encrypts `BE8(hi) ‖ BE8(lo)` and returns
    /// the first 8 ciphertext bytes as a big-endian `u64`.
    pub fn eval_u64(&self, hi: u64, lo: u64) -> u64 {
        let mut input = [0u8; 16];
        input[0..8].copy_from_slice(&hi.to_be_bytes());
        input[8..16].copy_from_slice(&lo.to_be_bytes());
        let out = self.eval_block(input);
        u64::from_be_bytes(out[0..8].try_into().unwrap())
    }
}
