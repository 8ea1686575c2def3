use std::collections::HashMap;

use kauri_rs::types::{
    crypto_primitives::{Ed25519Crypto, Keypair, SigningKey},
    data_types::ReplicaID,
};
use rand_core::OsRng;

/// Fresh keypairs for replicas `1..=n`.
pub(crate) fn keypairs(n: u32) -> Vec<Keypair> {
    let mut csprg = OsRng {};
    (1..=n)
        .map(|id| Keypair::new(ReplicaID::new(id), SigningKey::generate(&mut csprg)))
        .collect()
}

/// A verifier that knows the public key of every one of `keypairs`.
pub(crate) fn crypto_for(keypairs: &[Keypair]) -> Ed25519Crypto {
    let keys: HashMap<_, _> = keypairs
        .iter()
        .map(|keypair| (keypair.id(), keypair.verifying_key()))
        .collect();
    Ed25519Crypto::new(keys)
}
