//! Contract address derivation

use rlp::RlpStream;
use tessera_primitives::{Address, H256};

use crate::hash::keccak256;

/// Address of a contract created with CREATE: `keccak256(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(&nonce);
    Address::from_word(keccak256(&stream.out()).as_bytes())
}

/// Address of a contract created with CREATE2:
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`.
pub fn create2_address(sender: &Address, salt: &H256, init_code: &[u8]) -> Address {
    let code_hash = keccak256(init_code);
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(sender.as_bytes());
    preimage[21..53].copy_from_slice(salt.as_bytes());
    preimage[53..85].copy_from_slice(code_hash.as_bytes());
    Address::from_word(keccak256(&preimage).as_bytes())
}
