//! EIP-155 legacy transaction signing.
//!
//! RLP encoding via the `rlp` crate, the same dependency the sibling `mpt`
//! crate in this retrieval pack pulls in for Merkle-Patricia-trie node
//! encoding.

use rlp::RlpStream;

use crate::common::error::{Result, SccError};
use crate::primitives::{keccak256, sign_deterministic};

/// An unsigned Ethereum legacy transaction, scalars carried as minimal
/// big-endian byte strings (RLP's own representation for integers — there
/// is no separate "number" type in the encoding).
pub struct EthereumTxRequest {
    pub nonce: u64,
    pub gas_price: Vec<u8>,
    pub gas_limit: u64,
    /// `None` for contract creation.
    pub to: Option<[u8; 20]>,
    pub value: Vec<u8>,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(i) => &bytes[i..],
        None => &[],
    }
}

fn append_to_field(stream: &mut RlpStream, to: &Option<[u8; 20]>) {
    match to {
        Some(address) => {
            stream.append(&address.as_slice());
        }
        None => {
            stream.append_empty_data();
        }
    }
}

fn encode_unsigned_for_signing(tx: &EthereumTxRequest) -> Vec<u8> {
    let mut stream = RlpStream::new_list(9);
    stream.append(&tx.nonce);
    stream.append(&trim_leading_zeros(&tx.gas_price));
    stream.append(&tx.gas_limit);
    append_to_field(&mut stream, &tx.to);
    stream.append(&trim_leading_zeros(&tx.value));
    stream.append(&tx.data);
    stream.append(&tx.chain_id);
    stream.append_empty_data();
    stream.append_empty_data();
    stream.out().to_vec()
}

fn encode_signed(
    tx: &EthereumTxRequest,
    v: u64,
    r: &[u8; 32],
    s: &[u8; 32],
) -> Vec<u8> {
    let mut stream = RlpStream::new_list(9);
    stream.append(&tx.nonce);
    stream.append(&trim_leading_zeros(&tx.gas_price));
    stream.append(&tx.gas_limit);
    append_to_field(&mut stream, &tx.to);
    stream.append(&trim_leading_zeros(&tx.value));
    stream.append(&tx.data);
    stream.append(&v);
    stream.append(&trim_leading_zeros(r));
    stream.append(&trim_leading_zeros(s));
    stream.out().to_vec()
}

/// `keccak256(rlp([nonce,gasPrice,gasLimit,to,value,data,chainId,0,0]))`,
/// sign, `v = recovery_id + 35 + 2*chainId`, RLP-encode the signed form.
pub fn sign_ethereum_tx(priv_key: &[u8; 32], tx: &EthereumTxRequest) -> Result<Vec<u8>> {
    if tx.chain_id == 0 {
        return Err(SccError::BadInput("chain id must be nonzero".into()));
    }

    let signing_bytes = encode_unsigned_for_signing(tx);
    let signing_hash = keccak256(&signing_bytes);

    let signature = sign_deterministic(priv_key, &signing_hash)?;
    let v = signature.recovery_id as u64 + 35 + 2 * tx.chain_id;

    Ok(encode_signed(tx, v, &signature.r, &signature.s))
}
