//! Legacy P2PKH Bitcoin transaction signing, built on `bitcoin`'s own
//! transaction and sighash types rather than hand-rolled serialization.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::common::error::{Result, SccError};
use crate::primitives::{hash160, sign_deterministic};

/// A UTXO being spent, with the BIP44 path of the key that controls it
/// recorded alongside (per §4.5.5, derivation is per-input).
pub struct BitcoinUtxoInput {
    pub txid: [u8; 32],
    pub vout: u32,
    pub amount_sats: u64,
    pub account: u32,
    pub change: u32,
    pub address_index: u32,
}

pub struct BitcoinOutput {
    pub script_pubkey: Vec<u8>,
    pub amount_sats: u64,
}

/// Private key + compressed pubkey for one input, already derived at the
/// path recorded on the matching `BitcoinUtxoInput`.
pub struct InputSigningKey {
    pub priv_key: [u8; 32],
    pub pubkey_compressed: [u8; 33],
}

impl Drop for InputSigningKey {
    fn drop(&mut self) {
        crate::primitives::wipe::secure_wipe(&mut self.priv_key);
    }
}

/// Build and sign a legacy P2PKH transaction. `signing_keys[i]` must be the
/// key derived for `inputs[i]`'s recorded path. `fee_sats` is checked
/// against `sum(inputs) - sum(outputs)` rather than recomputed — the SCC
/// does not implement fee-market strategy.
pub fn sign_bitcoin_tx(
    inputs: &[BitcoinUtxoInput],
    signing_keys: &[InputSigningKey],
    outputs: &[BitcoinOutput],
    fee_sats: u64,
) -> Result<Vec<u8>> {
    if inputs.len() != signing_keys.len() {
        return Err(SccError::BadInput(
            "one signing key is required per input".into(),
        ));
    }

    let total_in: u64 = inputs.iter().map(|i| i.amount_sats).sum();
    let total_out: u64 = outputs.iter().map(|o| o.amount_sats).sum();
    if total_in < total_out || total_in - total_out != fee_sats {
        return Err(SccError::BadInput(
            "inputs minus outputs does not match the supplied fee".into(),
        ));
    }

    let tx_ins: Vec<TxIn> = inputs
        .iter()
        .map(|input| TxIn {
            previous_output: OutPoint {
                txid: Txid::from_raw_hash(Hash::from_byte_array(input.txid)),
                vout: input.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let tx_outs: Vec<TxOut> = outputs
        .iter()
        .map(|output| TxOut {
            value: Amount::from_sat(output.amount_sats),
            script_pubkey: ScriptBuf::from_bytes(output.script_pubkey.clone()),
        })
        .collect();

    let mut unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_ins,
        output: tx_outs,
    };

    for (index, (_input, key)) in inputs.iter().zip(signing_keys.iter()).enumerate() {
        let pubkey_hash = PubkeyHash::from_byte_array(hash160(&key.pubkey_compressed));
        let script_pubkey = ScriptBuf::new_p2pkh(&pubkey_hash);

        let sighash = {
            let mut cache = SighashCache::new(&unsigned_tx);
            cache
                .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(|e| SccError::BadInput(format!("sighash computation failed: {e}")))?
        };

        let signature = sign_deterministic(&key.priv_key, sighash.as_byte_array())?;
        let mut der = signature.to_der();
        der.push(EcdsaSighashType::All.to_u32() as u8);

        let mut script_sig = bitcoin::script::Builder::new();
        script_sig = script_sig.push_slice(PushBytesBuf::try_from(der).map_err(|e| {
            SccError::internal(format!("signature exceeds script push limit: {e}"))
        })?);
        script_sig = script_sig.push_slice(PushBytesBuf::try_from(key.pubkey_compressed.to_vec()).map_err(|e| {
            SccError::internal(format!("pubkey exceeds script push limit: {e}"))
        })?);

        unsigned_tx.input[index].script_sig = script_sig.into_script();
    }

    Ok(bitcoin::consensus::encode::serialize(&unsigned_tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::point_mul_generator;

    fn test_priv_key(byte: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = byte;
        key
    }

    #[test]
    fn test_sign_single_input_produces_nonempty_tx() {
        let priv_key = test_priv_key(7);
        let pubkey = point_mul_generator(&priv_key).unwrap();

        let inputs = vec![BitcoinUtxoInput {
            txid: [0x11u8; 32],
            vout: 0,
            amount_sats: 100_000,
            account: 0,
            change: 0,
            address_index: 0,
        }];
        let signing_keys = vec![InputSigningKey {
            priv_key,
            pubkey_compressed: pubkey,
        }];
        let pubkey_hash = PubkeyHash::from_byte_array(hash160(&pubkey));
        let outputs = vec![BitcoinOutput {
            script_pubkey: ScriptBuf::new_p2pkh(&pubkey_hash).to_bytes(),
            amount_sats: 99_000,
        }];

        let raw = sign_bitcoin_tx(&inputs, &signing_keys, &outputs, 1_000).unwrap();
        assert!(!raw.is_empty());
    }

    #[test]
    fn test_rejects_fee_mismatch() {
        let priv_key = test_priv_key(7);
        let pubkey = point_mul_generator(&priv_key).unwrap();

        let inputs = vec![BitcoinUtxoInput {
            txid: [0x11u8; 32],
            vout: 0,
            amount_sats: 100_000,
            account: 0,
            change: 0,
            address_index: 0,
        }];
        let signing_keys = vec![InputSigningKey {
            priv_key,
            pubkey_compressed: pubkey,
        }];
        let pubkey_hash = PubkeyHash::from_byte_array(hash160(&pubkey));
        let outputs = vec![BitcoinOutput {
            script_pubkey: ScriptBuf::new_p2pkh(&pubkey_hash).to_bytes(),
            amount_sats: 99_000,
        }];

        let result = sign_bitcoin_tx(&inputs, &signing_keys, &outputs, 5_000);
        assert!(result.is_err());
    }
}
