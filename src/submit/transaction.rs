use bytes::Bytes;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::transport::TransportError;

/// Signed wire bytes plus the identities that signed them
///
/// Immutable once built. Cloning only bumps a refcount, so the rebroadcaster,
/// the diagnoser and the caller can all hold the same payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    bytes: Bytes,
    signers: Vec<Pubkey>,
    expected_signature: Option<Signature>,
}

impl SignedTransaction {
    /// Wrap already-serialized bytes
    pub fn from_raw(bytes: impl Into<Bytes>, signers: Vec<Pubkey>) -> Self {
        Self {
            bytes: bytes.into(),
            signers,
            expected_signature: None,
        }
    }

    /// Serialize a signed versioned transaction
    pub fn from_versioned(tx: &VersionedTransaction) -> Result<Self, TransportError> {
        let bytes = bincode::serialize(tx)?;
        let required = tx.message.header().num_required_signatures as usize;
        let signers = tx
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .copied()
            .collect();
        Ok(Self {
            bytes: Bytes::from(bytes),
            signers,
            expected_signature: tx.signatures.first().copied(),
        })
    }

    /// Decode wire bytes produced by `from_versioned` (or any bincode encoder)
    pub fn from_wire(bytes: &[u8]) -> Result<Self, TransportError> {
        let tx: VersionedTransaction = bincode::deserialize(bytes)?;
        Self::from_versioned(&tx)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn signers(&self) -> &[Pubkey] {
        &self.signers
    }

    /// Fee-payer signature embedded in the bytes, when known
    ///
    /// The transport is still authoritative: it returns the signature used
    /// for correlation. This is only used to flag a mismatch.
    pub fn expected_signature(&self) -> Option<&Signature> {
        self.expected_signature.as_ref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        signature::{Keypair, Signer},
        system_instruction,
        transaction::Transaction,
    };

    fn signed_transfer() -> (VersionedTransaction, Pubkey) {
        let payer = Keypair::new();
        let recipient = Pubkey::new_unique();
        let ix = system_instruction::transfer(&payer.pubkey(), &recipient, 1);
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );
        (VersionedTransaction::from(tx), payer.pubkey())
    }

    #[test]
    fn from_versioned_extracts_signers_and_signature() {
        let (tx, payer) = signed_transfer();
        let signed = SignedTransaction::from_versioned(&tx).unwrap();

        assert_eq!(signed.signers(), &[payer]);
        assert_eq!(signed.expected_signature(), Some(&tx.signatures[0]));
        assert!(!signed.is_empty());
    }

    #[test]
    fn wire_bytes_decode_back_to_same_payload() {
        let (tx, _) = signed_transfer();
        let signed = SignedTransaction::from_versioned(&tx).unwrap();
        let decoded = SignedTransaction::from_wire(signed.bytes()).unwrap();
        assert_eq!(decoded, signed);
    }

    #[test]
    fn from_wire_rejects_garbage() {
        let err = SignedTransaction::from_wire(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn clones_share_the_buffer() {
        let signed = SignedTransaction::from_raw(vec![7u8; 32], vec![]);
        let clone = signed.clone();
        assert_eq!(signed.bytes().as_ptr(), clone.bytes().as_ptr());
    }
}
