//! Local keypair signer

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::execution::TransactionSigner;
use crate::shared::errors::{AppError, SignError};
use crate::shared::types::{SignedTransaction, UnsignedTransaction};

/// Signs routing-service payloads with a keypair held in memory.
///
/// The keypair is locked only while a single signature is produced.
pub struct KeypairSigner {
    keypair: Mutex<Keypair>,
    pubkey: Pubkey,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        let pubkey = keypair.pubkey();
        Self {
            keypair: Mutex::new(keypair),
            pubkey,
        }
    }

    /// Load a Solana CLI style JSON keypair file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let keypair = read_keypair_file(path).map_err(|e| {
            AppError::WalletError(format!("Failed to read keypair {}: {}", path.display(), e))
        })?;
        Ok(Self::new(keypair))
    }
}

impl TransactionSigner for KeypairSigner {
    fn public_key(&self) -> Pubkey {
        self.pubkey
    }

    fn sign(&self, unsigned: &UnsignedTransaction) -> Result<SignedTransaction, SignError> {
        let decoded: VersionedTransaction = bincode::deserialize(&unsigned.payload)
            .map_err(|e| SignError::MalformedPayload(e.to_string()))?;

        let fee_payer = decoded
            .message
            .static_account_keys()
            .first()
            .copied()
            .ok_or_else(|| SignError::MalformedPayload("message has no account keys".to_string()))?;
        if fee_payer != self.pubkey {
            return Err(SignError::SignerMismatch {
                expected: fee_payer,
                actual: self.pubkey,
            });
        }
        let mut transaction = decoded;
        let required = transaction.message.header().num_required_signatures as usize;
        if required == 0 {
            return Err(SignError::MalformedPayload(
                "fee payer is not a required signer".to_string(),
            ));
        }
        if transaction.signatures.len() < required {
            transaction.signatures.resize(required, Signature::default());
        }

        // Co-signatures already present in the payload are left untouched.
        let message = transaction.message.serialize();
        let keypair = self
            .keypair
            .lock()
            .map_err(|_| SignError::Signing("keypair lock poisoned".to_string()))?;
        let signature = keypair
            .try_sign_message(&message)
            .map_err(|e| SignError::Signing(e.to_string()))?;
        drop(keypair);
        let slot = transaction
            .signatures
            .first_mut()
            .ok_or_else(|| SignError::MalformedPayload("no signature slots".to_string()))?;
        *slot = signature;

        debug!("Signed payload of {} bytes", unsigned.payload.len());
        SignedTransaction::new(transaction)
            .ok_or_else(|| SignError::Signing("signer produced no signature".to_string()))
    }
}
