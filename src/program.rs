//! Instruction-level front end to the submitter
//!
//! Builds, signs and submits a legacy transaction for a single program. Account
//! authorities are a closed set: an account either signs or it does not, and
//! either may be marked writable.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, VersionedTransaction},
};
use tracing::debug;

use crate::submit::{SignedTransaction, SubmitError, Submitter};

/// An account referenced by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionAuthority {
    /// Must sign the transaction
    Signer(Pubkey),
    Readonly(Pubkey),
}

impl InstructionAuthority {
    pub fn pubkey(&self) -> Pubkey {
        match self {
            Self::Signer(pubkey) | Self::Readonly(pubkey) => *pubkey,
        }
    }

    pub fn is_signer(&self) -> bool {
        matches!(self, Self::Signer(_))
    }

    pub fn writable(self) -> AuthorityMeta {
        AuthorityMeta {
            authority: self,
            writable: true,
        }
    }
}

/// Authority plus its writability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityMeta {
    pub authority: InstructionAuthority,
    pub writable: bool,
}

impl From<InstructionAuthority> for AuthorityMeta {
    fn from(authority: InstructionAuthority) -> Self {
        Self {
            authority,
            writable: false,
        }
    }
}

impl From<&AuthorityMeta> for AccountMeta {
    fn from(meta: &AuthorityMeta) -> Self {
        AccountMeta {
            pubkey: meta.authority.pubkey(),
            is_signer: meta.authority.is_signer(),
            is_writable: meta.writable,
        }
    }
}

pub fn authority_metas(authorities: &[AuthorityMeta]) -> Vec<AccountMeta> {
    authorities.iter().map(AccountMeta::from).collect()
}

/// Submits instructions for one program, paid for by `payer`
#[derive(Clone)]
pub struct ProgramClient {
    program_id: Pubkey,
    payer: Arc<Keypair>,
    submitter: Submitter,
}

impl std::fmt::Debug for ProgramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramClient")
            .field("program_id", &self.program_id)
            .field("payer", &self.payer.pubkey())
            .finish()
    }
}

impl ProgramClient {
    pub fn new(program_id: Pubkey, payer: Arc<Keypair>, submitter: Submitter) -> Self {
        Self {
            program_id,
            payer,
            submitter,
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn instruction(&self, data: Vec<u8>, authorities: &[AuthorityMeta]) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: authority_metas(authorities),
            data,
        }
    }

    /// Sign `instructions` with the payer and `extra_signers`, then submit
    ///
    /// The payer is always the first signer. Failing to fetch a blockhash or
    /// to sign is reported as an initial-submission failure.
    pub async fn send_tx(
        &self,
        instructions: &[Instruction],
        extra_signers: &[&Keypair],
        commitment: CommitmentConfig,
        timeout: Duration,
    ) -> Result<Signature, SubmitError> {
        let payer = self.payer.pubkey();
        let blockhash = self
            .submitter
            .transport()
            .latest_blockhash(commitment)
            .await
            .map_err(|e| SubmitError::InitialSubmit(format!("blockhash: {e}")))?;

        let mut signers: Vec<&dyn Signer> = vec![self.payer.as_ref()];
        signers.extend(
            extra_signers
                .iter()
                .filter(|k| k.pubkey() != payer)
                .map(|k| *k as &dyn Signer),
        );

        let mut tx = Transaction::new_unsigned(Message::new(instructions, Some(&payer)));
        tx.try_sign(signers.as_slice(), blockhash)
            .map_err(|e| SubmitError::InitialSubmit(format!("signing: {e}")))?;

        let signed = SignedTransaction::from_versioned(&VersionedTransaction::from(tx))
            .map_err(|e| SubmitError::InitialSubmit(e.to_string()))?;
        debug!(
            program_id = %self.program_id,
            instructions = instructions.len(),
            size = signed.len(),
            "Built transaction"
        );

        self.submitter
            .submit(&signed, commitment, timeout)
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::{ErrorKind, SubmitterConfig};
    use crate::test_utils::{CallKind, FakeTransport, StatusStep};
    use crate::transport::StatusRecord;

    fn client(transport: Arc<FakeTransport>) -> ProgramClient {
        ProgramClient::new(
            Pubkey::new_unique(),
            Arc::new(Keypair::new()),
            Submitter::new(transport, SubmitterConfig::default()),
        )
    }

    #[test]
    fn authorities_map_to_account_metas() {
        let signer = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let metas = authority_metas(&[
            InstructionAuthority::Signer(signer).writable(),
            InstructionAuthority::Readonly(vault).writable(),
            InstructionAuthority::Readonly(mint).into(),
        ]);

        assert_eq!(
            metas,
            vec![
                AccountMeta::new(signer, true),
                AccountMeta::new(vault, false),
                AccountMeta::new_readonly(mint, false),
            ]
        );
    }

    #[test]
    fn instruction_targets_program() {
        let client = client(Arc::new(FakeTransport::new()));
        let account = InstructionAuthority::Readonly(Pubkey::new_unique());
        let ix = client.instruction(vec![1, 2], &[account.into()]);
        assert_eq!(ix.program_id, *client.program_id());
        assert_eq!(ix.data, vec![1, 2]);
        assert_eq!(ix.accounts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_tx_fetches_blockhash_and_submits() {
        let transport = Arc::new(FakeTransport::new().with_status_default(StatusStep::Record(
            Some(StatusRecord {
                err: None,
                confirmations: Some(1),
                confirmation_status: Some("confirmed".to_string()),
            }),
        )));
        let client = client(transport.clone());
        let extra = Keypair::new();
        let ix = client.instruction(
            vec![0],
            &[InstructionAuthority::Signer(extra.pubkey()).writable()],
        );

        let signature = client
            .send_tx(&[ix], &[&extra], CommitmentConfig::confirmed(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(signature, FakeTransport::default_signature());
        assert_eq!(transport.count(CallKind::LatestBlockhash), 1);
        assert_eq!(transport.count(CallKind::SubmitRaw), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_signer_is_initial_submit_failure() {
        let transport = Arc::new(FakeTransport::new());
        let client = client(transport.clone());
        let absent = Pubkey::new_unique();
        let ix = client.instruction(vec![0], &[InstructionAuthority::Signer(absent).into()]);

        let err = client
            .send_tx(&[ix], &[], CommitmentConfig::confirmed(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InitialSubmit);
        assert_eq!(transport.count(CallKind::SubmitRaw), 0);
    }
}
