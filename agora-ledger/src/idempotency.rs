//! Idempotency key computation
//!
//! One logical ledger operation maps to exactly one key, so a replayed
//! request finds the transaction recorded the first time.

use agora_domain::{TransactionKind, WalletId};
use sha2::{Digest, Sha256};

/// Compute the idempotency key of a ledger movement
///
/// Formula: SHA256(kind + wallet_id + reference), hex encoded
pub fn ledger_key(kind: TransactionKind, wallet_id: WalletId, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(wallet_id.as_bytes());
    hasher.update(reference.as_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_is_deterministic() {
        let wallet_id = Uuid::now_v7();

        let a = ledger_key(TransactionKind::Deposit, wallet_id, "bank-transfer-1");
        let b = ledger_key(TransactionKind::Deposit, wallet_id, "bank-transfer-1");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_separates_kind_wallet_and_reference() {
        let wallet_id = Uuid::now_v7();
        let base = ledger_key(TransactionKind::EscrowHold, wallet_id, "escrow-1");

        assert_ne!(base, ledger_key(TransactionKind::EscrowRefund, wallet_id, "escrow-1"));
        assert_ne!(base, ledger_key(TransactionKind::EscrowHold, Uuid::now_v7(), "escrow-1"));
        assert_ne!(base, ledger_key(TransactionKind::EscrowHold, wallet_id, "escrow-2"));
    }
}
