//! Ledger audit: replay a wallet's transaction log and compare with the
//! stored balances.

use agora_domain::{Transaction, Wallet, WalletId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of replaying one wallet's transactions from zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub wallet_id: WalletId,
    pub transaction_count: usize,
    pub stored_balance: Decimal,
    pub replayed_balance: Decimal,
    pub stored_escrow_balance: Decimal,
    pub replayed_escrow_balance: Decimal,
}

impl AuditReport {
    /// Fold the transaction log and compare against the wallet
    pub fn replay(wallet: &Wallet, transactions: &[Transaction]) -> Self {
        let own: Vec<&Transaction> = transactions.iter().filter(|t| t.wallet_id == wallet.id).collect();
        let (balance, escrow) = own
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(balance, escrow), t| {
                (balance + t.balance_delta, escrow + t.escrow_delta)
            });

        Self {
            wallet_id: wallet.id,
            transaction_count: own.len(),
            stored_balance: wallet.balance,
            replayed_balance: balance,
            stored_escrow_balance: wallet.escrow_balance,
            replayed_escrow_balance: escrow,
        }
    }

    /// True when replayed and stored balances agree
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.replayed_balance
            && self.stored_escrow_balance == self.replayed_escrow_balance
    }
}
