//! Context bytes each attestation is bound to.
//!
//! A verifier rebuilds these from the stored record and asks the provider whether the proof was
//! issued for them. Every field is length-prefixed so no two records encode to the same bytes.

use crate::models::PayrollTransaction;
use payroll_zk::SealedValue;
use uuid::Uuid;

fn push_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u64).to_le_bytes());
    out.extend_from_slice(field);
}

/// A registration or salary-edit proof: the wallet and the sealed salary issued with it.
pub fn salary_context(wallet: &str, sealed: &SealedValue) -> Vec<u8> {
    let mut out = b"payroll/salary".to_vec();
    push_field(&mut out, wallet.as_bytes());
    push_field(&mut out, sealed.as_str().as_bytes());
    out
}

/// A per-employee payment proof inside one batch.
pub fn transaction_context(batch_id: Uuid, tx_ref: &str, wallet: &str, sealed: &SealedValue) -> Vec<u8> {
    let mut out = b"payroll/transaction".to_vec();
    push_field(&mut out, batch_id.as_bytes());
    push_field(&mut out, tx_ref.as_bytes());
    push_field(&mut out, wallet.as_bytes());
    push_field(&mut out, sealed.as_str().as_bytes());
    out
}

/// A batch proof: the batch id and every transaction, in order.
pub fn batch_context(batch_id: Uuid, transactions: &[PayrollTransaction]) -> Vec<u8> {
    let mut out = b"payroll/batch".to_vec();
    push_field(&mut out, batch_id.as_bytes());
    out.extend_from_slice(&(transactions.len() as u64).to_le_bytes());
    for tx in transactions {
        push_field(&mut out, tx.employee_id.as_bytes());
        push_field(&mut out, tx.employee_name.as_bytes());
        push_field(&mut out, tx.wallet.as_bytes());
        push_field(&mut out, tx.sealed_amount.as_str().as_bytes());
        push_field(&mut out, tx.proof.as_str().as_bytes());
        push_field(&mut out, tx.tx_ref.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroll_zk::ProofToken;

    fn tx(wallet: &str, tx_ref: &str) -> PayrollTransaction {
        PayrollTransaction {
            employee_id: Uuid::nil(),
            employee_name: "Ada".into(),
            wallet: wallet.into(),
            sealed_amount: SealedValue("c2VhbGVk".into()),
            proof: ProofToken("cHJvb2Y=".into()),
            tx_ref: tx_ref.into(),
        }
    }

    #[test]
    fn batch_context_covers_every_transaction() {
        let id = Uuid::new_v4();
        let full = batch_context(id, &[tx("w1", "0x01"), tx("w2", "0x02")]);
        assert_ne!(full, batch_context(id, &[tx("w1", "0x01")]));
        assert_ne!(full, batch_context(id, &[tx("w2", "0x02"), tx("w1", "0x01")]));
        assert_ne!(full, batch_context(Uuid::new_v4(), &[tx("w1", "0x01"), tx("w2", "0x02")]));
        assert_eq!(full, batch_context(id, &[tx("w1", "0x01"), tx("w2", "0x02")]));
    }

    #[test]
    fn fields_do_not_run_together() {
        let sealed = SealedValue("x".into());
        assert_ne!(salary_context("ab", &SealedValue("c".into())), salary_context("a", &SealedValue("bc".into())));
        assert_ne!(
            transaction_context(Uuid::nil(), "0x1", "w", &sealed),
            transaction_context(Uuid::nil(), "0x", "1w", &sealed)
        );
    }
}
