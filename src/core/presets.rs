use super::{CandidateInput, TransactionType};

/// A canned demo scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub id: &'static str,
    pub description: &'static str,
    pub input: CandidateInput,
}

fn preset(
    id: &'static str,
    description: &'static str,
    tx_type: TransactionType,
    amount: f64,
    origin: f64,
    dest: f64,
) -> Preset {
    Preset {
        id,
        description,
        input: CandidateInput {
            step: 1,
            tx_type,
            amount,
            origin_balance_before: origin,
            dest_balance_before: dest,
            allow_overdraft: false,
        },
    }
}

pub fn all() -> Vec<Preset> {
    vec![
        preset("normal_payment", "Small payment from a well-funded account", TransactionType::Payment, 5_000.0, 150_000.0, 0.0),
        preset("large_transfer", "Transfer of most of the origin balance", TransactionType::Transfer, 140_000.0, 150_000.0, 0.0),
        preset("suspicious_cashout", "Cash-out that drains the account", TransactionType::CashOut, 25_000.0, 25_000.0, 0.0),
        preset("large_cashin", "Large cash deposit into an empty account", TransactionType::CashIn, 180_000.0, 0.0, 180_000.0),
        preset("small_debit", "Routine small debit", TransactionType::Debit, 500.0, 50_000.0, 0.0),
        preset("known_fraud_pattern", "Full-balance transfer to an empty destination", TransactionType::Transfer, 50_000.0, 50_000.0, 0.0),
    ]
}

pub fn find(id: &str) -> Option<Preset> {
    all().into_iter().find(|p| p.id == id)
}
