use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::{half, round2, zero};

/// Per-farmer financial ledger. All amounts carry two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub weight: BigDecimal,
    pub earnings_amount: BigDecimal,
    pub loan_limit: BigDecimal,
    pub borrowed_amount: BigDecimal,
    pub payable_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(farmer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            farmer_id,
            weight: zero(),
            earnings_amount: zero(),
            loan_limit: zero(),
            borrowed_amount: zero(),
            payable_amount: zero(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when both the credit line and the payable balance cover `total`.
    pub fn can_cover(&self, total: &BigDecimal) -> bool {
        &self.loan_limit >= total && &self.payable_amount >= total
    }

    pub fn apply_delta(&mut self, delta: &WalletDelta) {
        self.weight = round2(&(&self.weight + &delta.weight));
        self.earnings_amount = round2(&(&self.earnings_amount + &delta.earnings));
        self.loan_limit = round2(&(&self.loan_limit + &delta.loan_limit));
        self.payable_amount = round2(&(&self.payable_amount + &delta.payable));
        self.updated_at = Utc::now();
    }

    /// Applies a debit without checking coverage. Callers must hold whatever
    /// guarantees the check-and-write is indivisible.
    pub fn apply_debit(&mut self, debit: &Debit) {
        let total = debit.total();
        self.loan_limit = round2(&(&self.loan_limit - &total));
        self.payable_amount = round2(&(&self.payable_amount - &total));
        self.borrowed_amount = round2(&(&self.borrowed_amount + &debit.amount));
        self.updated_at = Utc::now();
    }

    pub fn apply_reversal(&mut self, debit: &Debit) {
        let total = debit.total();
        self.loan_limit = round2(&(&self.loan_limit + &total));
        self.payable_amount = round2(&(&self.payable_amount + &total));
        self.borrowed_amount = round2(&(&self.borrowed_amount - &debit.amount));
        self.updated_at = Utc::now();
    }

    pub fn reset(&mut self) {
        self.weight = zero();
        self.earnings_amount = zero();
        self.loan_limit = zero();
        self.borrowed_amount = zero();
        self.payable_amount = zero();
        self.updated_at = Utc::now();
    }
}

/// Credit applied to a wallet when a delivery is ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletDelta {
    pub weight: BigDecimal,
    pub earnings: BigDecimal,
    pub loan_limit: BigDecimal,
    pub payable: BigDecimal,
}

impl WalletDelta {
    /// Earnings and payable grow by the gross pay, the credit line by half of it.
    pub fn from_delivery(net_units: &BigDecimal, gross_pay: &BigDecimal) -> Self {
        Self {
            weight: round2(net_units),
            earnings: round2(gross_pay),
            loan_limit: half(gross_pay),
            payable: round2(gross_pay),
        }
    }

    pub fn rounded(&self) -> Self {
        Self {
            weight: round2(&self.weight),
            earnings: round2(&self.earnings),
            loan_limit: round2(&self.loan_limit),
            payable: round2(&self.payable),
        }
    }
}

/// Principal plus fee taken out of a wallet by a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Debit {
    pub amount: BigDecimal,
    pub charge: BigDecimal,
}

impl Debit {
    pub fn new(amount: &BigDecimal, charge: &BigDecimal) -> Self {
        Self {
            amount: round2(amount),
            charge: round2(charge),
        }
    }

    pub fn total(&self) -> BigDecimal {
        round2(&(&self.amount + &self.charge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn funded(limit: &str, payable: &str) -> Wallet {
        let mut wallet = Wallet::empty(Uuid::new_v4());
        wallet.loan_limit = dec(limit);
        wallet.payable_amount = dec(payable);
        wallet
    }

    #[test]
    fn test_delta_from_delivery_halves_gross_pay_for_loan_limit() {
        let delta = WalletDelta::from_delivery(&dec("12.345"), &dec("501.25"));
        assert_eq!(delta.weight, dec("12.35"));
        assert_eq!(delta.earnings, dec("501.25"));
        assert_eq!(delta.payable, dec("501.25"));
        assert_eq!(delta.loan_limit, dec("250.63"));
    }

    #[test]
    fn test_can_cover_requires_both_balances() {
        let wallet = funded("500", "100");
        assert!(wallet.can_cover(&dec("100")));
        assert!(!wallet.can_cover(&dec("100.01")));
    }

    #[test]
    fn test_debit_then_reversal_restores_balances() {
        let mut wallet = funded("500", "500");
        let before = wallet.clone();
        let debit = Debit::new(&dec("200"), &dec("20"));

        wallet.apply_debit(&debit);
        assert_eq!(wallet.loan_limit, dec("280"));
        assert_eq!(wallet.payable_amount, dec("280"));
        assert_eq!(wallet.borrowed_amount, dec("200"));

        wallet.apply_reversal(&debit);
        assert_eq!(wallet.loan_limit, before.loan_limit);
        assert_eq!(wallet.payable_amount, before.payable_amount);
        assert_eq!(wallet.borrowed_amount, before.borrowed_amount);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut wallet = funded("500", "500");
        wallet.apply_delta(&WalletDelta::from_delivery(&dec("10"), &dec("100")));
        wallet.reset();
        assert_eq!(wallet.loan_limit, zero());
        assert_eq!(wallet.weight, zero());
        assert_eq!(wallet.earnings_amount, zero());
    }
}
