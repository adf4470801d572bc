//! Fee percentages and minimum amounts per transaction kind.

use bigdecimal::BigDecimal;

use crate::domain::money::percent_of;
use crate::domain::TransactionKind;

pub const LOAN_FEE_PERCENT: u32 = 10;
pub const LOAN_MINIMUM: i64 = 50;
pub const AIRTIME_FEE_PERCENT: u32 = 4;
pub const AIRTIME_MINIMUM: i64 = 10;
pub const TRANSFER_FEE_PERCENT: u32 = 10;
pub const TRANSFER_MINIMUM: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRule {
    pub percent: u32,
    pub minimum: i64,
}

impl FeeRule {
    pub fn charge_for(&self, amount: &BigDecimal) -> BigDecimal {
        percent_of(amount, self.percent)
    }

    pub fn minimum_amount(&self) -> BigDecimal {
        BigDecimal::from(self.minimum)
    }

    pub fn meets_minimum(&self, amount: &BigDecimal) -> bool {
        amount >= &self.minimum_amount()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub loan: FeeRule,
    pub airtime: FeeRule,
    pub transfer: FeeRule,
}

impl FeeSchedule {
    pub const fn standard() -> Self {
        Self {
            loan: FeeRule {
                percent: LOAN_FEE_PERCENT,
                minimum: LOAN_MINIMUM,
            },
            airtime: FeeRule {
                percent: AIRTIME_FEE_PERCENT,
                minimum: AIRTIME_MINIMUM,
            },
            transfer: FeeRule {
                percent: TRANSFER_FEE_PERCENT,
                minimum: TRANSFER_MINIMUM,
            },
        }
    }

    pub fn rule(&self, kind: TransactionKind) -> FeeRule {
        match kind {
            TransactionKind::Loan => self.loan,
            TransactionKind::AirtimePurchase => self.airtime,
            TransactionKind::MoneyTransfer => self.transfer,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}
