//! Human-auditable breakdowns of calculated amounts.
//!
//! Totals are computed from the ordered term list first; the audit string is
//! rendered from the same terms afterwards.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};

/// One contributing amount and the thing it came from (campaign id, login, period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTerm {
    pub amount: Decimal,
    pub label: String,
}

/// Ordered list of contributing terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    terms: Vec<AuditTerm>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, amount: Decimal, label: impl Into<String>) {
        self.terms.push(AuditTerm {
            amount: amount.round_money(),
            label: label.into(),
        });
    }

    pub fn terms(&self) -> &[AuditTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.terms
            .iter()
            .map(|t| t.amount)
            .sum::<Decimal>()
            .round_money()
    }

    /// `"<a> [<l1>] + <b> [<l2>] = <total>"`; a single term has no `= total`
    /// suffix and a zero total renders as `"0.0"`.
    pub fn render(&self) -> String {
        let total = self.total();
        if total.is_zero() {
            return Decimal::zero().to_audit_string();
        }

        let joined = self
            .terms
            .iter()
            .map(|t| format!("{} [{}]", t.amount.to_audit_string(), t.label))
            .collect::<Vec<_>>()
            .join(" + ");

        if self.terms.len() > 1 {
            format!("{} = {}", joined, total.to_audit_string())
        } else {
            joined
        }
    }

    pub fn to_audited(&self) -> AuditedAmount {
        AuditedAmount {
            amount: self.total(),
            calculation: self.render(),
        }
    }
}

/// A numeric total together with the expression that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedAmount {
    pub amount: Decimal,
    pub calculation: String,
}

impl AuditedAmount {
    pub fn zero() -> Self {
        AuditTrail::new().to_audited()
    }
}
