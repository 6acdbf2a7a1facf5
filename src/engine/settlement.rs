//! Per-category settlement: folds every income source into the final amount.

use crate::domain::{apply_period_result, Decimal};

/// Everything that feeds one category's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInputs {
    pub start_balance: Decimal,
    pub profit: Decimal,
    pub delta: Decimal,
    pub tests: Decimal,
    pub percent: Decimal,
    /// `None` for users that are not leads.
    pub override_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Amount before the lead override is added.
    pub payable: Decimal,
    /// Final amount including the override.
    pub amount: Decimal,
    pub calculation: String,
    /// Balance to store when the run commits.
    pub carried_balance: Decimal,
}

/// Sum the sources, apply the tier percent when the sum is positive, then add
/// the override.
pub fn settle(inputs: &CategoryInputs) -> Settlement {
    let sum = inputs.start_balance + inputs.profit + inputs.delta + inputs.tests;

    let terms = format!(
        "{}{} + {} + {}",
        inputs.start_balance.to_audit_string(),
        signed_term(inputs.profit),
        inputs.delta.to_audit_string(),
        inputs.tests.to_audit_string(),
    );

    let (payable, mut calculation) = if sum.is_positive() {
        (
            (sum * inputs.percent).round_money(),
            format!("({}) * {}", terms, inputs.percent.to_canonical_string()),
        )
    } else {
        (sum.round_money(), terms)
    };

    let override_amount = inputs.override_amount.unwrap_or_default();
    if override_amount.is_positive() {
        calculation.push_str(&format!(" + {}", override_amount.to_audit_string()));
    }

    let amount = (payable + override_amount).round_money();
    calculation.push_str(&format!(" = {}", amount.to_audit_string()));

    Settlement {
        payable,
        amount,
        calculation,
        carried_balance: apply_period_result(payable),
    }
}

fn signed_term(value: Decimal) -> String {
    if value.is_negative() {
        format!(" - {}", value.abs().to_audit_string())
    } else {
        format!(" + {}", value.to_audit_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn inputs(start: &str, profit: &str) -> CategoryInputs {
        CategoryInputs {
            start_balance: d(start),
            profit: d(profit),
            delta: Decimal::zero(),
            tests: Decimal::zero(),
            percent: d("0.55"),
            override_amount: None,
        }
    }

    #[test]
    fn test_positive_sum_is_multiplied() {
        let s = settle(&inputs("-20", "50"));
        assert_eq!(s.amount, d("16.5"));
        assert_eq!(s.calculation, "(-20.0 + 50.0 + 0.0 + 0.0) * 0.55 = 16.5");
        assert_eq!(s.carried_balance, Decimal::zero());
    }

    #[test]
    fn test_non_positive_sum_is_carried() {
        let s = settle(&inputs("-20", "-30"));
        assert_eq!(s.amount, d("-50"));
        assert_eq!(s.calculation, "-20.0 - 30.0 + 0.0 + 0.0 = -50.0");
        assert_eq!(s.carried_balance, d("-50"));
    }

    #[test]
    fn test_override_added_after_percent() {
        let mut i = inputs("0", "100");
        i.override_amount = Some(d("50"));
        let s = settle(&i);
        assert_eq!(s.payable, d("55"));
        assert_eq!(s.amount, d("105"));
        assert_eq!(s.calculation, "(0.0 + 100.0 + 0.0 + 0.0) * 0.55 + 50.0 = 105.0");
    }

    #[test]
    fn test_override_does_not_clear_deficit_on_carry() {
        let mut i = inputs("-100", "0");
        i.override_amount = Some(d("30"));
        let s = settle(&i);
        assert_eq!(s.amount, d("-70"));
        assert_eq!(s.carried_balance, d("-100"));
    }

    #[test]
    fn test_zero_override_is_not_rendered() {
        let mut i = inputs("0", "10");
        i.override_amount = Some(Decimal::zero());
        let s = settle(&i);
        assert_eq!(s.calculation, "(0.0 + 10.0 + 0.0 + 0.0) * 0.55 = 5.5");
    }
}
