use super::types::{RatePeriod, RatePlan, round_cents};

pub fn fixed_monthly_payment(principal: f64, annual_rate: f64, years: u32) -> f64 {
    monthly_payment_over(principal, annual_rate, years * 12)
}

pub fn monthly_payment_over(principal: f64, annual_rate: f64, months: u32) -> f64 {
    if months == 0 {
        return round_cents(principal.max(0.0));
    }
    let n = months as f64;
    let i = annual_rate / 1200.0;
    if i == 0.0 {
        return round_cents(principal / n);
    }
    let growth = (1.0 + i).powf(n);
    round_cents(principal * i * growth / (growth - 1.0))
}

pub fn monthly_interest(balance: f64, annual_rate: f64) -> f64 {
    round_cents(balance * annual_rate / 1200.0)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PaymentSplit {
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub balance: f64,
}

/// Applies one month's payment. On the final month the whole remaining balance
/// is retired so cent rounding in the payment never leaves a residual.
pub fn split_payment(balance: f64, annual_rate: f64, payment: f64, final_month: bool) -> PaymentSplit {
    let interest = monthly_interest(balance, annual_rate);
    let mut principal = payment - interest;
    if final_month || principal > balance {
        principal = balance;
    }
    let remaining = (balance - principal).max(0.0);
    PaymentSplit {
        payment: interest + principal,
        interest,
        principal,
        balance: remaining,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct RateWindow {
    first_month: u32,
    last_month: u32,
    annual_rate: f64,
}

#[derive(Clone, Debug)]
pub struct RateSchedule {
    windows: Vec<RateWindow>,
}

impl RateSchedule {
    pub fn new(plan: &RatePlan, amortization_years: u32) -> Self {
        let periods = match plan {
            RatePlan::Fixed { annual_rate } => vec![RatePeriod {
                term_years: amortization_years,
                annual_rate: *annual_rate,
            }],
            RatePlan::Variable { periods } => periods.clone(),
        };

        let mut windows = Vec::with_capacity(periods.len());
        let mut first_month = 1;
        for period in periods {
            let months = period.term_years * 12;
            if months == 0 {
                continue;
            }
            windows.push(RateWindow {
                first_month,
                last_month: first_month + months - 1,
                annual_rate: period.annual_rate,
            });
            first_month += months;
        }
        Self { windows }
    }

    pub fn rate_for_month(&self, month: u32) -> f64 {
        self.windows
            .iter()
            .find(|w| (w.first_month..=w.last_month).contains(&month))
            .or(self.windows.last())
            .map_or(0.0, |w| w.annual_rate)
    }

    pub fn starts_new_term(&self, month: u32) -> bool {
        month == 1 || self.windows.iter().any(|w| w.first_month == month)
    }
}
