use super::error::ConfigError;
use super::types::{ParameterRecord, RatePlan, Residence};

pub const MAX_AMORTIZATION_YEARS: u32 = 30;
pub const MAX_ANNUAL_RATE: f64 = 20.0;

pub(crate) struct Violations(Vec<String>);

impl Violations {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub(crate) fn range(&mut self, name: &str, value: f64, min: f64, max: f64) {
        if !value.is_finite() || value < min || value > max {
            self.0.push(format!("{name} must be between {min} and {max}"));
        }
    }

    pub(crate) fn positive_up_to(&mut self, name: &str, value: f64, max: f64) {
        if !value.is_finite() || value <= 0.0 || value > max {
            self.0.push(format!("{name} must be > 0 and <= {max}"));
        }
    }

    pub(crate) fn push(&mut self, msg: String) {
        self.0.push(msg);
    }
}

pub fn collect_violations(record: &ParameterRecord) -> Vec<String> {
    let mut v = Violations::new();
    let price = record.property_price;

    v.range("property_price", price, 50_000.0, 50_000_000.0);
    v.range("down_payment_percent", record.down_payment_percent, 5.0, 75.0);
    v.range(
        "additional_financed_costs",
        record.additional_financed_costs,
        0.0,
        (price * 2.0).max(0.0),
    );
    v.positive_up_to("appreciation_percent", record.appreciation_percent, 10.0);

    if record.amortization_years == 0 || record.amortization_years > MAX_AMORTIZATION_YEARS {
        v.push(format!(
            "amortization_years must be between 1 and {MAX_AMORTIZATION_YEARS}"
        ));
    }

    match &record.rate_plan {
        RatePlan::Fixed { annual_rate } => {
            v.positive_up_to("annual_rate", *annual_rate, MAX_ANNUAL_RATE);
        }
        RatePlan::Variable { periods } => {
            if periods.is_empty() {
                v.push("variable rate plan needs at least one rate period".to_string());
            }
            for (idx, period) in periods.iter().enumerate() {
                let n = idx + 1;
                if period.term_years == 0 || period.term_years > record.amortization_years {
                    v.push(format!(
                        "rate period {n} term_years must be between 1 and {}",
                        record.amortization_years
                    ));
                }
                v.positive_up_to(
                    &format!("rate period {n} annual_rate"),
                    period.annual_rate,
                    MAX_ANNUAL_RATE,
                );
            }
            let covered: u32 = periods.iter().map(|p| p.term_years).sum();
            if !periods.is_empty() && covered != record.amortization_years {
                v.push(format!(
                    "rate periods cover {covered} years but amortization_years is {}",
                    record.amortization_years
                ));
            }
        }
    }

    v.range("property_tax_annual", record.property_tax_annual, 0.0, 50_000.0);
    v.range(
        "property_tax_increase_percent",
        record.property_tax_increase_percent,
        0.0,
        10.0,
    );
    v.range("monthly_maintenance", record.monthly_maintenance, 100.0, 5_000.0);
    v.range("land_transfer_tax", record.land_transfer_tax, 0.0, 50_000.0);
    v.range("agent_fee_percent", record.agent_fee_percent, 0.0, 10.0);
    v.range("legal_fees", record.legal_fees, 0.0, 100_000.0);
    let loan = price * (1.0 - record.down_payment_percent / 100.0);
    v.range("early_break_fee", record.early_break_fee, 0.0, (0.5 * loan).max(0.0));
    v.range(
        "opportunity_return_monthly_percent",
        record.opportunity_return_monthly_percent,
        0.0,
        5.0,
    );

    if let Residence::Primary {
        monthly_extra_expenses,
    } = record.residence
    {
        v.range("monthly_extra_expenses", monthly_extra_expenses, -2_500.0, 2_500.0);
    }

    if let Some(condo) = &record.condo {
        v.range("condo.monthly_fee", condo.monthly_fee, 100.0, 3_500.0);
        v.positive_up_to("condo.annual_increase_percent", condo.annual_increase_percent, 10.0);
    }

    if let Some(rent) = &record.prior_rent {
        v.range("prior_rent.monthly_rent", rent.monthly_rent, 200.0, 5_000.0);
        v.positive_up_to(
            "prior_rent.annual_increase_percent",
            rent.annual_increase_percent,
            20.0,
        );
    }

    if let Some(rental) = &record.rental {
        if !(rental.monthly_rent > 500.0 && rental.monthly_rent < 50_000.0) {
            v.push("rental.monthly_rent must be between 500 and 50000 (exclusive)".to_string());
        }
        v.range("rental.occupancy_percent", rental.occupancy_percent, 50.0, 95.0);
        v.positive_up_to(
            "rental.annual_increase_percent",
            rental.annual_increase_percent,
            20.0,
        );
        if let Some(fee) = rental.management_fee_percent {
            v.range("rental.management_fee_percent", fee, 1.0, 20.0);
        }
        v.range(
            "rental.utilities_not_covered",
            rental.utilities_not_covered,
            0.0,
            2_500.0,
        );
    }

    if let Some(help) = &record.assistance {
        v.range("assistance.monthly_amount", help.monthly_amount, 50.0, 20_000.0);
    }

    if let Some(gains) = &record.capital_gains {
        if !(gains.tax_percent > 0.0 && gains.tax_percent < 100.0) {
            v.push("capital_gains.tax_percent must be > 0 and < 100".to_string());
        }
        v.positive_up_to("capital_gains.inclusion_factor", gains.inclusion_factor, 1.0);
    }

    if let Some(insurance) = &record.insurance {
        v.range(
            "insurance.mortgage_monthly",
            insurance.mortgage_monthly,
            0.0,
            100_000.0,
        );
        v.range(
            "insurance.property_monthly",
            insurance.property_monthly,
            0.0,
            5_000.0,
        );
        v.range(
            "insurance.property_annual_increase_percent",
            insurance.property_annual_increase_percent,
            0.0,
            10.0,
        );
    }

    if let Some(renovation) = &record.renovation {
        v.range("renovation.cost", renovation.cost, 1.0, (5.0 * price).max(1.0));
        v.range(
            "renovation.value_change",
            renovation.value_change,
            -500_000.0,
            2_000_000.0,
        );
        if price + renovation.value_change <= 0.0 {
            v.push("renovation.value_change must leave a positive property value".to_string());
        }
    }

    if record.occupancy_delay_months > 60 {
        v.push("occupancy_delay_months must be between 0 and 60".to_string());
    }

    v.into_vec()
}

pub fn validate(record: &ParameterRecord) -> Result<(), ConfigError> {
    ConfigError::check(collect_violations(record))
}
