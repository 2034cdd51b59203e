use super::types::{ParameterRecord, RatePlan, Residence};

pub(crate) fn sample_record() -> ParameterRecord {
    ParameterRecord {
        property_price: 500_000.0,
        down_payment_percent: 20.0,
        additional_financed_costs: 0.0,
        amortization_years: 25,
        rate_plan: RatePlan::Fixed { annual_rate: 5.0 },
        appreciation_percent: 3.0,
        property_tax_annual: 5_000.0,
        property_tax_increase_percent: 2.0,
        monthly_maintenance: 300.0,
        land_transfer_tax: 5_000.0,
        agent_fee_percent: 5.0,
        legal_fees: 2_000.0,
        early_break_fee: 3_000.0,
        opportunity_return_monthly_percent: 0.57,
        residence: Residence::Primary {
            monthly_extra_expenses: 150.0,
        },
        condo: None,
        capital_gains: None,
        prior_rent: None,
        rental: None,
        assistance: None,
        insurance: None,
        renovation: None,
        occupancy_delay_months: 0,
    }
}
