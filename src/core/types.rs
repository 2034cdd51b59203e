use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePeriod {
    pub term_years: u32,
    pub annual_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RatePlan {
    Fixed {
        #[serde(rename = "annualRate")]
        annual_rate: f64,
    },
    Variable {
        periods: Vec<RatePeriod>,
    },
}

impl RatePlan {
    pub fn headline_rate(&self) -> f64 {
        match self {
            RatePlan::Fixed { annual_rate } => *annual_rate,
            RatePlan::Variable { periods } => periods.first().map_or(0.0, |p| p.annual_rate),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, RatePlan::Variable { .. })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Residence {
    Primary {
        #[serde(rename = "monthlyExtraExpenses")]
        monthly_extra_expenses: f64,
    },
    Investment,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CondoFees {
    pub monthly_fee: f64,
    pub annual_increase_percent: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalGains {
    pub tax_percent: f64,
    pub inclusion_factor: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorRent {
    pub monthly_rent: f64,
    pub annual_increase_percent: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalIncome {
    pub monthly_rent: f64,
    pub annual_increase_percent: f64,
    pub occupancy_percent: f64,
    pub management_fee_percent: Option<f64>,
    pub utilities_not_covered: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assistance {
    pub monthly_amount: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insurance {
    pub mortgage_monthly: f64,
    pub property_monthly: f64,
    pub property_annual_increase_percent: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Renovation {
    pub cost: f64,
    pub value_change: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    pub property_price: f64,
    pub down_payment_percent: f64,
    pub additional_financed_costs: f64,
    pub amortization_years: u32,
    pub rate_plan: RatePlan,
    pub appreciation_percent: f64,
    pub property_tax_annual: f64,
    pub property_tax_increase_percent: f64,
    pub monthly_maintenance: f64,
    pub land_transfer_tax: f64,
    pub agent_fee_percent: f64,
    pub legal_fees: f64,
    pub early_break_fee: f64,
    pub opportunity_return_monthly_percent: f64,
    pub residence: Residence,
    pub condo: Option<CondoFees>,
    pub capital_gains: Option<CapitalGains>,
    pub prior_rent: Option<PriorRent>,
    pub rental: Option<RentalIncome>,
    pub assistance: Option<Assistance>,
    pub insurance: Option<Insurance>,
    pub renovation: Option<Renovation>,
    pub occupancy_delay_months: u32,
}

impl ParameterRecord {
    pub fn down_payment(&self) -> f64 {
        self.property_price * self.down_payment_percent / 100.0
    }

    pub fn loan_principal(&self) -> f64 {
        self.property_price - self.down_payment() + self.additional_financed_costs
    }

    pub fn total_months(&self) -> u32 {
        self.amortization_years * 12
    }

    /// `$price_rate%_yearsyears`; variable plans list each period's rate joined by `-`.
    pub fn sheet_name(&self) -> String {
        let rate = match &self.rate_plan {
            RatePlan::Fixed { annual_rate } => annual_rate.to_string(),
            RatePlan::Variable { periods } => periods
                .iter()
                .map(|p| p.annual_rate.to_string())
                .collect::<Vec<_>>()
                .join("-"),
        };
        format!(
            "${}_{}%_{}years",
            self.property_price, rate, self.amortization_years
        )
    }

    pub fn applicable_scenarios(&self) -> Vec<ProfitScenario> {
        ProfitScenario::ALL
            .into_iter()
            .filter(|s| s.applies_to(self))
            .collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfitScenario {
    Base,
    RentSaved,
    Assistance,
    RentSavedAssistance,
    RentalIncome,
    RentalIncomeAssistance,
}

impl ProfitScenario {
    pub const ALL: [ProfitScenario; 6] = [
        ProfitScenario::Base,
        ProfitScenario::RentSaved,
        ProfitScenario::Assistance,
        ProfitScenario::RentSavedAssistance,
        ProfitScenario::RentalIncome,
        ProfitScenario::RentalIncomeAssistance,
    ];

    pub fn applies_to(self, record: &ParameterRecord) -> bool {
        let rent = record.prior_rent.is_some();
        let help = record.assistance.is_some();
        let rental = record.rental.is_some();
        match self {
            ProfitScenario::Base => true,
            ProfitScenario::RentSaved => rent,
            ProfitScenario::Assistance => help,
            ProfitScenario::RentSavedAssistance => rent && help,
            ProfitScenario::RentalIncome => rental,
            ProfitScenario::RentalIncomeAssistance => rental && help,
        }
    }

    pub fn column_name(self) -> &'static str {
        match self {
            ProfitScenario::Base => "Profit",
            ProfitScenario::RentSaved => "Profit if Saving Rent",
            ProfitScenario::Assistance => "Profit with Help",
            ProfitScenario::RentSavedAssistance => "Profit with Rent Saved&Help",
            ProfitScenario::RentalIncome => "Profit with Rental Income",
            ProfitScenario::RentalIncomeAssistance => "Profit with Rental Income&Help",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioProfits {
    pub base: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_saved: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_saved_assistance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental_income_assistance: Option<f64>,
}

impl ScenarioProfits {
    pub fn get(&self, scenario: ProfitScenario) -> Option<f64> {
        match scenario {
            ProfitScenario::Base => Some(self.base),
            ProfitScenario::RentSaved => self.rent_saved,
            ProfitScenario::Assistance => self.assistance,
            ProfitScenario::RentSavedAssistance => self.rent_saved_assistance,
            ProfitScenario::RentalIncome => self.rental_income,
            ProfitScenario::RentalIncomeAssistance => self.rental_income_assistance,
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            base: f(self.base),
            rent_saved: self.rent_saved.map(&f),
            assistance: self.assistance.map(&f),
            rent_saved_assistance: self.rent_saved_assistance.map(&f),
            rental_income: self.rental_income.map(&f),
            rental_income_assistance: self.rental_income_assistance.map(&f),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySnapshot {
    pub month: u32,
    pub annual_rate: f64,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub balance: f64,
    pub property_value: f64,
    pub capital_gains_tax: f64,

    pub monthly_property_tax: f64,
    pub monthly_rent: f64,
    pub monthly_rental_income: f64,
    pub monthly_condo_fee: f64,

    pub total_interest: f64,
    pub total_property_tax: f64,
    pub total_maintenance: f64,
    pub total_condo_fees: f64,
    pub total_extra_expenses: f64,
    pub total_insurance: f64,
    pub opportunity_cost: f64,
    pub total_rent_saved: f64,
    pub total_rental_income: f64,
    pub total_management_fees: f64,
    pub total_utilities_shortfall: f64,
    pub total_assistance: f64,

    pub profits: ScenarioProfits,
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl MonthlySnapshot {
    pub fn rounded(&self) -> Self {
        Self {
            month: self.month,
            annual_rate: self.annual_rate,
            payment: round_cents(self.payment),
            interest: round_cents(self.interest),
            principal: round_cents(self.principal),
            balance: round_cents(self.balance),
            property_value: round_cents(self.property_value),
            capital_gains_tax: round_cents(self.capital_gains_tax),
            monthly_property_tax: round_cents(self.monthly_property_tax),
            monthly_rent: round_cents(self.monthly_rent),
            monthly_rental_income: round_cents(self.monthly_rental_income),
            monthly_condo_fee: round_cents(self.monthly_condo_fee),
            total_interest: round_cents(self.total_interest),
            total_property_tax: round_cents(self.total_property_tax),
            total_maintenance: round_cents(self.total_maintenance),
            total_condo_fees: round_cents(self.total_condo_fees),
            total_extra_expenses: round_cents(self.total_extra_expenses),
            total_insurance: round_cents(self.total_insurance),
            opportunity_cost: round_cents(self.opportunity_cost),
            total_rent_saved: round_cents(self.total_rent_saved),
            total_rental_income: round_cents(self.total_rental_income),
            total_management_fees: round_cents(self.total_management_fees),
            total_utilities_shortfall: round_cents(self.total_utilities_shortfall),
            total_assistance: round_cents(self.total_assistance),
            profits: self.profits.map(round_cents),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakevenEvent {
    pub scenario: ProfitScenario,
    pub month: u32,
}

impl BreakevenEvent {
    /// Narrative for the event, quoting the rent and help amounts from `record`.
    pub fn message(&self, record: &ParameterRecord) -> String {
        let rent = record.prior_rent.map_or(0.0, |r| r.monthly_rent);
        let help = record.assistance.map_or(0.0, |a| a.monthly_amount);
        let rental = record.rental.map_or(0.0, |r| r.monthly_rent);
        let lead = match self.scenario {
            ProfitScenario::Base => "With no help, rental income, or rent saved".to_string(),
            ProfitScenario::RentSaved => {
                format!("Saving ${rent:.2}/month from your previous rental")
            }
            ProfitScenario::Assistance => format!("With ${help:.2} in help/month"),
            ProfitScenario::RentSavedAssistance => format!(
                "Saving ${rent:.2}/month from your previous rental and getting ${help:.2} in help/month"
            ),
            ProfitScenario::RentalIncome => {
                format!("Renting your new property at ${rental:.2}/month")
            }
            ProfitScenario::RentalIncomeAssistance => format!(
                "Renting your new property at ${rental:.2}/month and getting ${help:.2} in help/month"
            ),
        };
        format!("{lead}, you are profitable after {} months", self.month)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CashFlowAssessment {
    #[serde(rename_all = "camelCase")]
    PositiveFrom { month: u32, monthly_cash_flow: f64 },
    #[serde(rename_all = "camelCase")]
    NeverPositive { first_month_cash_flow: f64 },
}

impl fmt::Display for CashFlowAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CashFlowAssessment::PositiveFrom {
                month,
                monthly_cash_flow,
            } => write!(
                f,
                "The property is cash flowing with a monthly cash flow of ${monthly_cash_flow:.2} in month {month}"
            ),
            CashFlowAssessment::NeverPositive {
                first_month_cash_flow,
            } => write!(
                f,
                "The property is not cash flowing, with an initial monthly loss of ${:.2}",
                -first_month_cash_flow
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub initial_payment: f64,
    pub months: Vec<MonthlySnapshot>,
    pub breakevens: Vec<BreakevenEvent>,
    pub cash_flow: Option<CashFlowAssessment>,
}

impl ScheduleResult {
    pub fn breakeven_month(&self, scenario: ProfitScenario) -> Option<u32> {
        self.breakevens
            .iter()
            .find(|e| e.scenario == scenario)
            .map(|e| e.month)
    }

    pub fn final_month(&self) -> Option<&MonthlySnapshot> {
        self.months.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::sample_record;

    #[test]
    fn sheet_name_follows_price_rate_years_pattern() {
        let mut record = sample_record();
        assert_eq!(record.sheet_name(), "$500000_5%_25years");

        record.rate_plan = RatePlan::Variable {
            periods: vec![
                RatePeriod {
                    term_years: 5,
                    annual_rate: 4.5,
                },
                RatePeriod {
                    term_years: 20,
                    annual_rate: 6.0,
                },
            ],
        };
        assert_eq!(record.sheet_name(), "$500000_4.5-6%_25years");
        assert_eq!(record.rate_plan.headline_rate(), 4.5);
    }

    #[test]
    fn loan_principal_includes_additional_financed_costs() {
        let mut record = sample_record();
        assert_eq!(record.down_payment(), 100_000.0);
        assert_eq!(record.loan_principal(), 400_000.0);
        record.additional_financed_costs = 12_000.0;
        assert_eq!(record.loan_principal(), 412_000.0);
        assert_eq!(record.total_months(), 300);
    }

    #[test]
    fn record_round_trips_through_camel_case_json() {
        let mut record = sample_record();
        record.rental = Some(RentalIncome {
            monthly_rent: 2_000.0,
            annual_increase_percent: 2.0,
            occupancy_percent: 90.0,
            management_fee_percent: None,
            utilities_not_covered: 0.0,
        });
        let json = serde_json::to_value(&record).expect("serializable");
        assert_eq!(json["propertyPrice"], 500_000.0);
        assert_eq!(json["ratePlan"]["kind"], "fixed");
        assert_eq!(json["ratePlan"]["annualRate"], 5.0);
        assert_eq!(json["residence"]["kind"], "primary");
        assert_eq!(json["rental"]["occupancyPercent"], 90.0);

        let back: ParameterRecord = serde_json::from_value(json).expect("deserializable");
        assert_eq!(back, record);
    }

    #[test]
    fn scenarios_follow_optional_inputs() {
        let mut record = sample_record();
        assert_eq!(record.applicable_scenarios(), vec![ProfitScenario::Base]);

        record.assistance = Some(Assistance {
            monthly_amount: 100.0,
        });
        record.rental = Some(RentalIncome {
            monthly_rent: 2_000.0,
            annual_increase_percent: 2.0,
            occupancy_percent: 90.0,
            management_fee_percent: None,
            utilities_not_covered: 0.0,
        });
        assert_eq!(
            record.applicable_scenarios(),
            vec![
                ProfitScenario::Base,
                ProfitScenario::Assistance,
                ProfitScenario::RentalIncome,
                ProfitScenario::RentalIncomeAssistance,
            ]
        );
    }

    #[test]
    fn breakeven_and_cash_flow_messages() {
        let mut record = sample_record();
        record.prior_rent = Some(PriorRent {
            monthly_rent: 1_450.0,
            annual_increase_percent: 2.0,
        });
        record.assistance = Some(Assistance {
            monthly_amount: 300.0,
        });
        let event = BreakevenEvent {
            scenario: ProfitScenario::Base,
            month: 42,
        };
        assert!(event.message(&record).ends_with("you are profitable after 42 months"));

        let both = BreakevenEvent {
            scenario: ProfitScenario::RentSavedAssistance,
            month: 7,
        };
        assert_eq!(
            both.message(&record),
            "Saving $1450.00/month from your previous rental and getting $300.00 in help/month, you are profitable after 7 months"
        );
        let help = BreakevenEvent {
            scenario: ProfitScenario::Assistance,
            month: 9,
        };
        assert!(help.message(&record).starts_with("With $300.00 in help/month,"));

        let loss = CashFlowAssessment::NeverPositive {
            first_month_cash_flow: -812.5,
        };
        assert!(loss.to_string().contains("$812.50"));

        let json = serde_json::to_value(CashFlowAssessment::PositiveFrom {
            month: 3,
            monthly_cash_flow: 10.0,
        })
        .expect("serializable");
        assert_eq!(json["status"], "positive-from");
        assert_eq!(json["monthlyCashFlow"], 10.0);
    }

    #[test]
    fn rounding_leaves_whole_cents() {
        assert_eq!(round_cents(2338.3601), 2338.36);
        assert_eq!(round_cents(-0.005_000_1), -0.01);
        let profits = ScenarioProfits {
            base: 1.234,
            rent_saved: Some(5.678),
            ..ScenarioProfits::default()
        };
        let rounded = profits.map(round_cents);
        assert_eq!(rounded.base, 1.23);
        assert_eq!(rounded.rent_saved, Some(5.68));
        assert_eq!(rounded.assistance, None);
    }
}
