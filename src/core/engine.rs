use super::amortization::{RateSchedule, monthly_payment_over, split_payment};
use super::error::ConfigError;
use super::observer::{NoopObserver, SimulationObserver};
use super::types::{
    BreakevenEvent, CashFlowAssessment, MonthlySnapshot, ParameterRecord, ProfitScenario,
    Residence, ScenarioProfits, ScheduleResult,
};
use super::validation::validate;

#[derive(Debug, Clone, Copy)]
struct MonthlyFactors {
    appreciation: f64,
    opportunity: f64,
    property_tax_step: f64,
    rent_step: f64,
    rental_step: f64,
    condo_step: f64,
    insurance_step: f64,
    agent_keep: f64,
    occupancy: f64,
    management_share: f64,
}

fn step_factor(annual_percent: f64) -> f64 {
    1.0 + annual_percent / 100.0
}

impl MonthlyFactors {
    fn from_record(record: &ParameterRecord) -> Self {
        let rental = record.rental.as_ref();
        Self {
            appreciation: step_factor(record.appreciation_percent).powf(1.0 / 12.0),
            opportunity: step_factor(record.opportunity_return_monthly_percent),
            property_tax_step: step_factor(record.property_tax_increase_percent),
            rent_step: record
                .prior_rent
                .map_or(1.0, |r| step_factor(r.annual_increase_percent)),
            rental_step: rental.map_or(1.0, |r| step_factor(r.annual_increase_percent)),
            condo_step: record
                .condo
                .map_or(1.0, |c| step_factor(c.annual_increase_percent)),
            insurance_step: record
                .insurance
                .map_or(1.0, |i| step_factor(i.property_annual_increase_percent)),
            agent_keep: 1.0 - record.agent_fee_percent / 100.0,
            occupancy: rental.map_or(0.0, |r| r.occupancy_percent / 100.0),
            management_share: rental
                .and_then(|r| r.management_fee_percent)
                .map_or(0.0, |pct| pct / 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Escalators {
    property_tax_annual: f64,
    rent: f64,
    rental_income: f64,
    condo_fee: f64,
    property_insurance: f64,
}

impl Escalators {
    fn from_record(record: &ParameterRecord) -> Self {
        Self {
            property_tax_annual: record.property_tax_annual,
            rent: record.prior_rent.map_or(0.0, |r| r.monthly_rent),
            rental_income: record.rental.map_or(0.0, |r| r.monthly_rent),
            condo_fee: record.condo.map_or(0.0, |c| c.monthly_fee),
            property_insurance: record.insurance.map_or(0.0, |i| i.property_monthly),
        }
    }

    fn step(&mut self, factors: &MonthlyFactors) {
        self.property_tax_annual *= factors.property_tax_step;
        self.rent *= factors.rent_step;
        self.rental_income *= factors.rental_step;
        self.condo_fee *= factors.condo_step;
        self.property_insurance *= factors.insurance_step;
    }

    fn monthly_property_tax(&self) -> f64 {
        self.property_tax_annual / 12.0
    }

    fn management_fee(&self, factors: &MonthlyFactors) -> f64 {
        self.rental_income * factors.management_share
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    interest: f64,
    property_tax: f64,
    maintenance: f64,
    condo_fees: f64,
    extra_expenses: f64,
    insurance: f64,
    rent_saved: f64,
    rental_income: f64,
    management_fees: f64,
    utilities_shortfall: f64,
    assistance: f64,
}

/// Records the first month each scenario turns profitable. Later dips and
/// recoveries are ignored.
#[derive(Debug, Default, Clone)]
pub struct BreakevenTracker {
    recorded: Vec<ProfitScenario>,
}

impl BreakevenTracker {
    pub fn observe(
        &mut self,
        scenario: ProfitScenario,
        month: u32,
        profit: f64,
    ) -> Option<BreakevenEvent> {
        if profit > 0.0 && !self.recorded.contains(&scenario) {
            self.recorded.push(scenario);
            return Some(BreakevenEvent { scenario, month });
        }
        None
    }
}

pub fn first_breakeven(profits: &[f64]) -> Option<u32> {
    let mut tracker = BreakevenTracker::default();
    profits.iter().enumerate().find_map(|(idx, &profit)| {
        tracker
            .observe(ProfitScenario::Base, idx as u32 + 1, profit)
            .map(|event| event.month)
    })
}

#[derive(Debug, Clone, Copy)]
struct CashFlowTracker {
    first_month: Option<f64>,
    positive: Option<(u32, f64)>,
}

impl CashFlowTracker {
    fn observe(&mut self, month: u32, cash_flow: f64) {
        if self.positive.is_some() {
            return;
        }
        if self.first_month.is_none() {
            self.first_month = Some(cash_flow);
        }
        if cash_flow > 0.0 {
            self.positive = Some((month, cash_flow));
        }
    }

    fn assessment(self) -> Option<CashFlowAssessment> {
        match (self.positive, self.first_month) {
            (Some((month, monthly_cash_flow)), _) => Some(CashFlowAssessment::PositiveFrom {
                month,
                monthly_cash_flow,
            }),
            (None, Some(first_month_cash_flow)) => Some(CashFlowAssessment::NeverPositive {
                first_month_cash_flow,
            }),
            (None, None) => None,
        }
    }
}

pub fn run_schedule(record: &ParameterRecord) -> Result<ScheduleResult, ConfigError> {
    run_schedule_observed(record, &mut NoopObserver)
}

pub fn run_schedule_observed(
    record: &ParameterRecord,
    observer: &mut dyn SimulationObserver,
) -> Result<ScheduleResult, ConfigError> {
    validate(record)?;
    Ok(simulate(record, observer))
}

fn scenario_profits(
    record: &ParameterRecord,
    base: f64,
    totals: &Totals,
    factors: &MonthlyFactors,
) -> ScenarioProfits {
    let rent = record.prior_rent.map(|_| totals.rent_saved);
    let help = record.assistance.map(|_| totals.assistance);
    let rental = record
        .rental
        .map(|_| totals.rental_income * factors.occupancy - totals.management_fees);

    ScenarioProfits {
        base,
        rent_saved: rent.map(|r| base + r),
        assistance: help.map(|h| base + h),
        rent_saved_assistance: rent.zip(help).map(|(r, h)| base + r + h),
        rental_income: rental.map(|net| base + net),
        rental_income_assistance: rental.zip(help).map(|(net, h)| base + net + h),
    }
}

fn simulate(record: &ParameterRecord, observer: &mut dyn SimulationObserver) -> ScheduleResult {
    let factors = MonthlyFactors::from_record(record);
    let rates = RateSchedule::new(&record.rate_plan, record.amortization_years);
    let total_months = record.total_months();
    let scenarios = record.applicable_scenarios();

    let down_payment = record.down_payment();
    let mut balance = record.loan_principal();
    let mut opportunity = down_payment;
    let mut property_value =
        record.property_price + record.renovation.map_or(0.0, |r| r.value_change);
    let upfront_costs = record.land_transfer_tax
        + record.legal_fees
        + record.renovation.map_or(0.0, |r| r.cost);

    let extra_expenses = match record.residence {
        Residence::Primary {
            monthly_extra_expenses,
        } => monthly_extra_expenses,
        Residence::Investment => 0.0,
    };
    let utilities_shortfall = record.rental.map_or(0.0, |r| r.utilities_not_covered);
    let mortgage_insurance = record.insurance.map_or(0.0, |i| i.mortgage_monthly);
    let assistance = record.assistance.map_or(0.0, |a| a.monthly_amount);
    let tracks_cash_flow =
        matches!(record.residence, Residence::Investment) && record.rental.is_some();

    let mut bases = Escalators::from_record(record);
    let mut totals = Totals::default();
    let mut tracker = BreakevenTracker::default();
    let mut cash_flow = CashFlowTracker {
        first_month: None,
        positive: None,
    };

    let mut rate = 0.0;
    let mut payment = 0.0;
    let mut initial_payment = 0.0;
    let mut months = Vec::with_capacity(total_months as usize);
    let mut breakevens = Vec::new();

    for month in 1..=total_months {
        if month % 12 == 0 {
            bases.step(&factors);
            observer.annual_escalation(month);
        }

        if rates.starts_new_term(month) {
            rate = rates.rate_for_month(month);
            payment = monthly_payment_over(balance, rate, total_months - month + 1);
            if month == 1 {
                initial_payment = payment;
            }
            observer.payment_reset(month, rate, payment);
        }

        opportunity *= factors.opportunity;
        let split = split_payment(balance, rate, payment, month == total_months);
        balance = split.balance;

        let management_fee = bases.management_fee(&factors);
        totals.interest += split.interest;
        totals.property_tax += bases.monthly_property_tax();
        totals.maintenance += record.monthly_maintenance;
        totals.condo_fees += bases.condo_fee;
        totals.extra_expenses += extra_expenses;
        totals.insurance += mortgage_insurance + bases.property_insurance;
        totals.assistance += assistance;

        let occupied = month > record.occupancy_delay_months;
        if occupied {
            totals.rent_saved += bases.rent;
            totals.rental_income += bases.rental_income;
            totals.management_fees += management_fee;
            totals.utilities_shortfall += utilities_shortfall;
        }

        property_value *= factors.appreciation;
        let capital_gains_tax = record.capital_gains.map_or(0.0, |gains| {
            (property_value - record.property_price).max(0.0)
                * gains.inclusion_factor
                * (gains.tax_percent / 100.0)
        });

        let mut base = property_value * factors.agent_keep
            - upfront_costs
            - totals.interest
            - opportunity
            - balance
            - totals.extra_expenses
            - totals.maintenance
            - totals.utilities_shortfall
            - capital_gains_tax
            - totals.condo_fees
            - totals.insurance;
        if month != total_months {
            base -= record.early_break_fee;
        }
        let profits = scenario_profits(record, base, &totals, &factors);

        for &scenario in &scenarios {
            let Some(profit) = profits.get(scenario) else {
                continue;
            };
            if let Some(event) = tracker.observe(scenario, month, profit) {
                observer.breakeven(&event);
                breakevens.push(event);
            }
        }

        if tracks_cash_flow && occupied {
            let monthly_cash_flow = bases.rental_income * factors.occupancy
                - split.payment
                - bases.monthly_property_tax()
                - record.monthly_maintenance
                - bases.condo_fee
                - management_fee
                - utilities_shortfall
                - mortgage_insurance
                - bases.property_insurance
                + assistance;
            cash_flow.observe(month, monthly_cash_flow);
        }

        let snapshot = MonthlySnapshot {
            month,
            annual_rate: rate,
            payment: split.payment,
            interest: split.interest,
            principal: split.principal,
            balance,
            property_value,
            capital_gains_tax,
            monthly_property_tax: bases.monthly_property_tax(),
            monthly_rent: bases.rent,
            monthly_rental_income: bases.rental_income,
            monthly_condo_fee: bases.condo_fee,
            total_interest: totals.interest,
            total_property_tax: totals.property_tax,
            total_maintenance: totals.maintenance,
            total_condo_fees: totals.condo_fees,
            total_extra_expenses: totals.extra_expenses,
            total_insurance: totals.insurance,
            opportunity_cost: opportunity - down_payment,
            total_rent_saved: totals.rent_saved,
            total_rental_income: totals.rental_income,
            total_management_fees: totals.management_fees,
            total_utilities_shortfall: totals.utilities_shortfall,
            total_assistance: totals.assistance,
            profits,
        };
        observer.month_completed(&snapshot);
        months.push(snapshot);
    }

    ScheduleResult {
        initial_payment,
        months,
        breakevens,
        cash_flow: if tracks_cash_flow {
            cash_flow.assessment()
        } else {
            None
        },
    }
}
