mod amortization;
mod benefits;
mod cache;
mod engine;
mod error;
#[cfg(test)]
pub(crate) mod fixtures;
mod observer;
mod sweep;
mod tax;
mod types;
mod validation;

pub use amortization::{
    PaymentSplit, RateSchedule, fixed_monthly_payment, monthly_interest, monthly_payment_over,
    split_payment,
};
pub use benefits::{
    BenefitInputs, BenefitOption, BenefitsResult, GisReductionPolicy, cpp_adjustment_factor,
    oas_adjustment_factor, optimize_cpp_start, validate_benefit_inputs,
};
pub use cache::{DEFAULT_CACHE_CAPACITY, ScheduleCache, fingerprint};
pub use engine::{BreakevenTracker, first_breakeven, run_schedule, run_schedule_observed};
pub use error::{CalcError, CalcResult, ConfigError};
pub use observer::{LogObserver, NoopObserver, SimulationObserver};
pub use sweep::{SweepPoint, SweepResult, run_sweep};
pub use tax::{Province, TaxBracket, TaxSchedule, federal_schedule, progressive_tax, total_tax};
pub use types::{
    Assistance, BreakevenEvent, CapitalGains, CashFlowAssessment, CondoFees, Insurance,
    MonthlySnapshot, ParameterRecord, PriorRent, ProfitScenario, RatePeriod, RatePlan,
    Renovation, RentalIncome, Residence, ScenarioProfits, ScheduleResult, round_cents,
};
pub use validation::{MAX_AMORTIZATION_YEARS, MAX_ANNUAL_RATE, collect_violations, validate};
