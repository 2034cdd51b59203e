use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::tax::{Province, total_tax};
use super::types::round_cents;
use super::validation::Violations;

pub const CPP_EARLIEST_AGE: u32 = 60;
pub const OAS_AGE: u32 = 65;
pub const RRIF_AFTER_AGE: u32 = 71;
/// CPP start delays are counted from the birth month at age 60; month 61 is age 65.
pub const CPP_NEUTRAL_DELAY_MONTHS: u32 = 61;
pub const CPP_MAX_DELAY_MONTHS: u32 = 121;
pub const OAS_MAX_DELAY_MONTHS: u32 = 60;

pub fn cpp_adjustment_factor(delay_months: u32) -> f64 {
    match delay_months.cmp(&CPP_NEUTRAL_DELAY_MONTHS) {
        Ordering::Less => 1.0 - f64::from(CPP_NEUTRAL_DELAY_MONTHS - delay_months) * 0.006,
        Ordering::Greater => 1.0 + f64::from(delay_months - CPP_NEUTRAL_DELAY_MONTHS) * 0.007,
        Ordering::Equal => 1.0,
    }
}

pub fn oas_adjustment_factor(delay_months: u32) -> f64 {
    1.0 + f64::from(delay_months) * 0.006
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GisReductionPolicy {
    #[serde(rename_all = "camelCase")]
    SingleThreshold { threshold: f64, rate: f64 },
    #[serde(rename_all = "camelCase")]
    TwoTier {
        lower_threshold: f64,
        upper_threshold: f64,
        lower_rate: f64,
        upper_rate: f64,
    },
}

impl Default for GisReductionPolicy {
    fn default() -> Self {
        Self::two_tier()
    }
}

impl GisReductionPolicy {
    pub fn single_threshold() -> Self {
        GisReductionPolicy::SingleThreshold {
            threshold: 0.0,
            rate: 0.5,
        }
    }

    pub fn two_tier() -> Self {
        GisReductionPolicy::TwoTier {
            lower_threshold: 5_000.0,
            upper_threshold: 15_000.0,
            lower_rate: 0.5,
            upper_rate: 1.0,
        }
    }

    pub fn reduction(&self, income: f64) -> f64 {
        let reduction = match *self {
            GisReductionPolicy::SingleThreshold { threshold, rate } => {
                (income - threshold).max(0.0) * rate
            }
            GisReductionPolicy::TwoTier {
                lower_threshold,
                upper_threshold,
                lower_rate,
                upper_rate,
            } => {
                if income <= lower_threshold {
                    0.0
                } else if income <= upper_threshold {
                    (income - lower_threshold) * lower_rate
                } else {
                    (upper_threshold - lower_threshold) * lower_rate
                        + (income - upper_threshold) * upper_rate
                }
            }
        };
        reduction.max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitInputs {
    pub gis_monthly: f64,
    pub cpp_monthly: f64,
    pub life_expectancy: u32,
    pub pre_retirement_monthly_income: f64,
    pub post_retirement_monthly_income: f64,
    pub retirement_age: u32,
    pub retirement_months_delay: u32,
    pub province: Province,
    pub oas_monthly: f64,
    pub oas_delay_months: u32,
    pub birth_month: u32,
    pub rrif_monthly: f64,
    pub gis_policy: GisReductionPolicy,
}

pub fn validate_benefit_inputs(inputs: &BenefitInputs) -> Vec<String> {
    let mut v = Violations::new();
    v.range("gis_monthly", inputs.gis_monthly, 0.0, 3_000.0);
    v.range("cpp_monthly", inputs.cpp_monthly, 0.0, 5_000.0);
    if !(60..=130).contains(&inputs.life_expectancy) {
        v.push("life_expectancy must be between 60 and 130".to_string());
    }
    v.range(
        "pre_retirement_monthly_income",
        inputs.pre_retirement_monthly_income,
        0.0,
        20_000.0,
    );
    v.range(
        "post_retirement_monthly_income",
        inputs.post_retirement_monthly_income,
        0.0,
        20_000.0,
    );
    if !(60..=75).contains(&inputs.retirement_age) {
        v.push("retirement_age must be between 60 and 75".to_string());
    }
    if inputs.retirement_age >= inputs.life_expectancy {
        v.push("retirement_age must be less than life_expectancy".to_string());
    }
    if inputs.retirement_months_delay > 11 {
        v.push("retirement_months_delay must be between 0 and 11".to_string());
    }
    v.range("rrif_monthly", inputs.rrif_monthly, 0.0, 20_000.0);
    v.range("oas_monthly", inputs.oas_monthly, 0.0, 3_000.0);
    if inputs.oas_delay_months > OAS_MAX_DELAY_MONTHS {
        v.push(format!(
            "oas_delay_months must be between 0 and {OAS_MAX_DELAY_MONTHS}"
        ));
    }
    if !(1..=12).contains(&inputs.birth_month) {
        v.push("birth_month must be between 1 and 12".to_string());
    }
    match inputs.gis_policy {
        GisReductionPolicy::SingleThreshold { threshold, rate } => {
            v.range("gis_policy.threshold", threshold, 0.0, 1_000_000.0);
            v.range("gis_policy.rate", rate, 0.0, 1.0);
        }
        GisReductionPolicy::TwoTier {
            lower_threshold,
            upper_threshold,
            lower_rate,
            upper_rate,
        } => {
            v.range("gis_policy.lower_threshold", lower_threshold, 0.0, 1_000_000.0);
            v.range(
                "gis_policy.upper_threshold",
                upper_threshold,
                lower_threshold.max(0.0),
                1_000_000.0,
            );
            v.range("gis_policy.lower_rate", lower_rate, 0.0, 1.0);
            v.range("gis_policy.upper_rate", upper_rate, 0.0, 1.0);
        }
    }
    v.into_vec()
}

/// First age at which a benefit is paid, and how many months of that year it covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct StartYear {
    age: u32,
    calendar_month: u32,
}

impl StartYear {
    fn after(base_age: u32, birth_month: u32, delay_months: u32) -> Self {
        let delay_mod = delay_months % 12;
        let calendar_month = (birth_month - 1 + delay_mod) % 12 + 1;
        let carry = u32::from(birth_month + delay_mod > 12);
        Self {
            age: base_age + delay_months / 12 + carry,
            calendar_month,
        }
    }

    fn months_in_first_year(self) -> u32 {
        12 - self.calendar_month + 1
    }

    fn annual(self, age: u32, monthly: f64) -> f64 {
        match age.cmp(&self.age) {
            Ordering::Greater => round_cents(monthly * 12.0),
            Ordering::Equal => round_cents(monthly * f64::from(self.months_in_first_year())),
            Ordering::Less => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitOption {
    pub cpp_start_delay_months: u32,
    pub start_age: u32,
    pub start_month: u32,
    pub cpp_adjustment_factor: f64,
    pub total_cpp: f64,
    pub total_oas: f64,
    pub total_gis: f64,
    pub total_other_income: f64,
    pub total_rrif: f64,
    pub total_gross_income: f64,
    pub total_taxes: f64,
    pub total_net_income: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitsResult {
    pub options: Vec<BenefitOption>,
    pub best_index: usize,
}

impl BenefitsResult {
    pub fn best(&self) -> Option<&BenefitOption> {
        self.options.get(self.best_index)
    }
}

fn other_monthly_income(inputs: &BenefitInputs, retirement: StartYear, age: u32) -> f64 {
    match age.cmp(&retirement.age) {
        Ordering::Less => inputs.pre_retirement_monthly_income,
        Ordering::Equal => {
            let pre_months = f64::from(retirement.calendar_month - 1);
            let post_months = f64::from(retirement.months_in_first_year());
            (inputs.pre_retirement_monthly_income * pre_months
                + inputs.post_retirement_monthly_income * post_months)
                / 12.0
        }
        Ordering::Greater => inputs.post_retirement_monthly_income,
    }
}

fn evaluate_cpp_start(
    inputs: &BenefitInputs,
    delay_months: u32,
    retirement: StartYear,
    oas_start: StartYear,
    adjusted_oas: f64,
) -> BenefitOption {
    let cpp_start = StartYear::after(CPP_EARLIEST_AGE, inputs.birth_month, delay_months);
    let factor = cpp_adjustment_factor(delay_months);
    let adjusted_cpp = inputs.cpp_monthly * factor;

    let mut option = BenefitOption {
        cpp_start_delay_months: delay_months,
        start_age: CPP_EARLIEST_AGE + delay_months / 12,
        start_month: delay_months % 12,
        cpp_adjustment_factor: factor,
        total_cpp: 0.0,
        total_oas: 0.0,
        total_gis: 0.0,
        total_other_income: 0.0,
        total_rrif: 0.0,
        total_gross_income: 0.0,
        total_taxes: 0.0,
        total_net_income: 0.0,
    };

    for age in CPP_EARLIEST_AGE..=inputs.life_expectancy {
        let annual_cpp = cpp_start.annual(age, adjusted_cpp);
        let annual_oas = oas_start.annual(age, adjusted_oas);
        let annual_other = round_cents(other_monthly_income(inputs, retirement, age) * 12.0);
        let annual_rrif = if age > RRIF_AFTER_AGE {
            round_cents(inputs.rrif_monthly * 12.0)
        } else {
            0.0
        };

        let taxable = round_cents(annual_cpp + annual_oas + annual_other + annual_rrif);
        let taxes = round_cents(total_tax(inputs.province, taxable));

        // GIS is paid alongside OAS; the income test leaves OAS out.
        let annual_gis = if age >= oas_start.age {
            let reduction = inputs
                .gis_policy
                .reduction(annual_cpp + annual_other + annual_rrif);
            let gis_base = oas_start.annual(age, inputs.gis_monthly);
            round_cents(gis_base - reduction).max(0.0)
        } else {
            0.0
        };
        let gross = round_cents(taxable + annual_gis);

        log::trace!(
            "benefits delay={delay_months} age={age} cpp={annual_cpp} oas={annual_oas} gis={annual_gis} rrif={annual_rrif} taxes={taxes}"
        );

        option.total_cpp += annual_cpp;
        option.total_oas += annual_oas;
        option.total_gis += annual_gis;
        option.total_other_income += annual_other;
        option.total_rrif += annual_rrif;
        option.total_gross_income += gross;
        option.total_taxes += taxes;
    }
    option.total_net_income = option.total_gross_income - option.total_taxes;
    option
}

pub fn optimize_cpp_start(inputs: &BenefitInputs) -> Result<BenefitsResult, ConfigError> {
    ConfigError::check(validate_benefit_inputs(inputs))?;

    let retirement = StartYear::after(
        inputs.retirement_age,
        inputs.birth_month,
        inputs.retirement_months_delay,
    );
    let oas_start = StartYear::after(OAS_AGE, inputs.birth_month, inputs.oas_delay_months);
    let adjusted_oas = inputs.oas_monthly * oas_adjustment_factor(inputs.oas_delay_months);

    let options = (1..=CPP_MAX_DELAY_MONTHS)
        .map(|delay| evaluate_cpp_start(inputs, delay, retirement, oas_start, adjusted_oas))
        .collect::<Vec<_>>();

    let best_index = options
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_net_income.total_cmp(&b.total_net_income))
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    if let Some(best) = options.get(best_index) {
        log::info!(
            "benefits best cpp start: age={} month={} net={:.2}",
            best.start_age,
            best.start_month,
            best.total_net_income
        );
    }

    Ok(BenefitsResult {
        options,
        best_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> BenefitInputs {
        BenefitInputs {
            gis_monthly: 0.0,
            cpp_monthly: 1_000.0,
            life_expectancy: 90,
            pre_retirement_monthly_income: 0.0,
            post_retirement_monthly_income: 0.0,
            retirement_age: 60,
            retirement_months_delay: 0,
            province: Province::On,
            oas_monthly: 0.0,
            oas_delay_months: 0,
            birth_month: 1,
            rrif_monthly: 0.0,
            gis_policy: GisReductionPolicy::two_tier(),
        }
    }

    #[test]
    fn cpp_factor_is_neutral_at_sixty_five() {
        assert_approx(cpp_adjustment_factor(61), 1.0);
        assert_approx(cpp_adjustment_factor(1), 1.0 - 60.0 * 0.006);
        assert_approx(cpp_adjustment_factor(121), 1.0 + 60.0 * 0.007);
        assert_approx(cpp_adjustment_factor(60), 0.994);
        assert_approx(cpp_adjustment_factor(62), 1.007);
    }

    #[test]
    fn oas_factor_grows_per_deferred_month() {
        assert_approx(oas_adjustment_factor(0), 1.0);
        assert_approx(oas_adjustment_factor(60), 1.36);
    }

    #[test]
    fn gis_policies_reduce_differently() {
        let two_tier = GisReductionPolicy::two_tier();
        assert_approx(two_tier.reduction(4_000.0), 0.0);
        assert_approx(two_tier.reduction(10_000.0), 2_500.0);
        assert_approx(two_tier.reduction(20_000.0), 10_000.0);

        let single = GisReductionPolicy::single_threshold();
        assert_approx(single.reduction(1_000.0), 500.0);
        assert_approx(single.reduction(-10.0), 0.0);
        assert_eq!(GisReductionPolicy::default(), two_tier);
    }

    #[test]
    fn start_year_carries_into_next_age_past_december() {
        let november = StartYear::after(60, 11, 3);
        assert_eq!(november.age, 61);
        assert_eq!(november.calendar_month, 2);
        assert_eq!(november.months_in_first_year(), 11);

        let january = StartYear::after(60, 1, 0);
        assert_eq!(january.age, 60);
        assert_eq!(january.months_in_first_year(), 12);

        let deferred = StartYear::after(65, 6, 30);
        assert_eq!(deferred.age, 67);
        assert_eq!(deferred.calendar_month, 12);
        assert_eq!(deferred.months_in_first_year(), 1);
    }

    #[test]
    fn covers_every_start_month_through_seventy() {
        let result = optimize_cpp_start(&sample_inputs()).expect("valid inputs");
        assert_eq!(result.options.len(), 121);
        assert_eq!(result.options[0].cpp_start_delay_months, 1);
        assert_eq!(result.options[60].cpp_adjustment_factor, 1.0);
        assert_eq!(result.options[60].start_age, 65);
        assert_eq!(result.options[60].start_month, 1);
        assert_eq!(result.options[120].start_age, 70);
    }

    #[test]
    fn earliest_start_accumulates_prorated_first_year() {
        let result = optimize_cpp_start(&sample_inputs()).expect("valid inputs");
        let earliest = &result.options[0];
        // 640/month: 11 months at 60, then 30 full years.
        assert_approx(earliest.total_cpp, 640.0 * 11.0 + 30.0 * 7_680.0);
        assert_approx(earliest.total_gross_income, earliest.total_cpp);
        assert_approx(
            earliest.total_net_income,
            earliest.total_gross_income - earliest.total_taxes,
        );
        assert!(earliest.total_taxes > 0.0);
    }

    #[test]
    fn best_start_depends_on_life_expectancy() {
        let mut short = sample_inputs();
        short.life_expectancy = 65;
        let result = optimize_cpp_start(&short).expect("valid inputs");
        assert_eq!(result.best_index, 0);

        let mut long = sample_inputs();
        long.life_expectancy = 100;
        let result = optimize_cpp_start(&long).expect("valid inputs");
        let best = result.best().expect("non-empty options");
        assert_eq!(best.cpp_start_delay_months, 121);
    }

    #[test]
    fn gis_follows_oas_start_and_selected_policy() {
        let mut inputs = sample_inputs();
        inputs.cpp_monthly = 0.0;
        inputs.gis_monthly = 500.0;
        inputs.oas_monthly = 700.0;
        inputs.life_expectancy = 70;

        let result = optimize_cpp_start(&inputs).expect("valid inputs");
        let option = &result.options[0];
        assert_approx(option.total_gis, 6.0 * 6_000.0);
        assert_approx(option.total_oas, 6.0 * 8_400.0);

        inputs.pre_retirement_monthly_income = 1_000.0;
        inputs.post_retirement_monthly_income = 1_000.0;
        let two_tier = optimize_cpp_start(&inputs).expect("valid inputs");
        assert_approx(two_tier.options[0].total_gis, 6.0 * (6_000.0 - 3_500.0));

        inputs.gis_policy = GisReductionPolicy::single_threshold();
        let single = optimize_cpp_start(&inputs).expect("valid inputs");
        assert_approx(single.options[0].total_gis, 0.0);
    }

    #[test]
    fn rrif_income_starts_after_seventy_one() {
        let mut inputs = sample_inputs();
        inputs.cpp_monthly = 0.0;
        inputs.rrif_monthly = 100.0;
        inputs.life_expectancy = 75;
        let result = optimize_cpp_start(&inputs).expect("valid inputs");
        assert_approx(result.options[0].total_rrif, 4.0 * 1_200.0);
    }

    #[test]
    fn retirement_year_blends_pre_and_post_income() {
        let mut inputs = sample_inputs();
        inputs.cpp_monthly = 0.0;
        inputs.life_expectancy = 62;
        inputs.retirement_age = 61;
        inputs.retirement_months_delay = 3;
        inputs.pre_retirement_monthly_income = 2_000.0;
        inputs.post_retirement_monthly_income = 500.0;
        let result = optimize_cpp_start(&inputs).expect("valid inputs");
        // Age 60 pre, age 61 three months pre and nine post, age 62 post.
        let expected = 24_000.0 + (2_000.0 * 3.0 + 500.0 * 9.0) + 6_000.0;
        assert_approx(result.options[0].total_other_income, expected);
    }

    #[test]
    fn invalid_inputs_report_every_problem() {
        let mut inputs = sample_inputs();
        inputs.gis_monthly = -1.0;
        inputs.life_expectancy = 59;
        inputs.retirement_months_delay = 12;
        inputs.oas_delay_months = 61;
        inputs.birth_month = 0;

        let violations = validate_benefit_inputs(&inputs);
        assert_eq!(violations.len(), 6);
        assert!(violations.iter().any(|v| v.contains("less than life_expectancy")));
        assert!(optimize_cpp_start(&inputs).is_err());
        assert!(validate_benefit_inputs(&sample_inputs()).is_empty());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(16))]

        #[test]
        fn prop_totals_are_consistent(
            cpp in 0u32..2_000,
            gis in 0u32..1_000,
            oas in 0u32..1_000,
            life in 66u32..100,
            birth_month in 1u32..13,
            oas_delay in 0u32..61
        ) {
            let mut inputs = sample_inputs();
            inputs.cpp_monthly = cpp as f64;
            inputs.gis_monthly = gis as f64;
            inputs.oas_monthly = oas as f64;
            inputs.life_expectancy = life;
            inputs.birth_month = birth_month;
            inputs.oas_delay_months = oas_delay;

            let result = optimize_cpp_start(&inputs).expect("valid inputs");
            let best_net = result.options[result.best_index].total_net_income;
            for option in &result.options {
                prop_assert!(option.total_gis >= 0.0);
                prop_assert!(option.total_taxes >= 0.0);
                prop_assert!(option.total_net_income <= best_net);
                let parts = option.total_cpp + option.total_oas + option.total_gis
                    + option.total_other_income + option.total_rrif;
                prop_assert!((parts - option.total_gross_income).abs() < 0.05 * life as f64);
            }
        }
    }
}
