use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxBracket {
    pub upper_threshold: f64,
    pub rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaxSchedule {
    brackets: Vec<TaxBracket>,
}

impl TaxSchedule {
    /// `brackets` are `(upper_threshold, marginal_rate_percent)` in ascending order.
    pub fn from_percent(brackets: &[(f64, f64)]) -> Self {
        Self {
            brackets: brackets
                .iter()
                .map(|&(upper_threshold, rate)| TaxBracket {
                    upper_threshold,
                    rate: rate / 100.0,
                })
                .collect(),
        }
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn tax_owed(&self, income: f64) -> f64 {
        progressive_tax(income, &self.brackets)
    }
}

pub fn progressive_tax(income: f64, brackets: &[TaxBracket]) -> f64 {
    if !(income > 0.0) {
        return 0.0;
    }

    let mut tax = 0.0;
    let mut previous_threshold = 0.0;
    for bracket in brackets {
        let top = income.min(bracket.upper_threshold);
        if top > previous_threshold {
            tax += (top - previous_threshold) * bracket.rate;
        }
        if income <= bracket.upper_threshold {
            break;
        }
        previous_threshold = bracket.upper_threshold;
    }
    tax
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Province {
    Ab,
    Bc,
    Mb,
    Nb,
    Nl,
    Ns,
    On,
    Pe,
    Qc,
    Sk,
    Nt,
    Nu,
    Yt,
}

impl Province {
    pub const ALL: [Province; 13] = [
        Province::Ab,
        Province::Bc,
        Province::Mb,
        Province::Nb,
        Province::Nl,
        Province::Ns,
        Province::On,
        Province::Pe,
        Province::Qc,
        Province::Sk,
        Province::Nt,
        Province::Nu,
        Province::Yt,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Province::Ab => "AB",
            Province::Bc => "BC",
            Province::Mb => "MB",
            Province::Nb => "NB",
            Province::Nl => "NL",
            Province::Ns => "NS",
            Province::On => "ON",
            Province::Pe => "PE",
            Province::Qc => "QC",
            Province::Sk => "SK",
            Province::Nt => "NT",
            Province::Nu => "NU",
            Province::Yt => "YT",
        }
    }

    // 2024 provincial/territorial brackets.
    fn bracket_table(self) -> &'static [(f64, f64)] {
        const INF: f64 = f64::INFINITY;
        match self {
            Province::Ab => &[
                (148_269.0, 10.0),
                (177_922.0, 12.0),
                (237_230.0, 13.0),
                (355_845.0, 14.0),
                (INF, 15.0),
            ],
            Province::Bc => &[
                (47_937.0, 5.06),
                (95_875.0, 7.7),
                (110_076.0, 10.5),
                (133_664.0, 12.29),
                (181_232.0, 14.7),
                (252_752.0, 16.8),
                (INF, 20.5),
            ],
            Province::Mb => &[(47_000.0, 10.8), (100_000.0, 12.75), (INF, 17.4)],
            Province::Nb => &[
                (49_958.0, 9.4),
                (99_916.0, 14.0),
                (185_064.0, 16.0),
                (INF, 19.5),
            ],
            Province::Nl => &[
                (43_198.0, 8.7),
                (86_395.0, 14.5),
                (154_244.0, 15.8),
                (215_943.0, 17.8),
                (275_870.0, 19.8),
                (551_739.0, 20.8),
                (1_103_478.0, 21.3),
                (INF, 21.8),
            ],
            Province::Ns => &[
                (29_590.0, 8.79),
                (59_180.0, 14.95),
                (93_000.0, 16.67),
                (150_000.0, 17.5),
                (INF, 21.0),
            ],
            Province::On => &[
                (51_446.0, 5.05),
                (102_894.0, 9.15),
                (150_000.0, 11.16),
                (220_000.0, 12.16),
                (INF, 13.16),
            ],
            Province::Pe => &[
                (32_656.0, 9.65),
                (64_313.0, 13.63),
                (105_000.0, 16.65),
                (140_000.0, 18.0),
                (INF, 18.75),
            ],
            Province::Qc => &[
                (51_780.0, 14.0),
                (103_545.0, 19.0),
                (126_000.0, 24.0),
                (INF, 25.75),
            ],
            Province::Sk => &[(52_057.0, 10.5), (148_734.0, 12.5), (INF, 14.5)],
            Province::Nt => &[
                (50_597.0, 5.9),
                (101_198.0, 8.6),
                (164_525.0, 12.2),
                (INF, 14.05),
            ],
            Province::Nu => &[
                (53_268.0, 4.0),
                (106_537.0, 7.0),
                (173_205.0, 9.0),
                (INF, 11.5),
            ],
            Province::Yt => &[
                (55_867.0, 6.4),
                (111_733.0, 9.0),
                (173_205.0, 10.9),
                (500_000.0, 12.8),
                (INF, 15.0),
            ],
        }
    }

    pub fn schedule(self) -> TaxSchedule {
        TaxSchedule::from_percent(self.bracket_table())
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Province {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Province::ALL
            .into_iter()
            .find(|p| p.code() == upper)
            .ok_or_else(|| format!("Unknown province/territory: {s}"))
    }
}

const FEDERAL_2024: &[(f64, f64)] = &[
    (55_867.0, 15.0),
    (111_733.0, 20.5),
    (173_205.0, 26.0),
    (246_752.0, 29.0),
    (f64::INFINITY, 33.0),
];

pub fn federal_schedule() -> TaxSchedule {
    TaxSchedule::from_percent(FEDERAL_2024)
}

pub fn total_tax(province: Province, income: f64) -> f64 {
    federal_schedule().tax_owed(income) + province.schedule().tax_owed(income)
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

    fn simple_schedule() -> TaxSchedule {
        TaxSchedule::from_percent(&[(10_000.0, 10.0), (20_000.0, 20.0), (f64::INFINITY, 30.0)])
    }

    #[test]
    fn non_positive_income_owes_nothing() {
        let schedule = simple_schedule();
        assert_eq!(schedule.tax_owed(0.0), 0.0);
        assert_eq!(schedule.tax_owed(-5_000.0), 0.0);
        assert_eq!(schedule.tax_owed(f64::NAN), 0.0);
    }

    #[test]
    fn walks_brackets_in_order() {
        let schedule = simple_schedule();
        assert_approx(schedule.tax_owed(5_000.0), 500.0);
        assert_approx(schedule.tax_owed(15_000.0), 1_000.0 + 1_000.0);
        assert_approx(schedule.tax_owed(30_000.0), 1_000.0 + 2_000.0 + 3_000.0);
    }

    #[test]
    fn income_at_threshold_only_uses_lower_brackets() {
        let schedule = simple_schedule();
        assert_approx(schedule.tax_owed(10_000.0), 1_000.0);
        assert_approx(schedule.tax_owed(20_000.0), 3_000.0);
        let just_above = schedule.tax_owed(20_000.0 + 1e-3);
        assert!(just_above >= schedule.tax_owed(20_000.0));
        assert!(just_above - 3_000.0 < 1e-3);
    }

    #[test]
    fn total_tax_adds_federal_and_provincial_on_same_income() {
        let income = 80_000.0;
        let expected = federal_schedule().tax_owed(income) + Province::On.schedule().tax_owed(income);
        assert_approx(total_tax(Province::On, income), expected);

        let federal = 55_867.0 * 0.15 + (80_000.0 - 55_867.0) * 0.205;
        assert_approx(federal_schedule().tax_owed(income), federal);
    }

    #[test]
    fn province_codes_round_trip_through_from_str() {
        for province in Province::ALL {
            assert_eq!(province.code().parse::<Province>(), Ok(province));
        }
        assert_eq!("on".parse::<Province>(), Ok(Province::On));
        assert!("ZZ".parse::<Province>().is_err());
    }

    #[test]
    fn every_schedule_is_ascending_and_open_ended() {
        for schedule in Province::ALL
            .into_iter()
            .map(Province::schedule)
            .chain([federal_schedule()])
        {
            let brackets = schedule.brackets();
            assert!(brackets.windows(2).all(|w| w[0].upper_threshold < w[1].upper_threshold));
            assert!(brackets.last().is_some_and(|b| b.upper_threshold.is_infinite()));
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tax_is_monotone_in_income(
            income in 0u32..2_000_000,
            raise in 1u32..50_000,
            province_idx in 0usize..13
        ) {
            let province = Province::ALL[province_idx];
            let low = total_tax(province, income as f64);
            let high = total_tax(province, (income + raise) as f64);
            prop_assert!(high + 1e-9 >= low);
            prop_assert!(low >= 0.0);
            prop_assert!(low <= income as f64);
        }
    }
}
