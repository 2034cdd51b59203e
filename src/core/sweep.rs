use serde::Serialize;

use super::engine::run_schedule;
use super::types::{ParameterRecord, ProfitScenario, RatePlan};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepPoint {
    pub sheet_name: String,
    pub property_price: f64,
    pub annual_rate: f64,
    pub amortization_years: u32,
    pub initial_payment: Option<f64>,
    pub breakeven_month: Option<u32>,
    pub final_profit: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl SweepPoint {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub points: Vec<SweepPoint>,
    pub best_index: Option<usize>,
}

fn evaluate_point(base: &ParameterRecord, price: f64, rate: f64, years: u32) -> SweepPoint {
    let mut record = base.clone();
    record.property_price = price;
    record.rate_plan = RatePlan::Fixed { annual_rate: rate };
    record.amortization_years = years;

    let mut point = SweepPoint {
        sheet_name: record.sheet_name(),
        property_price: price,
        annual_rate: rate,
        amortization_years: years,
        initial_payment: None,
        breakeven_month: None,
        final_profit: None,
        violations: Vec::new(),
    };

    match run_schedule(&record) {
        Ok(result) => {
            point.initial_payment = Some(result.initial_payment);
            point.breakeven_month = result.breakeven_month(ProfitScenario::Base);
            point.final_profit = result.final_month().map(|m| m.profits.base);
        }
        Err(err) => point.violations = err.violations,
    }
    point
}

fn build_sweep_result(points: Vec<SweepPoint>) -> SweepResult {
    let best_index = points
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| p.final_profit.map(|profit| (idx, profit)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx);

    SweepResult { points, best_index }
}

pub fn run_sweep(
    base: &ParameterRecord,
    prices: &[f64],
    rates: &[f64],
    terms: &[u32],
) -> SweepResult {
    let mut points = Vec::with_capacity(prices.len() * rates.len() * terms.len());
    for &price in prices {
        for &rate in rates {
            for &years in terms {
                let point = evaluate_point(base, price, rate, years);
                log::debug!(
                    "sweep point={} valid={} breakeven={:?}",
                    point.sheet_name,
                    point.is_valid(),
                    point.breakeven_month
                );
                points.push(point);
            }
        }
    }
    build_sweep_result(points)
}
