use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use comfy_table::{Cell, Table};
use thiserror::Error;

use crate::core::{
    BenefitsResult, MonthlySnapshot, ParameterRecord, ProfitScenario, ScheduleResult, SweepResult,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub fn money(val: f64) -> String {
    let cents = format!("{:.2}", val.abs());
    let negative = val < 0.0 && cents != "0.00";
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

type Column = (&'static str, fn(&MonthlySnapshot) -> f64);

fn column(name: &'static str, value: fn(&MonthlySnapshot) -> f64) -> Column {
    (name, value)
}

fn schedule_columns(record: &ParameterRecord) -> Vec<Column> {
    let mut columns: Vec<Column> = vec![
        column("Interest Rate", |m| m.annual_rate),
        column("Payment", |m| m.payment),
        column("Interest", |m| m.interest),
        column("Principal", |m| m.principal),
        column("Balance", |m| m.balance),
        column("Property Value", |m| m.property_value),
        column("Property Tax", |m| m.monthly_property_tax),
        column("Total Interest", |m| m.total_interest),
        column("Total Property Tax", |m| m.total_property_tax),
        column("Total Maintenance", |m| m.total_maintenance),
        column("Opportunity Cost", |m| m.opportunity_cost),
    ];
    if record.capital_gains.is_some() {
        columns.push(column("Capital Gains Tax", |m| m.capital_gains_tax));
    }
    if record.condo.is_some() {
        columns.push(column("Condo Fee", |m| m.monthly_condo_fee));
        columns.push(column("Total Condo Fees", |m| m.total_condo_fees));
    }
    if record.insurance.is_some() {
        columns.push(column("Total Insurance", |m| m.total_insurance));
    }
    if record.prior_rent.is_some() {
        columns.push(column("Rent", |m| m.monthly_rent));
        columns.push(column("Total Rent Saved", |m| m.total_rent_saved));
    }
    if record.rental.is_some() {
        columns.push(column("Rental Income", |m| m.monthly_rental_income));
        columns.push(column("Total Rental Income", |m| m.total_rental_income));
        columns.push(column("Total Management Fees", |m| m.total_management_fees));
    }
    if record.assistance.is_some() {
        columns.push(column("Total Help", |m| m.total_assistance));
    }
    columns
}

fn profit_columns(record: &ParameterRecord) -> Vec<ProfitScenario> {
    record.applicable_scenarios()
}

pub fn default_csv_path(dir: &Path, record: &ParameterRecord) -> PathBuf {
    dir.join(format!("{}.csv", record.sheet_name()))
}

pub fn write_schedule_csv<W: Write>(
    writer: W,
    record: &ParameterRecord,
    result: &ScheduleResult,
) -> Result<(), ExportError> {
    let columns = schedule_columns(record);
    let scenarios = profit_columns(record);
    let mut wtr = csv::Writer::from_writer(writer);

    let header = std::iter::once("Month")
        .chain(columns.iter().map(|(name, _)| *name))
        .chain(scenarios.iter().map(|s| s.column_name()));
    wtr.write_record(header)?;

    for snapshot in &result.months {
        let m = snapshot.rounded();
        let mut row = Vec::with_capacity(1 + columns.len() + scenarios.len());
        row.push(m.month.to_string());
        row.extend(columns.iter().map(|(_, value)| format!("{:.2}", value(&m))));
        row.extend(
            scenarios
                .iter()
                .filter_map(|&s| m.profits.get(s))
                .map(|v| format!("{v:.2}")),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_schedule_csv(
    path: &Path,
    record: &ParameterRecord,
    result: &ScheduleResult,
) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_schedule_csv(file, record, result)?;
    log::info!("export wrote {} months to {}", result.months.len(), path.display());
    Ok(())
}

pub fn schedule_table(record: &ParameterRecord, result: &ScheduleResult) -> Table {
    let scenarios = profit_columns(record);
    let mut table = Table::new();
    let header = ["Month", "Payment", "Balance", "Property Value"]
        .into_iter()
        .chain(scenarios.iter().map(|s| s.column_name()));
    table.set_header(header);

    for snapshot in &result.months {
        let mut row = vec![
            Cell::new(snapshot.month),
            Cell::new(money(snapshot.payment)),
            Cell::new(money(snapshot.balance)),
            Cell::new(money(snapshot.property_value)),
        ];
        row.extend(
            scenarios
                .iter()
                .filter_map(|&s| snapshot.profits.get(s))
                .map(|v| Cell::new(money(v))),
        );
        table.add_row(row);
    }
    table
}

pub fn sweep_table(result: &SweepResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Scenario", "Payment", "Breakeven", "Final Profit", ""]);
    for (idx, point) in result.points.iter().enumerate() {
        let breakeven = match (point.is_valid(), point.breakeven_month) {
            (false, _) => point.violations.join("; "),
            (true, Some(month)) => format!("month {month}"),
            (true, None) => "never".to_string(),
        };
        table.add_row(vec![
            Cell::new(&point.sheet_name),
            Cell::new(point.initial_payment.map(money).unwrap_or_default()),
            Cell::new(breakeven),
            Cell::new(point.final_profit.map(money).unwrap_or_default()),
            Cell::new(if result.best_index == Some(idx) { "best" } else { "" }),
        ]);
    }
    table
}

pub fn benefits_table(result: &BenefitsResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "CPP Start", "Factor", "CPP", "OAS", "GIS", "Other", "RRIF", "Taxes", "Net", "",
    ]);
    for (idx, option) in result.options.iter().enumerate() {
        table.add_row(vec![
            Cell::new(format!("{} + {}m", option.start_age, option.start_month)),
            Cell::new(format!("{:.3}", option.cpp_adjustment_factor)),
            Cell::new(money(option.total_cpp)),
            Cell::new(money(option.total_oas)),
            Cell::new(money(option.total_gis)),
            Cell::new(money(option.total_other_income)),
            Cell::new(money(option.total_rrif)),
            Cell::new(money(option.total_taxes)),
            Cell::new(money(option.total_net_income)),
            Cell::new(if idx == result.best_index { "best" } else { "" }),
        ]);
    }
    table
}
