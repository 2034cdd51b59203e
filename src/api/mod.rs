use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::core::{
    Assistance, BenefitInputs, BenefitsResult, CalcError, CapitalGains, CashFlowAssessment,
    CondoFees, ConfigError, GisReductionPolicy, Insurance, LogObserver, MonthlySnapshot,
    ParameterRecord, PriorRent, ProfitScenario, Province, RatePeriod, RatePlan, Renovation,
    RentalIncome, Residence, ScheduleCache, ScheduleResult, SweepResult, optimize_cpp_start,
    run_schedule_observed, run_sweep,
};
use crate::export::{
    benefits_table, default_csv_path, export_schedule_csv, money, schedule_table, sweep_table,
    write_schedule_csv,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliResidence {
    Primary,
    Investment,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGisPolicy {
    SingleThreshold,
    TwoTier,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiResidence {
    #[serde(alias = "primaryResidence", alias = "primary_residence")]
    Primary,
    #[serde(alias = "investmentProperty", alias = "investment_property")]
    Investment,
}

impl From<ApiResidence> for CliResidence {
    fn from(value: ApiResidence) -> Self {
        match value {
            ApiResidence::Primary => CliResidence::Primary,
            ApiResidence::Investment => CliResidence::Investment,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGisPolicy {
    #[serde(alias = "singleThreshold", alias = "single_threshold", alias = "single")]
    SingleThreshold,
    #[serde(alias = "twoTier", alias = "two_tier")]
    TwoTier,
}

impl From<ApiGisPolicy> for CliGisPolicy {
    fn from(value: ApiGisPolicy) -> Self {
        match value {
            ApiGisPolicy::SingleThreshold => CliGisPolicy::SingleThreshold,
            ApiGisPolicy::TwoTier => CliGisPolicy::TwoTier,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "homeprofit",
    about = "Mortgage amortization, property profit and CPP/GIS timing calculators"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Month-by-month schedule with profit-if-sold and breakeven months")]
    Schedule(ScheduleCommand),
    #[command(about = "Compare fixed-rate schedules across prices, rates and terms")]
    Sweep(SweepCommand),
    #[command(about = "Lifetime income for every CPP start month from 60 to 70")]
    Benefits(BenefitsCommand),
}

#[derive(Args, Debug)]
struct ScheduleCommand {
    #[command(flatten)]
    scenario: ScenarioCli,
    #[arg(long, help = "Write the monthly schedule as CSV to this path")]
    csv: Option<PathBuf>,
    #[arg(
        long,
        help = "Write the CSV into this directory, named after the scenario",
        conflicts_with = "csv"
    )]
    csv_dir: Option<PathBuf>,
    #[arg(long, help = "Print every month as a table")]
    table: bool,
}

#[derive(Args, Debug)]
struct SweepCommand {
    #[command(flatten)]
    scenario: ScenarioCli,
    #[arg(long, value_delimiter = ',', help = "Property prices; defaults to --property-price")]
    prices: Vec<f64>,
    #[arg(long, value_delimiter = ',', help = "Annual rates (%); defaults to --annual-rate")]
    rates: Vec<f64>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Amortization terms in years; defaults to --amortization-years"
    )]
    terms: Vec<u32>,
}

#[derive(Args, Debug)]
struct BenefitsCommand {
    #[command(flatten)]
    inputs: BenefitsCli,
    #[arg(long, help = "Print every start month as a table")]
    table: bool,
}

#[derive(Args, Debug, Clone)]
struct ScenarioCli {
    #[arg(long, default_value_t = 500_000.0)]
    property_price: f64,
    #[arg(long, default_value_t = 20.0)]
    down_payment_percent: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Closing costs rolled into the mortgage"
    )]
    additional_financed_costs: f64,
    #[arg(long, default_value_t = 25)]
    amortization_years: u32,
    #[arg(long, default_value_t = 5.0, help = "Fixed annual rate (%)")]
    annual_rate: f64,
    #[arg(
        long = "rate-period",
        value_parser = parse_rate_period,
        help = "Variable-rate window as YEARS:RATE; repeat in order. Overrides --annual-rate"
    )]
    rate_periods: Vec<RatePeriod>,
    #[arg(long, default_value_t = 3.0, help = "Annual appreciation (%)")]
    appreciation_percent: f64,
    #[arg(long, default_value_t = 5_000.0)]
    property_tax_annual: f64,
    #[arg(long, default_value_t = 2.0)]
    property_tax_increase_percent: f64,
    #[arg(long, default_value_t = 300.0)]
    monthly_maintenance: f64,
    #[arg(long, default_value_t = 5_000.0)]
    land_transfer_tax: f64,
    #[arg(long, default_value_t = 5.0, help = "Agent commission on sale (%)")]
    agent_fee_percent: f64,
    #[arg(long, default_value_t = 2_000.0)]
    legal_fees: f64,
    #[arg(
        long,
        default_value_t = 3_000.0,
        help = "Penalty for breaking the mortgage before the final month"
    )]
    early_break_fee: f64,
    #[arg(
        long,
        default_value_t = 0.57,
        help = "Monthly return the down payment would have earned elsewhere (%)"
    )]
    opportunity_return_monthly_percent: f64,
    #[arg(long, value_enum, default_value_t = CliResidence::Primary)]
    residence: CliResidence,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Extra monthly running costs of a primary residence"
    )]
    monthly_extra_expenses: f64,
    #[arg(long)]
    condo_fee: Option<f64>,
    #[arg(long, default_value_t = 3.0)]
    condo_increase_percent: f64,
    #[arg(long, help = "Marginal tax rate applied to the taxable gain (%)")]
    capital_gains_tax_percent: Option<f64>,
    #[arg(long, default_value_t = 0.5)]
    capital_gains_inclusion_factor: f64,
    #[arg(long, help = "Monthly rent no longer paid once moved in")]
    prior_rent: Option<f64>,
    #[arg(long, default_value_t = 2.5)]
    prior_rent_increase_percent: f64,
    #[arg(long, help = "Monthly rent collected from tenants")]
    rental_income: Option<f64>,
    #[arg(long, default_value_t = 2.5)]
    rental_increase_percent: f64,
    #[arg(long, default_value_t = 90.0)]
    occupancy_percent: f64,
    #[arg(long)]
    management_fee_percent: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    utilities_not_covered: f64,
    #[arg(long, help = "Monthly help from a third party")]
    assistance: Option<f64>,
    #[arg(long)]
    mortgage_insurance: Option<f64>,
    #[arg(long)]
    property_insurance: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    property_insurance_increase_percent: f64,
    #[arg(long, help = "Renovation paid in cash at purchase")]
    renovation_cost: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    renovation_value_change: f64,
    #[arg(
        long,
        default_value_t = 0,
        help = "Months before rent saved or rental income begins"
    )]
    occupancy_delay_months: u32,
}

#[derive(Args, Debug, Clone)]
struct BenefitsCli {
    #[arg(long, default_value_t = 1_065.0, help = "Base monthly GIS")]
    gis_monthly: f64,
    #[arg(long, default_value_t = 800.0, help = "Monthly CPP at 65")]
    cpp_monthly: f64,
    #[arg(long, default_value_t = 85)]
    life_expectancy: u32,
    #[arg(long, default_value_t = 0.0)]
    pre_retirement_monthly_income: f64,
    #[arg(long, default_value_t = 0.0)]
    post_retirement_monthly_income: f64,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = 0)]
    retirement_months_delay: u32,
    #[arg(long, default_value_t = Province::On)]
    province: Province,
    #[arg(long, default_value_t = 713.0, help = "Monthly OAS at 65")]
    oas_monthly: f64,
    #[arg(long, default_value_t = 0)]
    oas_delay_months: u32,
    #[arg(long, default_value_t = 1)]
    birth_month: u32,
    #[arg(long, default_value_t = 0.0, help = "Monthly RRIF withdrawal after 71")]
    rrif_monthly: f64,
    #[arg(long, value_enum, default_value_t = CliGisPolicy::TwoTier)]
    gis_policy: CliGisPolicy,
    #[arg(long, default_value_t = 0.0)]
    gis_threshold: f64,
    #[arg(long, default_value_t = 50.0, help = "Single-threshold reduction rate (%)")]
    gis_rate: f64,
    #[arg(long, default_value_t = 5_000.0)]
    gis_lower_threshold: f64,
    #[arg(long, default_value_t = 15_000.0)]
    gis_upper_threshold: f64,
    #[arg(long, default_value_t = 50.0)]
    gis_lower_rate: f64,
    #[arg(long, default_value_t = 100.0)]
    gis_upper_rate: f64,
}

fn parse_rate_period(raw: &str) -> Result<RatePeriod, String> {
    let (years, rate) = raw
        .split_once(':')
        .ok_or_else(|| format!("--rate-period must look like YEARS:RATE, got {raw}"))?;
    let term_years = years
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("--rate-period years in {raw}: {e}"))?;
    let annual_rate = rate
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("--rate-period rate in {raw}: {e}"))?;
    Ok(RatePeriod {
        term_years,
        annual_rate,
    })
}

fn build_record(cli: &ScenarioCli) -> Result<ParameterRecord, String> {
    if cli.residence == CliResidence::Investment && cli.prior_rent.is_some() {
        return Err("--prior-rent only applies to a primary residence".to_string());
    }

    let rate_plan = if cli.rate_periods.is_empty() {
        RatePlan::Fixed {
            annual_rate: cli.annual_rate,
        }
    } else {
        RatePlan::Variable {
            periods: cli.rate_periods.clone(),
        }
    };

    let residence = match cli.residence {
        CliResidence::Primary => Residence::Primary {
            monthly_extra_expenses: cli.monthly_extra_expenses,
        },
        CliResidence::Investment => Residence::Investment,
    };

    let insurance = match (cli.mortgage_insurance, cli.property_insurance) {
        (None, None) => None,
        (mortgage, property) => Some(Insurance {
            mortgage_monthly: mortgage.unwrap_or(0.0),
            property_monthly: property.unwrap_or(0.0),
            property_annual_increase_percent: cli.property_insurance_increase_percent,
        }),
    };

    Ok(ParameterRecord {
        property_price: cli.property_price,
        down_payment_percent: cli.down_payment_percent,
        additional_financed_costs: cli.additional_financed_costs,
        amortization_years: cli.amortization_years,
        rate_plan,
        appreciation_percent: cli.appreciation_percent,
        property_tax_annual: cli.property_tax_annual,
        property_tax_increase_percent: cli.property_tax_increase_percent,
        monthly_maintenance: cli.monthly_maintenance,
        land_transfer_tax: cli.land_transfer_tax,
        agent_fee_percent: cli.agent_fee_percent,
        legal_fees: cli.legal_fees,
        early_break_fee: cli.early_break_fee,
        opportunity_return_monthly_percent: cli.opportunity_return_monthly_percent,
        residence,
        condo: cli.condo_fee.map(|monthly_fee| CondoFees {
            monthly_fee,
            annual_increase_percent: cli.condo_increase_percent,
        }),
        capital_gains: cli.capital_gains_tax_percent.map(|tax_percent| CapitalGains {
            tax_percent,
            inclusion_factor: cli.capital_gains_inclusion_factor,
        }),
        prior_rent: cli.prior_rent.map(|monthly_rent| PriorRent {
            monthly_rent,
            annual_increase_percent: cli.prior_rent_increase_percent,
        }),
        rental: cli.rental_income.map(|monthly_rent| RentalIncome {
            monthly_rent,
            annual_increase_percent: cli.rental_increase_percent,
            occupancy_percent: cli.occupancy_percent,
            management_fee_percent: cli.management_fee_percent,
            utilities_not_covered: cli.utilities_not_covered,
        }),
        assistance: cli.assistance.map(|monthly_amount| Assistance { monthly_amount }),
        insurance,
        renovation: cli.renovation_cost.map(|cost| Renovation {
            cost,
            value_change: cli.renovation_value_change,
        }),
        occupancy_delay_months: cli.occupancy_delay_months,
    })
}

fn build_benefit_inputs(cli: &BenefitsCli) -> BenefitInputs {
    let gis_policy = match cli.gis_policy {
        CliGisPolicy::SingleThreshold => GisReductionPolicy::SingleThreshold {
            threshold: cli.gis_threshold,
            rate: cli.gis_rate / 100.0,
        },
        CliGisPolicy::TwoTier => GisReductionPolicy::TwoTier {
            lower_threshold: cli.gis_lower_threshold,
            upper_threshold: cli.gis_upper_threshold,
            lower_rate: cli.gis_lower_rate / 100.0,
            upper_rate: cli.gis_upper_rate / 100.0,
        },
    };

    BenefitInputs {
        gis_monthly: cli.gis_monthly,
        cpp_monthly: cli.cpp_monthly,
        life_expectancy: cli.life_expectancy,
        pre_retirement_monthly_income: cli.pre_retirement_monthly_income,
        post_retirement_monthly_income: cli.post_retirement_monthly_income,
        retirement_age: cli.retirement_age,
        retirement_months_delay: cli.retirement_months_delay,
        province: cli.province,
        oas_monthly: cli.oas_monthly,
        oas_delay_months: cli.oas_delay_months,
        birth_month: cli.birth_month,
        rrif_monthly: cli.rrif_monthly,
        gis_policy,
    }
}

fn describe_config_error(err: &ConfigError) -> String {
    let mut msg = String::from("invalid configuration:");
    for violation in &err.violations {
        msg.push_str("\n  - ");
        msg.push_str(violation);
    }
    msg
}

pub fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Schedule(cmd) => run_schedule_command(cmd),
        Command::Sweep(cmd) => run_sweep_command(cmd),
        Command::Benefits(cmd) => run_benefits_command(cmd),
    }
}

fn run_schedule_command(cmd: ScheduleCommand) -> Result<(), String> {
    let record = build_record(&cmd.scenario)?;
    let result = run_schedule_observed(&record, &mut LogObserver)
        .map_err(|e| describe_config_error(&e))?;

    println!("{}", record.sheet_name());
    println!("Initial monthly payment: {}", money(result.initial_payment));
    for event in &result.breakevens {
        println!("{}", event.message(&record));
    }
    for scenario in record.applicable_scenarios() {
        if result.breakeven_month(scenario).is_none() {
            println!("{}: never profitable within the term", scenario.column_name());
        }
    }
    if let Some(cash_flow) = &result.cash_flow {
        println!("{cash_flow}");
    }
    if let Some(last) = result.final_month() {
        println!("Profit at end of term: {}", money(last.profits.base));
    }

    if cmd.table {
        println!("{}", schedule_table(&record, &result));
    }

    let csv_path = match (cmd.csv, cmd.csv_dir) {
        (Some(path), _) => Some(path),
        (None, Some(dir)) => Some(default_csv_path(&dir, &record)),
        (None, None) => None,
    };
    if let Some(path) = csv_path {
        export_schedule_csv(&path, &record, &result).map_err(|e| e.to_string())?;
        println!("Schedule written to {}", path.display());
    }
    Ok(())
}

fn run_sweep_command(cmd: SweepCommand) -> Result<(), String> {
    let base = build_record(&cmd.scenario)?;
    let prices = if cmd.prices.is_empty() {
        vec![base.property_price]
    } else {
        cmd.prices
    };
    let rates = if cmd.rates.is_empty() {
        vec![base.rate_plan.headline_rate()]
    } else {
        cmd.rates
    };
    let terms = if cmd.terms.is_empty() {
        vec![base.amortization_years]
    } else {
        cmd.terms
    };

    let result = run_sweep(&base, &prices, &rates, &terms);
    println!("{}", sweep_table(&result));
    Ok(())
}

fn run_benefits_command(cmd: BenefitsCommand) -> Result<(), String> {
    let inputs = build_benefit_inputs(&cmd.inputs);
    let result = optimize_cpp_start(&inputs).map_err(|e| describe_config_error(&e))?;

    if cmd.table {
        println!("{}", benefits_table(&result));
    }
    if let Some(best) = result.best() {
        println!(
            "Best CPP start: age {} + {} months (factor {:.3}), lifetime net income {}",
            best.start_age,
            best.start_month,
            best.cpp_adjustment_factor,
            money(best.total_net_income)
        );
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SchedulePayload {
    property_price: Option<f64>,
    down_payment_percent: Option<f64>,
    additional_financed_costs: Option<f64>,
    amortization_years: Option<u32>,
    annual_rate: Option<f64>,
    rate_periods: Option<Vec<RatePeriod>>,
    appreciation_percent: Option<f64>,
    property_tax_annual: Option<f64>,
    property_tax_increase_percent: Option<f64>,
    monthly_maintenance: Option<f64>,
    land_transfer_tax: Option<f64>,
    agent_fee_percent: Option<f64>,
    legal_fees: Option<f64>,
    early_break_fee: Option<f64>,
    opportunity_return_monthly_percent: Option<f64>,
    residence: Option<ApiResidence>,
    monthly_extra_expenses: Option<f64>,
    condo_fee: Option<f64>,
    condo_increase_percent: Option<f64>,
    capital_gains_tax_percent: Option<f64>,
    capital_gains_inclusion_factor: Option<f64>,
    prior_rent: Option<f64>,
    prior_rent_increase_percent: Option<f64>,
    rental_income: Option<f64>,
    rental_increase_percent: Option<f64>,
    occupancy_percent: Option<f64>,
    management_fee_percent: Option<f64>,
    utilities_not_covered: Option<f64>,
    assistance: Option<f64>,
    mortgage_insurance: Option<f64>,
    property_insurance: Option<f64>,
    property_insurance_increase_percent: Option<f64>,
    renovation_cost: Option<f64>,
    renovation_value_change: Option<f64>,
    occupancy_delay_months: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SweepPayload {
    #[serde(flatten)]
    scenario: SchedulePayload,
    prices: Option<Vec<f64>>,
    rates: Option<Vec<f64>>,
    terms: Option<Vec<u32>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BenefitsPayload {
    gis_monthly: Option<f64>,
    cpp_monthly: Option<f64>,
    life_expectancy: Option<u32>,
    pre_retirement_monthly_income: Option<f64>,
    post_retirement_monthly_income: Option<f64>,
    retirement_age: Option<u32>,
    retirement_months_delay: Option<u32>,
    province: Option<String>,
    oas_monthly: Option<f64>,
    oas_delay_months: Option<u32>,
    birth_month: Option<u32>,
    rrif_monthly: Option<f64>,
    gis_policy: Option<ApiGisPolicy>,
    gis_threshold: Option<f64>,
    gis_rate: Option<f64>,
    gis_lower_threshold: Option<f64>,
    gis_upper_threshold: Option<f64>,
    gis_lower_rate: Option<f64>,
    gis_upper_rate: Option<f64>,
}

#[derive(Debug)]
struct SweepRequest {
    base: ParameterRecord,
    prices: Vec<f64>,
    rates: Vec<f64>,
    terms: Vec<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BreakevenResponse {
    scenario: ProfitScenario,
    column: &'static str,
    month: u32,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CashFlowResponse {
    #[serde(flatten)]
    assessment: CashFlowAssessment,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    sheet_name: String,
    initial_payment: f64,
    scenarios: Vec<ProfitScenario>,
    breakevens: Vec<BreakevenResponse>,
    cash_flow: Option<CashFlowResponse>,
    final_month: Option<MonthlySnapshot>,
    months: Vec<MonthlySnapshot>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
}

#[derive(Debug, Default)]
struct AppState {
    cache: Mutex<ScheduleCache>,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = Arc::new(AppState::default());
    let app = Router::new()
        .route(
            "/api/schedule",
            get(schedule_get_handler).post(schedule_post_handler),
        )
        .route("/api/schedule.csv", post(schedule_csv_handler))
        .route("/api/sweep", post(sweep_handler))
        .route("/api/benefits", post(benefits_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    println!("homeprofit HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/schedule");
    log::info!("server listening addr={addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn schedule_get_handler(
    State(state): State<Arc<AppState>>,
    Query(payload): Query<SchedulePayload>,
) -> Response {
    schedule_handler_impl(&state, payload).await
}

async fn schedule_post_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SchedulePayload>,
) -> Response {
    schedule_handler_impl(&state, payload).await
}

async fn cached_schedule(
    state: &AppState,
    payload: SchedulePayload,
) -> Result<(ParameterRecord, Arc<ScheduleResult>), Response> {
    let record = api_request_from_payload(payload)
        .map_err(|msg| error_response(StatusCode::BAD_REQUEST, &msg))?;
    let result = state
        .cache
        .lock()
        .await
        .get_or_compute(&record)
        .map_err(|err| calc_error_response(&err))?;
    Ok((record, result))
}

async fn schedule_handler_impl(state: &AppState, payload: SchedulePayload) -> Response {
    match cached_schedule(state, payload).await {
        Ok((record, result)) => {
            json_response(StatusCode::OK, build_schedule_response(&record, &result))
        }
        Err(response) => response,
    }
}

async fn schedule_csv_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SchedulePayload>,
) -> Response {
    let (record, result) = match cached_schedule(&state, payload).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let mut body = Vec::new();
    if let Err(err) = write_schedule_csv(&mut body, &record, &result) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
    }
    let disposition = format!("attachment; filename=\"{}.csv\"", record.sheet_name());
    with_cache_control((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn sweep_handler(Json(payload): Json<SweepPayload>) -> Response {
    let request = match sweep_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let result: SweepResult = run_sweep(
        &request.base,
        &request.prices,
        &request.rates,
        &request.terms,
    );
    json_response(StatusCode::OK, result)
}

async fn benefits_handler(Json(payload): Json<BenefitsPayload>) -> Response {
    let inputs = match benefit_inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match optimize_cpp_start(&inputs) {
        Ok(result) => json_response::<BenefitsResult>(StatusCode::OK, result),
        Err(err) => config_error_response(&err),
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            violations: Vec::new(),
        },
    )
}

fn config_error_body(err: &ConfigError) -> ErrorResponse {
    ErrorResponse {
        error: "invalid configuration".to_string(),
        violations: err.violations.clone(),
    }
}

fn config_error_response(err: &ConfigError) -> Response {
    json_response(StatusCode::BAD_REQUEST, config_error_body(err))
}

fn calc_error_response(err: &CalcError) -> Response {
    match err {
        CalcError::Config(config) => config_error_response(config),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ParameterRecord, String> {
    let payload = serde_json::from_str::<SchedulePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn apply_schedule_payload(cli: &mut ScenarioCli, payload: SchedulePayload) {
    if let Some(v) = payload.property_price {
        cli.property_price = v;
    }
    if let Some(v) = payload.down_payment_percent {
        cli.down_payment_percent = v;
    }
    if let Some(v) = payload.additional_financed_costs {
        cli.additional_financed_costs = v;
    }
    if let Some(v) = payload.amortization_years {
        cli.amortization_years = v;
    }
    if let Some(v) = payload.annual_rate {
        cli.annual_rate = v;
    }
    if let Some(v) = payload.rate_periods {
        cli.rate_periods = v;
    }
    if let Some(v) = payload.appreciation_percent {
        cli.appreciation_percent = v;
    }

    if let Some(v) = payload.property_tax_annual {
        cli.property_tax_annual = v;
    }
    if let Some(v) = payload.property_tax_increase_percent {
        cli.property_tax_increase_percent = v;
    }
    if let Some(v) = payload.monthly_maintenance {
        cli.monthly_maintenance = v;
    }
    if let Some(v) = payload.land_transfer_tax {
        cli.land_transfer_tax = v;
    }
    if let Some(v) = payload.agent_fee_percent {
        cli.agent_fee_percent = v;
    }
    if let Some(v) = payload.legal_fees {
        cli.legal_fees = v;
    }
    if let Some(v) = payload.early_break_fee {
        cli.early_break_fee = v;
    }
    if let Some(v) = payload.opportunity_return_monthly_percent {
        cli.opportunity_return_monthly_percent = v;
    }

    if let Some(v) = payload.residence {
        cli.residence = v.into();
    }
    if let Some(v) = payload.monthly_extra_expenses {
        cli.monthly_extra_expenses = v;
    }

    if payload.condo_fee.is_some() {
        cli.condo_fee = payload.condo_fee;
    }
    if let Some(v) = payload.condo_increase_percent {
        cli.condo_increase_percent = v;
    }
    if payload.capital_gains_tax_percent.is_some() {
        cli.capital_gains_tax_percent = payload.capital_gains_tax_percent;
    }
    if let Some(v) = payload.capital_gains_inclusion_factor {
        cli.capital_gains_inclusion_factor = v;
    }
    if payload.prior_rent.is_some() {
        cli.prior_rent = payload.prior_rent;
    }
    if let Some(v) = payload.prior_rent_increase_percent {
        cli.prior_rent_increase_percent = v;
    }

    if payload.rental_income.is_some() {
        cli.rental_income = payload.rental_income;
    }
    if let Some(v) = payload.rental_increase_percent {
        cli.rental_increase_percent = v;
    }
    if let Some(v) = payload.occupancy_percent {
        cli.occupancy_percent = v;
    }
    if payload.management_fee_percent.is_some() {
        cli.management_fee_percent = payload.management_fee_percent;
    }
    if let Some(v) = payload.utilities_not_covered {
        cli.utilities_not_covered = v;
    }
    if payload.assistance.is_some() {
        cli.assistance = payload.assistance;
    }

    if payload.mortgage_insurance.is_some() {
        cli.mortgage_insurance = payload.mortgage_insurance;
    }
    if payload.property_insurance.is_some() {
        cli.property_insurance = payload.property_insurance;
    }
    if let Some(v) = payload.property_insurance_increase_percent {
        cli.property_insurance_increase_percent = v;
    }
    if payload.renovation_cost.is_some() {
        cli.renovation_cost = payload.renovation_cost;
    }
    if let Some(v) = payload.renovation_value_change {
        cli.renovation_value_change = v;
    }
    if let Some(v) = payload.occupancy_delay_months {
        cli.occupancy_delay_months = v;
    }
}

fn api_request_from_payload(payload: SchedulePayload) -> Result<ParameterRecord, String> {
    let mut cli = default_cli_for_api();
    apply_schedule_payload(&mut cli, payload);
    build_record(&cli)
}

fn sweep_request_from_payload(payload: SweepPayload) -> Result<SweepRequest, String> {
    let base = api_request_from_payload(payload.scenario)?;
    let prices = payload.prices.unwrap_or_else(|| vec![base.property_price]);
    let rates = payload
        .rates
        .unwrap_or_else(|| vec![base.rate_plan.headline_rate()]);
    let terms = payload.terms.unwrap_or_else(|| vec![base.amortization_years]);

    let points = prices.len() * rates.len() * terms.len();
    if points == 0 {
        return Err("prices, rates and terms must each list at least one value".to_string());
    }
    if points > MAX_SWEEP_POINTS {
        return Err(format!(
            "sweep has {points} combinations; at most {MAX_SWEEP_POINTS} are allowed"
        ));
    }

    Ok(SweepRequest {
        base,
        prices,
        rates,
        terms,
    })
}

const MAX_SWEEP_POINTS: usize = 500;

fn benefit_inputs_from_payload(payload: BenefitsPayload) -> Result<BenefitInputs, String> {
    let mut cli = default_benefits_cli_for_api();

    if let Some(v) = payload.gis_monthly {
        cli.gis_monthly = v;
    }
    if let Some(v) = payload.cpp_monthly {
        cli.cpp_monthly = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.pre_retirement_monthly_income {
        cli.pre_retirement_monthly_income = v;
    }
    if let Some(v) = payload.post_retirement_monthly_income {
        cli.post_retirement_monthly_income = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.retirement_months_delay {
        cli.retirement_months_delay = v;
    }
    if let Some(v) = payload.province {
        cli.province = v.parse()?;
    }
    if let Some(v) = payload.oas_monthly {
        cli.oas_monthly = v;
    }
    if let Some(v) = payload.oas_delay_months {
        cli.oas_delay_months = v;
    }
    if let Some(v) = payload.birth_month {
        cli.birth_month = v;
    }
    if let Some(v) = payload.rrif_monthly {
        cli.rrif_monthly = v;
    }

    if let Some(v) = payload.gis_policy {
        cli.gis_policy = v.into();
    }
    if let Some(v) = payload.gis_threshold {
        cli.gis_threshold = v;
    }
    if let Some(v) = payload.gis_rate {
        cli.gis_rate = v;
    }
    if let Some(v) = payload.gis_lower_threshold {
        cli.gis_lower_threshold = v;
    }
    if let Some(v) = payload.gis_upper_threshold {
        cli.gis_upper_threshold = v;
    }
    if let Some(v) = payload.gis_lower_rate {
        cli.gis_lower_rate = v;
    }
    if let Some(v) = payload.gis_upper_rate {
        cli.gis_upper_rate = v;
    }

    Ok(build_benefit_inputs(&cli))
}

fn default_cli_for_api() -> ScenarioCli {
    ScenarioCli {
        property_price: 500_000.0,
        down_payment_percent: 20.0,
        additional_financed_costs: 0.0,
        amortization_years: 25,
        annual_rate: 5.0,
        rate_periods: Vec::new(),
        appreciation_percent: 3.0,
        property_tax_annual: 5_000.0,
        property_tax_increase_percent: 2.0,
        monthly_maintenance: 300.0,
        land_transfer_tax: 5_000.0,
        agent_fee_percent: 5.0,
        legal_fees: 2_000.0,
        early_break_fee: 3_000.0,
        opportunity_return_monthly_percent: 0.57,
        residence: CliResidence::Primary,
        monthly_extra_expenses: 0.0,
        condo_fee: None,
        condo_increase_percent: 3.0,
        capital_gains_tax_percent: None,
        capital_gains_inclusion_factor: 0.5,
        prior_rent: None,
        prior_rent_increase_percent: 2.5,
        rental_income: None,
        rental_increase_percent: 2.5,
        occupancy_percent: 90.0,
        management_fee_percent: None,
        utilities_not_covered: 0.0,
        assistance: None,
        mortgage_insurance: None,
        property_insurance: None,
        property_insurance_increase_percent: 0.0,
        renovation_cost: None,
        renovation_value_change: 0.0,
        occupancy_delay_months: 0,
    }
}

fn default_benefits_cli_for_api() -> BenefitsCli {
    BenefitsCli {
        gis_monthly: 1_065.0,
        cpp_monthly: 800.0,
        life_expectancy: 85,
        pre_retirement_monthly_income: 0.0,
        post_retirement_monthly_income: 0.0,
        retirement_age: 65,
        retirement_months_delay: 0,
        province: Province::On,
        oas_monthly: 713.0,
        oas_delay_months: 0,
        birth_month: 1,
        rrif_monthly: 0.0,
        gis_policy: CliGisPolicy::TwoTier,
        gis_threshold: 0.0,
        gis_rate: 50.0,
        gis_lower_threshold: 5_000.0,
        gis_upper_threshold: 15_000.0,
        gis_lower_rate: 50.0,
        gis_upper_rate: 100.0,
    }
}

fn build_schedule_response(record: &ParameterRecord, result: &ScheduleResult) -> ScheduleResponse {
    ScheduleResponse {
        sheet_name: record.sheet_name(),
        initial_payment: result.initial_payment,
        scenarios: record.applicable_scenarios(),
        breakevens: result
            .breakevens
            .iter()
            .map(|event| BreakevenResponse {
                scenario: event.scenario,
                column: event.scenario.column_name(),
                month: event.month,
                message: event.message(record),
            })
            .collect(),
        cash_flow: result.cash_flow.map(|assessment| CashFlowResponse {
            assessment,
            message: assessment.to_string(),
        }),
        final_month: result.final_month().map(MonthlySnapshot::rounded),
        months: result.months.iter().map(MonthlySnapshot::rounded).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::run_schedule;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> ScenarioCli {
        default_cli_for_api()
    }

    #[test]
    fn default_cli_builds_a_valid_fixed_rate_record() {
        let record = build_record(&sample_cli()).expect("valid record");
        assert_eq!(record.rate_plan, RatePlan::Fixed { annual_rate: 5.0 });
        assert!(record.condo.is_none());
        assert!(record.insurance.is_none());
        assert!(run_schedule(&record).is_ok());
    }

    #[test]
    fn rate_periods_switch_to_a_variable_plan() {
        let mut cli = sample_cli();
        cli.rate_periods = vec![
            parse_rate_period("5:4.5").expect("valid period"),
            parse_rate_period(" 20 : 6 ").expect("valid period"),
        ];
        let record = build_record(&cli).expect("valid record");
        assert!(record.rate_plan.is_variable());
        assert_eq!(record.rate_plan.headline_rate(), 4.5);
    }

    #[test]
    fn rate_period_parser_rejects_malformed_values() {
        let err = parse_rate_period("5").expect_err("missing rate");
        assert!(err.contains("YEARS:RATE"));
        assert!(parse_rate_period("five:4").is_err());
        assert!(parse_rate_period("5:abc").is_err());
    }

    #[test]
    fn build_record_rejects_prior_rent_on_investment() {
        let mut cli = sample_cli();
        cli.residence = CliResidence::Investment;
        cli.prior_rent = Some(1_500.0);
        let err = build_record(&cli).expect_err("must reject");
        assert!(err.contains("--prior-rent"));
    }

    #[test]
    fn insurance_is_present_when_either_premium_is_given() {
        let mut cli = sample_cli();
        cli.property_insurance = Some(120.0);
        cli.property_insurance_increase_percent = 3.0;
        let record = build_record(&cli).expect("valid record");
        assert_eq!(
            record.insurance,
            Some(Insurance {
                mortgage_monthly: 0.0,
                property_monthly: 120.0,
                property_annual_increase_percent: 3.0,
            })
        );
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "propertyPrice": 650000,
          "downPaymentPercent": 10,
          "amortizationYears": 30,
          "ratePeriods": [
            { "termYears": 5, "annualRate": 4.2 },
            { "termYears": 25, "annualRate": 5.5 }
          ],
          "residence": "investment",
          "rentalIncome": 3200,
          "occupancyPercent": 92,
          "managementFeePercent": 8,
          "assistance": 400,
          "condoFee": 550,
          "capitalGainsTaxPercent": 43,
          "occupancyDelayMonths": 2
        }"#;
        let record = api_request_from_json(json).expect("json should parse");

        assert_approx(record.property_price, 650_000.0);
        assert_approx(record.down_payment_percent, 10.0);
        assert_eq!(record.amortization_years, 30);
        assert_eq!(record.residence, Residence::Investment);
        assert_eq!(record.occupancy_delay_months, 2);
        assert!(record.rate_plan.is_variable());

        let rental = record.rental.expect("rental income");
        assert_approx(rental.monthly_rent, 3_200.0);
        assert_approx(rental.occupancy_percent, 92.0);
        assert_eq!(rental.management_fee_percent, Some(8.0));
        assert_approx(record.condo.expect("condo").monthly_fee, 550.0);
        assert_approx(record.capital_gains.expect("gains").inclusion_factor, 0.5);
        assert_approx(record.assistance.expect("help").monthly_amount, 400.0);
        assert!(record.prior_rent.is_none());
    }

    #[test]
    fn api_request_from_json_rejects_unknown_residence() {
        let err = api_request_from_json(r#"{ "residence": "castle" }"#).expect_err("must reject");
        assert!(err.starts_with("Invalid API JSON payload"));
    }

    #[test]
    fn empty_payload_uses_api_defaults() {
        let record = api_request_from_json("{}").expect("json should parse");
        assert_eq!(record, build_record(&default_cli_for_api()).expect("valid"));
    }

    #[test]
    fn sweep_payload_defaults_axes_to_the_base_scenario() {
        let payload: SweepPayload =
            serde_json::from_str(r#"{ "propertyPrice": 450000, "rates": [4, 5, 6] }"#)
                .expect("json should parse");
        let request = sweep_request_from_payload(payload).expect("valid sweep");
        assert_eq!(request.prices, vec![450_000.0]);
        assert_eq!(request.rates, vec![4.0, 5.0, 6.0]);
        assert_eq!(request.terms, vec![25]);

        let payload: SweepPayload =
            serde_json::from_str(r#"{ "terms": [] }"#).expect("json should parse");
        assert!(sweep_request_from_payload(payload).is_err());
    }

    #[test]
    fn benefits_payload_selects_gis_policy_and_province() {
        let payload: BenefitsPayload = serde_json::from_str(
            r#"{
              "gisPolicy": "single-threshold",
              "gisThreshold": 2000,
              "gisRate": 40,
              "province": "bc",
              "lifeExpectancy": 92
            }"#,
        )
        .expect("json should parse");
        let inputs = benefit_inputs_from_payload(payload).expect("valid inputs");
        assert_eq!(inputs.province, Province::Bc);
        assert_eq!(inputs.life_expectancy, 92);
        assert_eq!(
            inputs.gis_policy,
            GisReductionPolicy::SingleThreshold {
                threshold: 2_000.0,
                rate: 0.4
            }
        );

        let payload: BenefitsPayload =
            serde_json::from_str(r#"{ "province": "XX" }"#).expect("json should parse");
        let err = benefit_inputs_from_payload(payload).expect_err("must reject");
        assert!(err.contains("XX"));
    }

    #[test]
    fn default_benefit_inputs_are_valid_two_tier() {
        let inputs = build_benefit_inputs(&default_benefits_cli_for_api());
        assert_eq!(inputs.gis_policy, GisReductionPolicy::two_tier());
        assert!(optimize_cpp_start(&inputs).is_ok());
    }

    #[test]
    fn schedule_response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.residence = CliResidence::Investment;
        cli.rental_income = Some(2_800.0);
        let record = build_record(&cli).expect("valid record");
        let result = run_schedule(&record).expect("valid schedule");

        let response = build_schedule_response(&record, &result);
        let json = serde_json::to_value(&response).expect("serializable");

        assert_eq!(json["sheetName"], "$500000_5%_25years");
        assert_eq!(json["initialPayment"], 2338.36);
        assert_eq!(json["months"].as_array().map(Vec::len), Some(300));
        assert_eq!(json["scenarios"][1], "rental-income");
        assert!(json["cashFlow"]["status"].is_string());
        assert!(json["cashFlow"]["message"].is_string());
        assert!(json["finalMonth"]["profits"]["rentalIncome"].is_number());
        assert!(json["months"][0]["profits"].get("rentSaved").is_none());
    }

    #[test]
    fn config_errors_serialize_every_violation() {
        let mut cli = sample_cli();
        cli.amortization_years = 0;
        cli.down_payment_percent = 1.0;
        let record = build_record(&cli).expect("structurally valid");
        let err = run_schedule(&record).expect_err("must reject");

        let json = serde_json::to_value(config_error_body(&err)).expect("serializable");
        assert_eq!(json["error"], "invalid configuration");
        assert_eq!(json["violations"].as_array().map(Vec::len), Some(2));

        let described = describe_config_error(&err);
        assert_eq!(described.lines().count(), 3);
    }

    #[test]
    fn plain_errors_omit_violations() {
        let body = ErrorResponse {
            error: "Not found".to_string(),
            violations: Vec::new(),
        };
        let json = serde_json::to_value(&body).expect("serializable");
        assert!(json.get("violations").is_none());
    }
}
