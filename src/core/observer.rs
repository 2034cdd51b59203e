use super::types::{BreakevenEvent, MonthlySnapshot};

pub trait SimulationObserver {
    fn payment_reset(&mut self, _month: u32, _annual_rate: f64, _payment: f64) {}

    fn annual_escalation(&mut self, _month: u32) {}

    fn month_completed(&mut self, _snapshot: &MonthlySnapshot) {}

    fn breakeven(&mut self, _event: &BreakevenEvent) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SimulationObserver for NoopObserver {}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SimulationObserver for LogObserver {
    fn payment_reset(&mut self, month: u32, annual_rate: f64, payment: f64) {
        log::debug!("month={month} schedule: payment set to {payment:.2} at {annual_rate}%");
    }

    fn annual_escalation(&mut self, month: u32) {
        log::trace!("month={month} schedule: annual escalators applied");
    }

    fn month_completed(&mut self, snapshot: &MonthlySnapshot) {
        log::trace!(
            "month={} schedule: balance={:.2} value={:.2} profit={:.2}",
            snapshot.month,
            snapshot.balance,
            snapshot.property_value,
            snapshot.profits.base
        );
    }

    fn breakeven(&mut self, event: &BreakevenEvent) {
        log::info!(
            "month={} schedule: {} turned positive",
            event.month,
            event.scenario.column_name()
        );
    }
}
