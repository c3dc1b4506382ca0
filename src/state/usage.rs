use crate::types::TokenUsage;
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

pub const INPUT_PRICE_PER_MILLION: f64 = 0.55;
pub const OUTPUT_PRICE_PER_MILLION: f64 = 2.19;
pub const CACHED_PRICE_PER_MILLION: f64 = 0.14;
/// Fraction of the list price paid inside the off-peak window.
pub const OFF_PEAK_MULTIPLIER: f64 = 0.25;

const OFF_PEAK_START: (u32, u32) = (16, 30);

/// Off-peak runs from 16:30 to 00:30 UTC. Both minute-30 boundaries are inclusive.
pub fn is_off_peak(at: DateTime<Utc>) -> bool {
    let (hour, minute) = (at.hour(), at.minute());
    (hour == 16 && minute >= 30) || hour > 16 || (hour == 0 && minute <= 30)
}

/// Time left until the next off-peak window opens; `None` while already inside it.
pub fn time_until_off_peak(now: DateTime<Utc>) -> Option<Duration> {
    if is_off_peak(now) {
        return None;
    }
    let start = NaiveTime::from_hms_opt(OFF_PEAK_START.0, OFF_PEAK_START.1, 0)?;
    let opens = now.date_naive().and_time(start).and_utc();
    Some(opens - now)
}

/// Running token counters. `off_peak` is the subset recorded inside the off-peak window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters {
    pub total: TokenUsage,
    pub off_peak: TokenUsage,
}

impl UsageCounters {
    pub fn record(&mut self, usage: TokenUsage, at: DateTime<Utc>) {
        add_usage(&mut self.total, usage);
        if is_off_peak(at) {
            add_usage(&mut self.off_peak, usage);
        }
    }

    pub fn regular(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.total.input_tokens - self.off_peak.input_tokens,
            output_tokens: self.total.output_tokens - self.off_peak.output_tokens,
            cached_tokens: self.total.cached_tokens - self.off_peak.cached_tokens,
        }
    }
}

fn add_usage(into: &mut TokenUsage, usage: TokenUsage) {
    into.input_tokens += usage.input_tokens;
    into.output_tokens += usage.output_tokens;
    into.cached_tokens += usage.cached_tokens;
}

fn list_price(usage: TokenUsage) -> f64 {
    (usage.input_tokens as f64 * INPUT_PRICE_PER_MILLION
        + usage.output_tokens as f64 * OUTPUT_PRICE_PER_MILLION
        + usage.cached_tokens as f64 * CACHED_PRICE_PER_MILLION)
        / 1_000_000.0
}

/// Dollar cost derived from the counters; never stored.
pub fn estimate_cost(counters: &UsageCounters) -> f64 {
    list_price(counters.regular()) + list_price(counters.off_peak) * OFF_PEAK_MULTIPLIER
}
