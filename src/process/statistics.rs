use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::communication::{TestDescriptor, TestStatistics};

/// Where the reporter gets statistics from.
pub trait StatisticsSource: Send + Sync {
    /// Tests registered since the previous call, or `None` if there are
    /// none.
    fn new_tests(&self) -> Option<Vec<TestDescriptor>>;

    /// Per-test counters accumulated since the previous call. Tests with
    /// nothing new are left out.
    fn take_delta(&self) -> Vec<TestStatistics>;

    /// A human-readable table of the totals.
    fn render_summary(&self) -> String;
}

#[derive(Debug, Default)]
struct TestEntry {
    description: String,
    total: TestStatistics,
    reported: TestStatistics,
}

#[derive(Debug, Default)]
struct RegistryState {
    tests: BTreeMap<u32, TestEntry>,
    unannounced: Vec<TestDescriptor>,
}

/// Simple per-test success, error and time counters.
#[derive(Debug, Default)]
pub struct TestRegistry {
    state: Mutex<RegistryState>,
}

impl TestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a test. Registering the same number again is a no-op.
    pub fn register(&self, number: u32, description: &str) {
        let mut state = self.lock();
        if state.tests.contains_key(&number) {
            return;
        }
        state.tests.insert(
            number,
            TestEntry {
                description: description.to_owned(),
                total: TestStatistics {
                    test: number,
                    ..TestStatistics::default()
                },
                reported: TestStatistics {
                    test: number,
                    ..TestStatistics::default()
                },
            },
        );
        state.unannounced.push(TestDescriptor {
            number,
            description: description.to_owned(),
        });
    }

    /// Records one execution of a registered test. Unknown tests are
    /// ignored.
    pub fn record(&self, number: u32, success: bool, elapsed: Duration) {
        let mut state = self.lock();
        let Some(entry) = state.tests.get_mut(&number) else {
            return;
        };
        if success {
            entry.total.successes = entry.total.successes.saturating_add(1);
            let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            entry.total.total_time_ms = entry.total.total_time_ms.saturating_add(millis);
        } else {
            entry.total.errors = entry.total.errors.saturating_add(1);
        }
    }

    /// Lifetime totals for `number`.
    #[must_use]
    pub fn totals(&self, number: u32) -> Option<TestStatistics> {
        self.lock().tests.get(&number).map(|entry| entry.total.clone())
    }
}

impl StatisticsSource for TestRegistry {
    fn new_tests(&self) -> Option<Vec<TestDescriptor>> {
        let mut state = self.lock();
        if state.unannounced.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.unannounced))
    }

    fn take_delta(&self) -> Vec<TestStatistics> {
        let mut state = self.lock();
        let mut delta = Vec::new();
        for (number, entry) in &mut state.tests {
            let change = TestStatistics {
                test: *number,
                successes: entry.total.successes.saturating_sub(entry.reported.successes),
                errors: entry.total.errors.saturating_sub(entry.reported.errors),
                total_time_ms: entry
                    .total
                    .total_time_ms
                    .saturating_sub(entry.reported.total_time_ms),
            };
            if change.successes == 0 && change.errors == 0 {
                continue;
            }
            entry.reported = entry.total.clone();
            delta.push(change);
        }
        delta
    }

    fn render_summary(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        let written = write_summary(&mut out, &state);
        written.map_or_else(|_err| String::new(), |()| out)
    }
}

fn write_summary(out: &mut String, state: &RegistryState) -> fmt::Result {
    writeln!(
        out,
        "{:<8} {:>10} {:>10} {:>14}  Description",
        "Test", "Successes", "Errors", "Mean (ms)"
    )?;
    let mut totals = TestStatistics::default();
    for (number, entry) in &state.tests {
        writeln!(
            out,
            "{:<8} {:>10} {:>10} {:>14}  {}",
            format!("Test {}", number),
            entry.total.successes,
            entry.total.errors,
            format_mean(&entry.total),
            entry.description
        )?;
        totals.successes = totals.successes.saturating_add(entry.total.successes);
        totals.errors = totals.errors.saturating_add(entry.total.errors);
        totals.total_time_ms = totals
            .total_time_ms
            .saturating_add(entry.total.total_time_ms);
    }
    write!(
        out,
        "{:<8} {:>10} {:>10} {:>14}",
        "Totals",
        totals.successes,
        totals.errors,
        format_mean(&totals)
    )
}

/// Mean time per success to two decimal places, using integer hundredths.
fn format_mean(stats: &TestStatistics) -> String {
    let Some(hundredths) = stats
        .total_time_ms
        .saturating_mul(100)
        .checked_div(stats.successes)
    else {
        return "-".to_owned();
    };
    format!(
        "{}.{:02}",
        hundredths.checked_div(100).unwrap_or_default(),
        hundredths.checked_rem(100).unwrap_or_default()
    )
}
