use std::env::args;
use std::str::FromStr;
use std::string::ToString;
use std::sync::Arc;

use fair_rwlock::error::HarnessError;
use fair_rwlock::fair_lock::FairRwLock;
use fair_rwlock::harness::{ExecutionGroup, GroupConfig, LockStatus, Role};
use strum::IntoEnumIterator;
use strum_macros::{self, Display, EnumIter, EnumString};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    args()
        .nth(1)
        .ok_or(format!(
            "no scenario supplied, use one of {}",
            Scenario::iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .join(",")
        ))
        .and_then(|selector| Scenario::from_str(&selector).map_err(|e| e.to_string()))
        .and_then(|scenario| scenario.play().map_err(|e| e.to_string()))
}

/// Who requests the lock, in this order: W - writer, R - reader
#[derive(EnumIter, EnumString, Display, Clone, Copy)]
#[strum(serialize_all = "snake_case")]
enum Scenario {
    Www,
    Wrr,
    Wrw,
    Wrwr,
    Rw,
    Rrr,
    Rrw,
    Rwr,
}

impl Scenario {
    fn roles(self) -> &'static [Role] {
        use fair_rwlock::harness::Role::{Reader as R, Writer as W};
        match self {
            Scenario::Www => &[W, W, W],
            Scenario::Wrr => &[W, R, R],
            Scenario::Wrw => &[W, R, W],
            Scenario::Wrwr => &[W, R, W, R],
            Scenario::Rw => &[R, W],
            Scenario::Rrr => &[R, R, R],
            Scenario::Rrw => &[R, R, W],
            Scenario::Rwr => &[R, W, R],
        }
    }

    /// lock in order, then let the tasks complete one by one, showing the statuses after each step
    fn play(self) -> Result<(), HarnessError> {
        let mut group: ExecutionGroup =
            ExecutionGroup::with_config(Arc::new(FairRwLock::new()), GroupConfig::from_env()?);

        let mut handles = Vec::new();
        for role in self.roles() {
            let task = group.create_task(*role)?;
            handles.push(task.spawn()?);
        }

        group.await_ready_to_lock()?;
        group.lock_in_order()?;
        println!("{self} locked in order: {}", render(&group.statuses()));

        for seq in 0..group.len() {
            group.complete_execution(seq)?;
            println!("{self} completed #{seq}:     {}", render(&group.statuses()));
        }

        for handle in handles {
            handle.join()?;
        }
        Ok(())
    }
}

fn render(statuses: &[LockStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}
