/*
 * Created on Wed Sep 30 2026
 *
 * This file is a part of crdb-harness
 * crdb-harness is an experiment harness that benchmarks a baseline and a
 * modified ("thesis") build of CockroachDB under YCSB and TPC-C workloads
 * and compares the two builds statistically.
 *
 * Copyright (c) 2026, the crdb-harness authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! Mid-run fault injection: a scheduled restart of one server node

use {
    crate::{HarnessError, HarnessResult},
    crossbeam_channel::{after, bounded, select, Sender},
    std::{fmt, str::FromStr, thread, time::Duration},
};

/// When the restart fires, as a fraction of the configured workload duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartTiming {
    pub numerator: u32,
    pub denominator: u32,
}

impl RestartTiming {
    pub fn delay_for(&self, duration: Duration) -> Duration {
        duration
            .checked_div(self.denominator)
            .unwrap_or_default()
            .saturating_mul(self.numerator)
    }
}

impl Default for RestartTiming {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 3,
        }
    }
}

impl fmt::Display for RestartTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for RestartTiming {
    type Err = HarnessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || HarnessError::BadArguments(format!("expected a ratio like `4/3`, got `{s}`"));
        let (num, den) = s.split_once('/').ok_or_else(bad)?;
        let numerator: u32 = num.trim().parse().map_err(|_| bad())?;
        let denominator: u32 = den.trim().parse().map_err(|_| bad())?;
        if denominator == 0 {
            return Err(bad());
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    /// 1-based index of the node to restart
    pub node: usize,
    pub timing: RestartTiming,
}

impl FaultPlan {
    pub fn delay(&self, duration: Duration) -> Duration {
        self.timing.delay_for(duration)
    }
}

/// A one-shot action running on its own thread after a delay. Dropping the task
/// cancels it if it has not fired yet and waits for the thread to finish
pub struct ScheduledTask {
    label: String,
    cancel: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<bool>>,
}

impl ScheduledTask {
    pub fn spawn(
        label: impl Into<String>,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> HarnessResult<Self> {
        let label = label.into();
        let (tx, rx) = bounded::<()>(1);
        let timer = after(delay);
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                select! {
                    // a message or a dropped sender both mean cancellation
                    recv(rx) -> _ => false,
                    recv(timer) -> _ => {
                        action();
                        true
                    }
                }
            })
            .map_err(|e| {
                HarnessError::Other(format!("Failed to spawn thread for `{label}`: {e}"))
            })?;
        debug!("Scheduled `{label}` to fire in {delay:?}");
        Ok(Self {
            label,
            cancel: Some(tx),
            handle: Some(handle),
        })
    }
    /// Cancel the task (if it hasn't fired) and return whether it fired
    #[cfg(test)]
    pub fn finish(mut self) -> bool {
        self.join()
    }
    fn join(&mut self) -> bool {
        drop(self.cancel.take());
        match self.handle.take() {
            Some(handle) => {
                let fired = handle.join().unwrap_or(false);
                if !fired {
                    debug!("Cancelled `{}` before it fired", self.label);
                }
                fired
            }
            None => false,
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Instant,
    };

    #[test]
    fn default_restart_lands_at_four_thirds() {
        let plan = FaultPlan {
            node: 3,
            timing: RestartTiming::default(),
        };
        assert_eq!(plan.delay(Duration::from_secs(300)), Duration::from_secs(400));
    }

    #[test]
    fn parse_timing() {
        let t: RestartTiming = "2/3".parse().unwrap();
        assert_eq!(t.delay_for(Duration::from_secs(300)), Duration::from_secs(200));
        assert_eq!(t.to_string(), "2/3");
        assert!("1/0".parse::<RestartTiming>().is_err());
        assert!("half".parse::<RestartTiming>().is_err());
    }

    #[test]
    fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = ScheduledTask::spawn("restart", Duration::from_millis(10), move || {
            flag.store(true, Ordering::SeqCst)
        })
        .unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(task.finish());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let start = Instant::now();
        let task = ScheduledTask::spawn("restart", Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst)
        })
        .unwrap();
        drop(task);
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
