/*
 * Created on Thu Oct 01 2026
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

//! Bounded polling. Every wait in the harness (a server coming up, a remote client
//! finishing, an artifact appearing) goes through [`poll_until`], so no wait can block
//! for longer than `interval * max_attempts`

use {
    crate::{util, HarnessResult},
    std::{fmt, time::Duration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
    /// The longest a poll with this policy can take
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Reached { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub const fn reached(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }
}

/// Calls `predicate` (with the 1-based attempt number) until it returns true or the
/// attempts run out, sleeping for the policy interval between attempts
pub fn poll_until(policy: PollPolicy, mut predicate: impl FnMut(u32) -> bool) -> PollOutcome {
    for attempt in 1..=policy.max_attempts {
        if predicate(attempt) {
            return PollOutcome::Reached { attempts: attempt };
        }
        if attempt < policy.max_attempts {
            util::sleep(policy.interval);
        }
    }
    PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Started,
    Ended,
}

impl ProcessState {
    /// Whether a probe reporting `running` means this state was reached
    pub const fn matches(&self, running: bool) -> bool {
        match self {
            Self::Started => running,
            Self::Ended => !running,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Ended => f.write_str("ended"),
        }
    }
}

/// Wait for the process described by `desc` to reach `target`. `probe` reports whether
/// the process is currently running; a failing probe counts as "not yet". Exhausting
/// the policy is logged and returned, never raised
pub fn await_state(
    desc: &str,
    target: ProcessState,
    policy: PollPolicy,
    mut probe: impl FnMut() -> HarnessResult<bool>,
) -> PollOutcome {
    info!("Waiting for {desc} to have {target}");
    let outcome = poll_until(policy, |attempt| match probe() {
        Ok(running) if target.matches(running) => true,
        Ok(_) => {
            info!(
                "{desc} has not {target} yet ({attempt}/{}). Sleeping for {:?} ...",
                policy.max_attempts, policy.interval
            );
            false
        }
        Err(e) => {
            warn!("Status probe for {desc} failed ({attempt}/{}): {e}", policy.max_attempts);
            false
        }
    });
    match outcome {
        PollOutcome::Reached { attempts } => {
            info!("{desc} has {target} (after {attempts} attempt(s))")
        }
        PollOutcome::Exhausted { attempts } => warn!(
            "{desc} had not {target} after {attempts} attempt(s) ({:?}). Proceeding anyway",
            policy.budget()
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HarnessError;

    const FAST: PollPolicy = PollPolicy::new(Duration::ZERO, 5);

    #[test]
    fn stops_at_first_success() {
        let mut calls = 0;
        let outcome = poll_until(FAST, |attempt| {
            calls += 1;
            attempt == 3
        });
        assert_eq!(outcome, PollOutcome::Reached { attempts: 3 });
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_without_blocking_forever() {
        let mut calls = 0;
        let outcome = poll_until(FAST, |_| {
            calls += 1;
            false
        });
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 5 });
        assert!(!outcome.reached());
        assert_eq!(calls, 5);
    }

    #[test]
    fn budget() {
        let p = PollPolicy::new(Duration::from_secs(10), 4);
        assert_eq!(p.budget(), Duration::from_secs(30));
        assert_eq!(PollPolicy::new(Duration::from_secs(10), 0).budget(), Duration::ZERO);
    }

    #[test]
    fn await_end_treats_probe_errors_as_pending() {
        let mut answers = vec![
            Ok(true),
            Err(HarnessError::Other("ssh flaked".to_owned())),
            Ok(false),
        ]
        .into_iter();
        let outcome = await_state("client", ProcessState::Ended, FAST, || {
            answers.next().unwrap_or(Ok(false))
        });
        assert_eq!(outcome, PollOutcome::Reached { attempts: 3 });
    }

    #[test]
    fn await_start() {
        let outcome = await_state("server-1", ProcessState::Started, FAST, || Ok(true));
        assert_eq!(outcome, PollOutcome::Reached { attempts: 1 });
        let outcome = await_state("server-1", ProcessState::Started, FAST, || Ok(false));
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 5 });
    }
}
