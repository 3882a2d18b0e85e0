/*
 * Created on Wed Sep 23 2026
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

use {
    crate::{config::RunIdentity, util::ExitCode},
    libstats::StatsError,
    std::{fmt, io, path::PathBuf},
};

pub type HarnessResult<T> = Result<T, HarnessError>;
#[derive(Debug)]
pub enum HarnessError {
    /// Bad arguments
    BadArguments(String),
    /// Missing or inconsistent configuration
    Config(String),
    /// Child process failure
    ChildError(String, ExitCode),
    /// The workload client exited unsuccessfully
    Workload(ExitCode),
    /// A run artifact never showed up on the remote host
    ArtifactMissing(String),
    /// A telemetry file could not be read or decoded
    Telemetry(PathBuf, String),
    /// A failure in one step of a single run
    InRun {
        run: RunIdentity,
        step: &'static str,
        source: Box<HarnessError>,
    },
    /// An I/O error
    Io(io::Error),
    /// Other error
    Other(String),
}

impl HarnessError {
    pub fn in_run(self, run: RunIdentity, step: &'static str) -> Self {
        Self::InRun {
            run,
            step,
            source: Box::new(self),
        }
    }
    /// Errors that invalidate one run and leave the rest of the experiment intact
    pub fn is_run_local(&self) -> bool {
        match self {
            Self::Workload(_) | Self::ArtifactMissing(_) => true,
            Self::InRun { source, .. } => source.is_run_local(),
            _ => false,
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::BadArguments(arg) => write!(f, "Bad arguments: `{}`", arg),
            HarnessError::Config(e) => write!(f, "Configuration error: {e}"),
            HarnessError::ChildError(desc, code) => match code {
                Some(code) => write!(f, "The child (`{desc}`) exited with code {code}"),
                None => write!(f, "The child (`{desc}`) exited with a non-zero code"),
            },
            HarnessError::Workload(code) => match code {
                Some(code) => write!(f, "The workload client exited with code {code}"),
                None => write!(f, "The workload client was terminated"),
            },
            HarnessError::ArtifactMissing(file) => {
                write!(f, "The artifact `{file}` never became available")
            }
            HarnessError::Telemetry(path, reason) => {
                write!(f, "Bad telemetry in `{}`: {reason}", path.display())
            }
            HarnessError::InRun { run, step, source } => {
                write!(f, "{run} failed while trying to {step}: {source}")
            }
            HarnessError::Io(e) => write!(f, "I/O error: {e}"),
            HarnessError::Other(other) => write!(f, "{other}"),
        }
    }
}

impl std::error::Error for HarnessError {}

impl From<io::Error> for HarnessError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(format!("JSON error: {e}"))
    }
}

impl From<csv::Error> for HarnessError {
    fn from(e: csv::Error) -> Self {
        Self::Other(format!("CSV error: {e}"))
    }
}

impl From<StatsError> for HarnessError {
    fn from(e: StatsError) -> Self {
        Self::Other(format!("Statistics error: {e}"))
    }
}
