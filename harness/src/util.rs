/*
 * Created on Thu Oct 08 2026
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
    crate::{HarnessError, HarnessResult},
    std::{
        env,
        fs,
        path::{Path, PathBuf},
        process::{Child, Command, Output, Stdio},
        thread,
        time::Duration,
    },
};

pub type ExitCode = Option<i32>;

pub fn get_var(var: &str) -> Option<String> {
    env::var_os(var).map(|v| v.to_string_lossy().to_string())
}

/// Renders the command for log output
pub fn describe_command(cmd: &Command) -> String {
    let mut ret = cmd.get_program().to_string_lossy().to_string();
    for arg in cmd.get_args() {
        ret.push(' ');
        ret.push_str(&arg.to_string_lossy());
    }
    ret
}

pub fn get_child(desc: impl ToString, mut input: Command) -> HarnessResult<Child> {
    let desc = desc.to_string();
    debug!("Spawning `{desc}`: {}", describe_command(&input));
    match input.spawn() {
        Ok(child) => Ok(child),
        Err(e) => Err(HarnessError::Other(format!(
            "Failed to spawn process for `{desc}` with error: {e}"
        ))),
    }
}

fn check_child_err(desc: impl ToString, output: Output) -> HarnessResult<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    error!("The child failed with stderr: `{stderr}` and stdout: `{stdout}`");
    Err(HarnessError::ChildError(
        desc.to_string(),
        output.status.code(),
    ))
}

pub fn ensure_child_success(id: &str, child: Child) -> HarnessResult<()> {
    let r = child
        .wait_with_output()
        .map_err(|e| HarnessError::Other(format!("Failed to get child output with error: {e}")))?;
    if r.status.success() {
        Ok(())
    } else {
        check_child_err(id, r)
    }
}

/// Run the command to completion, failing if it exits unsuccessfully
pub fn handle_child(desc: &str, input: Command) -> HarnessResult<()> {
    let child = self::get_child(desc, input)?;
    ensure_child_success(desc, child)
}

/// Run the command to completion with captured pipes and return the raw output
/// regardless of its exit status
pub fn capture_child(desc: &str, mut input: Command) -> HarnessResult<Output> {
    input.stdout(Stdio::piped()).stderr(Stdio::piped());
    let child = self::get_child(desc, input)?;
    child
        .wait_with_output()
        .map_err(|e| HarnessError::Other(format!("Failed to get output of `{desc}` with error: {e}")))
}

/// Run the command to completion and return its stdout
pub fn handle_child_output(desc: &str, input: Command) -> HarnessResult<String> {
    let output = capture_child(desc, input)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        check_child_err(desc, output).map(|_| String::new())
    }
}

pub fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration)
    }
}

pub fn create_dir_all(path: impl AsRef<Path>) -> HarnessResult<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|e| {
        HarnessError::Other(format!(
            "Failed to create dir `{}` with error: {e}",
            path.display()
        ))
    })
}

/// Bind mounts need absolute host paths
pub fn absolute(path: impl AsRef<Path>) -> HarnessResult<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Formats a duration the way Go's `time.ParseDuration` accepts it
pub fn go_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[macro_export]
macro_rules! cmd {
    ($base:expr, $($cmd:expr),*) => {{
        let mut cmd = ::std::process::Command::new($base);
        $(
            cmd.arg($cmd);
        )*
        cmd
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_durations() {
        assert_eq!(go_duration(Duration::from_secs(300)), "300s");
        assert_eq!(go_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(go_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn command_description() {
        let cmd = cmd!("docker", "stop", "server-1");
        assert_eq!(describe_command(&cmd), "docker stop server-1");
        let cmd = cmd!("terraform", "apply", "-auto-approve", "-var=cluster_size=3");
        assert_eq!(
            describe_command(&cmd),
            "terraform apply -auto-approve -var=cluster_size=3"
        );
    }
}
