/*
 * Created on Wed Sep 09 2026
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

//! The one place argument vectors become shell strings. Remote hosts are driven
//! through `ssh`, which only takes a single command string; everything else in the
//! harness passes argument vectors directly

use std::{borrow::Cow, time::Duration};

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '=' | '@' | '%' | '+')
}

/// POSIX single-quote `arg` unless it is made up of characters the shell never
/// interprets
pub fn quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_safe) {
        return Cow::Borrowed(arg);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            // close, emit an escaped quote, reopen
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

pub fn render<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| quote(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A sequence of commands run one after the other, stopping at the first failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellScript {
    steps: Vec<String>,
    stdout: Option<String>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn step<S: AsRef<str>>(mut self, argv: &[S]) -> Self {
        self.steps.push(render(argv));
        self
    }
    pub fn sleep(self, duration: Duration) -> Self {
        let secs = duration.as_secs().to_string();
        self.step(&["sleep", secs.as_str()])
    }
    /// Redirect the stdout of the last step into `path`
    pub fn stdout_to(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }
    pub fn render(&self) -> String {
        let mut script = self.steps.join(" && ");
        if let Some(path) = &self.stdout {
            script.push_str(" > ");
            script.push_str(&quote(path));
        }
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_stay_bare() {
        assert_eq!(quote("--join=server-1:26257,server-2:26257"), "--join=server-1:26257,server-2:26257");
        assert_eq!(
            quote("postgresql://root@server-1:26257"),
            "postgresql://root@server-1:26257"
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("$HOME"), "'$HOME'");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("a?b"), "'a?b'");
        assert_eq!(quote("{{.State.Running}}"), "'{{.State.Running}}'");
        assert_eq!(quote("x;rm -rf /"), "'x;rm -rf /'");
    }

    #[test]
    fn render_argv() {
        assert_eq!(
            render(&["sudo", "docker", "inspect", "-f", "{{.State.Running}}", "client"]),
            "sudo docker inspect -f '{{.State.Running}}' client"
        );
        let empty: [&str; 0] = [];
        assert_eq!(render(&empty), "");
    }

    #[test]
    fn scripts() {
        let script = ShellScript::new()
            .step(&["./cockroach", "init", "--insecure"])
            .sleep(Duration::from_secs(5))
            .step(&["echo", "a b"])
            .stdout_to("/var/experiment/data/client.txt");
        assert_eq!(
            script.render(),
            "./cockroach init --insecure && sleep 5 && echo 'a b' > /var/experiment/data/client.txt"
        );
        assert_eq!(ShellScript::new().render(), "");
    }
}
