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

//! The container runtime. Everything is issued as a `docker` argument vector

use {
    crate::{util, HarnessError, HarnessResult},
    std::{
        fs::File,
        path::{Path, PathBuf},
        process::{Command, Stdio},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub tag: String,
    pub build_args: Vec<(String, String)>,
}

impl ImageBuild {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_owned(),
            "-f".to_owned(),
            self.dockerfile.to_string_lossy().to_string(),
        ];
        for (k, v) in &self.build_args {
            args.push("--build-arg".to_owned());
            args.push(format!("{k}={v}"));
        }
        args.push("-t".to_owned());
        args.push(self.tag.clone());
        args.push(self.context.to_string_lossy().to_string());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// A host path or a named volume
    pub source: String,
    pub target: String,
    pub options: Option<String>,
}

/// Everything `docker run` needs to know about one container
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,
    pub network: Option<String>,
    /// (host, container)
    pub ports: Vec<(u16, u16)>,
    pub volumes: Vec<Volume>,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub detached: bool,
    pub remove: bool,
    pub interactive: bool,
    pub command: Vec<String>,
    /// Where the container's stdout goes when attached
    pub stdout: Option<PathBuf>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }
    pub fn publish(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }
    pub fn bind(mut self, host: impl AsRef<Path>, target: impl Into<String>) -> Self {
        self.volumes.push(Volume {
            source: host.as_ref().to_string_lossy().to_string(),
            target: target.into(),
            options: None,
        });
        self
    }
    pub fn volume(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        options: Option<&str>,
    ) -> Self {
        self.volumes.push(Volume {
            source: source.into(),
            target: target.into(),
            options: options.map(str::to_owned),
        });
        self
    }
    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }
    pub fn remove_on_exit(mut self) -> Self {
        self.remove = true;
        self
    }
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
    pub fn command<S: Into<String>>(mut self, argv: impl IntoIterator<Item = S>) -> Self {
        self.command = argv.into_iter().map(Into::into).collect();
        self
    }
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }
    /// The arguments following `docker`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_owned()];
        if self.detached {
            args.push("-d".to_owned());
        }
        if self.remove {
            args.push("--rm".to_owned());
        }
        if self.interactive {
            args.push("-it".to_owned());
        }
        if let Some(name) = &self.name {
            args.push(format!("--name={name}"));
            args.push(format!("--hostname={name}"));
        }
        if let Some(network) = &self.network {
            args.push(format!("--net={network}"));
        }
        for (host, container) in &self.ports {
            args.push("-p".to_owned());
            args.push(format!("{host}:{container}"));
        }
        for v in &self.volumes {
            args.push("-v".to_owned());
            match &v.options {
                Some(opts) => args.push(format!("{}:{}:{opts}", v.source, v.target)),
                None => args.push(format!("{}:{}", v.source, v.target)),
            }
        }
        if let Some(dir) = &self.workdir {
            args.push(format!("--workdir={dir}"));
        }
        if let Some(user) = &self.user {
            args.push(format!("--user={user}"));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

pub trait ContainerRuntime: Send + Sync {
    fn build_image(&self, build: &ImageBuild) -> HarnessResult<()>;
    fn tag_image(&self, source: &str, target: &str) -> HarnessResult<()>;
    fn push_image(&self, image: &str) -> HarnessResult<()>;
    fn create_network(&self, name: &str, driver: &str) -> HarnessResult<()>;
    /// Runs the container, returning once it is up (detached) or has exited
    fn run(&self, spec: &ContainerSpec) -> HarnessResult<()>;
    fn stop(&self, name: &str) -> HarnessResult<()>;
    fn remove(&self, name: &str) -> HarnessResult<()>;
    fn restart(&self, name: &str) -> HarnessResult<()>;
    fn is_running(&self, name: &str) -> HarnessResult<bool>;
}

#[derive(Debug, Clone)]
pub struct Docker {
    binary: String,
}

impl Default for Docker {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
        }
    }
}

impl Docker {
    fn command<S: AsRef<str>>(&self, args: &[S]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args.iter().map(AsRef::as_ref));
        cmd
    }
}

impl ContainerRuntime for Docker {
    fn build_image(&self, build: &ImageBuild) -> HarnessResult<()> {
        info!("Building image `{}` ...", build.tag);
        util::handle_child(
            &format!("build image {}", build.tag),
            self.command(&build.to_args()),
        )
    }
    fn tag_image(&self, source: &str, target: &str) -> HarnessResult<()> {
        util::handle_child(
            &format!("tag image {source}"),
            self.command(&["tag", source, target]),
        )
    }
    fn push_image(&self, image: &str) -> HarnessResult<()> {
        info!("Pushing image `{image}` ...");
        util::handle_child(&format!("push image {image}"), self.command(&["push", image]))
    }
    fn create_network(&self, name: &str, driver: &str) -> HarnessResult<()> {
        util::handle_child(
            &format!("create network {name}"),
            self.command(&["network", "create", "-d", driver, name]),
        )
    }
    fn run(&self, spec: &ContainerSpec) -> HarnessResult<()> {
        let desc = match &spec.name {
            Some(name) => format!("run container {name}"),
            None => format!("run {}", spec.image),
        };
        let mut cmd = self.command(&spec.to_args());
        if let Some(path) = &spec.stdout {
            let file = File::create(path).map_err(|e| {
                HarnessError::Other(format!(
                    "Failed to create output file `{}`: {e}",
                    path.display()
                ))
            })?;
            cmd.stdout(Stdio::from(file));
        }
        util::handle_child(&desc, cmd)
    }
    fn stop(&self, name: &str) -> HarnessResult<()> {
        util::handle_child(&format!("stop {name}"), self.command(&["stop", name]))
    }
    fn remove(&self, name: &str) -> HarnessResult<()> {
        util::handle_child(&format!("remove {name}"), self.command(&["rm", name]))
    }
    fn restart(&self, name: &str) -> HarnessResult<()> {
        util::handle_child(&format!("restart {name}"), self.command(&["restart", name]))
    }
    fn is_running(&self, name: &str) -> HarnessResult<bool> {
        let output = util::capture_child(
            &format!("inspect {name}"),
            self.command(&["inspect", "-f", "{{.State.Running}}", name]),
        )?;
        // an unknown container is not running
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }
}
