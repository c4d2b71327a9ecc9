// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline steps and the CLI commands behind them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use rackwork_core::LogWriter;
use rackwork_core::integration::SourceClient;

use crate::error::Result;
use crate::rack_cli::RackCli;

/// One unit of pipeline work. Steps that produce a release return its id.
pub enum Step<'a> {
    /// Clone the workflow repository into `dir`.
    Clone {
        /// Source provider client.
        source: &'a dyn SourceClient,
        /// Repository in the provider.
        repository: &'a str,
        /// Commit reference.
        reference: &'a str,
        /// Destination directory.
        dir: &'a Path,
    },
    /// Build `dir` into a new release of `app`.
    Build {
        /// Source directory.
        dir: &'a Path,
        /// Rack URL.
        rack: &'a str,
        /// Target app.
        app: &'a str,
        /// Manifest file name.
        manifest: &'a str,
        /// Release description.
        description: &'a str,
        /// Development build (review apps, test builds).
        development: bool,
    },
    /// Export the build behind `release` and import it into another app.
    Copy {
        /// Source rack URL.
        rack: &'a str,
        /// Source app.
        app: &'a str,
        /// Release to copy.
        release: &'a str,
        /// Destination rack URL.
        rack_to: &'a str,
        /// Destination app.
        app_to: &'a str,
    },
    /// Promote a release.
    Promote {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
        /// Release to promote.
        release: &'a str,
    },
    /// Run a one-off command against a release.
    Run {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
        /// Release to run against.
        release: &'a str,
        /// Service whose image runs the command.
        service: &'a str,
        /// Command line.
        command: &'a str,
    },
    /// Run the app's tests against a release.
    Test {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
        /// Release under test.
        release: &'a str,
    },
    /// Create an app.
    Create {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
    },
    /// Delete an app.
    Delete {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
    },
    /// Apply `env` (`KEY=value` lines) to an app.
    Env {
        /// Rack URL.
        rack: &'a str,
        /// App.
        app: &'a str,
        /// Environment lines fed to stdin.
        env: &'a str,
    },
}

#[derive(Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    build: String,
}

#[derive(Deserialize)]
struct ServiceInfo {
    #[serde(default, alias = "Name")]
    name: String,
    #[serde(default, alias = "Domain")]
    domain: String,
}

impl Step<'_> {
    /// Run the step, writing its output to `out`.
    pub async fn execute(&self, cli: &dyn RackCli, out: &LogWriter) -> Result<String> {
        match *self {
            Step::Clone {
                source,
                repository,
                reference,
                dir,
            } => {
                source
                    .clone_repository(repository, reference, dir, out)
                    .await?;
                Ok(dir.display().to_string())
            }
            Step::Build {
                dir,
                rack,
                app,
                manifest,
                description,
                development,
            } => {
                let mut cmd = args(&[
                    "build",
                    &dir.display().to_string(),
                    "--app",
                    app,
                    "--description",
                    description,
                    "--id",
                    "--manifest",
                    manifest,
                ]);
                if development {
                    cmd.push("--development".to_string());
                }
                Ok(cli.output(rack, &cmd, out).await?.trim().to_string())
            }
            Step::Copy {
                rack,
                app,
                release,
                rack_to,
                app_to,
            } => copy_build(cli, out, rack, app, release, rack_to, app_to).await,
            Step::Promote { rack, app, release } => {
                let cmd = args(&["releases", "promote", release, "--app", app]);
                cli.run(rack, &cmd, None, out).await?;
                Ok(String::new())
            }
            Step::Run {
                rack,
                app,
                release,
                service,
                command,
            } => {
                let cmd = args(&["run", service, command, "--app", app, "--release", release]);
                cli.run(rack, &cmd, None, out).await?;
                Ok(String::new())
            }
            Step::Test { rack, app, release } => {
                let cmd = args(&["test", "--app", app, "--release", release]);
                cli.run(rack, &cmd, None, out).await?;
                Ok(String::new())
            }
            Step::Create { rack, app } => {
                cli.run(rack, &args(&["apps", "create", app]), None, out)
                    .await?;
                Ok(String::new())
            }
            Step::Delete { rack, app } => {
                cli.run(rack, &args(&["apps", "delete", app]), None, out)
                    .await?;
                Ok(String::new())
            }
            Step::Env { rack, app, env } => {
                cli.run(rack, &args(&["env", "set", "--app", app]), Some(env), out)
                    .await?;
                Ok(String::new())
            }
        }
    }
}

async fn copy_build(
    cli: &dyn RackCli,
    out: &LogWriter,
    rack: &str,
    app: &str,
    release: &str,
    rack_to: &str,
    app_to: &str,
) -> Result<String> {
    let path = format!("/apps/{}/releases/{}", app, release);
    let data = cli
        .output(rack, &args(&["api", "get", &path]), &LogWriter::discard())
        .await?;
    let info: ReleaseInfo = serde_json::from_str(&data)?;

    let scratch = tempfile::tempdir()?;
    let file = scratch.path().join("build.tgz").display().to_string();

    let export = args(&["builds", "export", &info.build, "--app", app, "--file", &file]);
    cli.run(rack, &export, None, out).await?;
    out.write_str("\n").await?;

    let import = args(&["builds", "import", "--app", app_to, "--file", &file, "--id"]);
    Ok(cli.output(rack_to, &import, out).await?.trim().to_string())
}

/// Whether `app` exists on the rack.
pub async fn app_exists(cli: &dyn RackCli, rack: &str, app: &str) -> bool {
    let result = cli
        .run(rack, &args(&["apps", "info", app]), None, &LogWriter::discard())
        .await;
    if let Err(e) = &result {
        debug!(app = %app, error = %e, "App lookup failed");
    }
    result.is_ok()
}

/// Public domains of the app's services, by service name.
pub async fn service_domains(
    cli: &dyn RackCli,
    rack: &str,
    app: &str,
) -> Result<BTreeMap<String, String>> {
    let path = format!("/apps/{}/services", app);
    let data = cli
        .output(rack, &args(&["api", "get", &path]), &LogWriter::discard())
        .await?;
    let services: Vec<ServiceInfo> = serde_json::from_str(&data)?;

    Ok(services
        .into_iter()
        .filter(|s| !s.domain.is_empty())
        .map(|s| (s.name, s.domain))
        .collect())
}

fn args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rack_cli::MockCli;

    #[tokio::test]
    async fn test_build_arguments() {
        let cli = MockCli::new().respond(&["build"], "RB1\n");
        let step = Step::Build {
            dir: Path::new("/tmp/src"),
            rack: "https://convox:pw@rack",
            app: "web",
            manifest: "convox.yml",
            description: "fix things",
            development: true,
        };

        let release = step.execute(&cli, &LogWriter::discard()).await.unwrap();

        assert_eq!(release, "RB1");
        assert_eq!(
            cli.calls().await[0].args,
            args(&[
                "build",
                "/tmp/src",
                "--app",
                "web",
                "--description",
                "fix things",
                "--id",
                "--manifest",
                "convox.yml",
                "--development",
            ])
        );
    }

    #[tokio::test]
    async fn test_service_domains_skip_internal() {
        let cli = MockCli::new().respond(
            &["api", "get", "/apps/pr-7/services"],
            r#"[{"name":"web","domain":"web.pr-7.example.org"},{"name":"worker","domain":""}]"#,
        );

        let domains = service_domains(&cli, "r", "pr-7").await.unwrap();
        assert_eq!(
            domains,
            BTreeMap::from([("web".to_string(), "web.pr-7.example.org".to_string())])
        );
    }

    #[tokio::test]
    async fn test_app_exists() {
        let cli = MockCli::new().fail(&["apps", "info", "missing"], "no such app");
        assert!(app_exists(&cli, "r", "present").await);
        assert!(!app_exists(&cli, "r", "missing").await);
    }
}
