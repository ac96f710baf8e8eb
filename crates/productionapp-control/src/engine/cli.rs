//! Engine implementation backed by the `pulumi` CLI.
//!
//! Every stack gets its own working directory holding a generated
//! `Pulumi.yaml` (YAML runtime) that declares a single deployment component.
//! All commands run with `kill_on_drop`, so dropping an in-flight request
//! also stops the engine process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ControlError, ControlResult, EngineError, EngineResult};
use crate::sink::OutputSink;
use crate::types::ProjectName;

use super::{AutomationEngine, DeploymentProgram, StackRef, StackSummary, UpSummary};

/// Name of the generated project file.
const PROJECT_FILE: &str = "Pulumi.yaml";

/// Output lines kept for error reporting.
const ERROR_TAIL_LINES: usize = 20;

/// Engine driving the `pulumi` binary.
pub struct CliEngine {
    binary: PathBuf,
    work_dir: PathBuf,
    backend_url: Option<String>,
    passphrase: Option<SecretString>,
    component_type: String,
    staging_seq: AtomicU64,
}

impl CliEngine {
    /// Create a new CLI engine.
    pub fn new(config: &EngineConfig) -> ControlResult<Self> {
        if config.binary.as_os_str().is_empty() {
            return Err(ControlError::Config("engine binary must be set".to_owned()));
        }
        if config.component_type.trim().is_empty() {
            return Err(ControlError::Config(
                "engine component_type must be set".to_owned(),
            ));
        }

        Ok(Self {
            binary: config.binary.clone(),
            work_dir: config.work_dir.clone(),
            backend_url: config.backend_url.clone(),
            passphrase: config.passphrase.clone(),
            component_type: config.component_type.clone(),
            staging_seq: AtomicU64::new(0),
        })
    }

    fn project_dir(&self, project: &ProjectName) -> PathBuf {
        self.work_dir.join(project.as_str())
    }

    fn stack_dir(&self, stack: &StackRef) -> PathBuf {
        self.project_dir(&stack.project).join(stack.name.as_str())
    }

    /// Render the project file for a stack.
    ///
    /// Emitted as JSON, which the YAML runtime reads as YAML.
    fn render_program(&self, stack: &StackRef, program: &DeploymentProgram) -> serde_json::Value {
        match program {
            DeploymentProgram::Deployment(spec) => {
                let resource = spec.name().as_str();
                serde_json::json!({
                    "name": stack.project.as_str(),
                    "runtime": "yaml",
                    "description": format!("Deployment {resource}"),
                    "resources": {
                        resource: {
                            "type": self.component_type,
                            "properties": {
                                "image": spec.image(),
                                "port": spec.port(),
                            },
                        },
                    },
                    "outputs": {
                        "url": format!("${{{resource}.url}}"),
                    },
                })
            }
            DeploymentProgram::Empty => serde_json::json!({
                "name": stack.project.as_str(),
                "runtime": "yaml",
            }),
        }
    }

    async fn write_program(
        &self,
        dir: &Path,
        stack: &StackRef,
        program: &DeploymentProgram,
    ) -> EngineResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        let rendered = serde_json::to_vec_pretty(&self.render_program(stack, program))
            .map_err(|e| EngineError::Protocol(format!("failed to render program: {e}")))?;
        tokio::fs::write(dir.join(PROJECT_FILE), rendered).await?;
        Ok(())
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(dir)
            .env("PULUMI_SKIP_UPDATE_CHECK", "true")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(url) = &self.backend_url {
            cmd.env("PULUMI_BACKEND_URL", url);
        }
        if let Some(passphrase) = &self.passphrase {
            cmd.env("PULUMI_CONFIG_PASSPHRASE", passphrase.expose_secret());
        }
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    /// Run a command to completion and return its stdout.
    async fn run(&self, dir: &Path, args: &[&str], scope: Scope<'_>) -> EngineResult<String> {
        debug!(command = %self.describe(args), dir = %dir.display(), "running engine command");

        let output = self.command(dir, args).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(
                self.describe(args),
                output.status.code().unwrap_or(-1),
                &format!("{stderr}\n{stdout}"),
                scope,
            ));
        }

        Ok(stdout)
    }

    /// Run a command, forwarding every stdout and stderr line to `sink`.
    async fn run_streaming(
        &self,
        dir: &Path,
        args: &[&str],
        scope: Scope<'_>,
        sink: &dyn OutputSink,
    ) -> EngineResult<()> {
        debug!(command = %self.describe(args), dir = %dir.display(), "streaming engine command");

        let mut child = self
            .command(dir, args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::other("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::other("engine stderr not captured"))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut tail: Vec<String> = Vec::new();
        let mut out_done = false;
        let mut err_done = false;

        loop {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => forward_line(sink, &mut tail, line, false),
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => forward_line(sink, &mut tail, line, true),
                    None => err_done = true,
                },
                else => break,
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(classify(
                self.describe(args),
                status.code().unwrap_or(-1),
                &tail.join("\n"),
                scope,
            ));
        }
        Ok(())
    }

    fn next_staging_dir(&self, stack: &StackRef) -> PathBuf {
        let seq = self.staging_seq.fetch_add(1, Ordering::SeqCst);
        self.project_dir(&stack.project).join(format!(
            ".staging-{}-{}-{seq}",
            stack.name,
            std::process::id()
        ))
    }
}

/// Send a line to the sink, keeping stderr and error lines for reporting.
fn forward_line(sink: &dyn OutputSink, tail: &mut Vec<String>, line: String, from_stderr: bool) {
    sink.line(&line);
    if from_stderr || line.contains("error") {
        tail.push(line);
        if tail.len() > ERROR_TAIL_LINES {
            tail.drain(..tail.len() - ERROR_TAIL_LINES);
        }
    }
}

impl std::fmt::Debug for CliEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliEngine")
            .field("binary", &self.binary)
            .field("work_dir", &self.work_dir)
            .field("backend_url", &self.backend_url)
            .finish_non_exhaustive()
    }
}

/// What a command acts on. Decides which failures it can report.
///
/// Program output is free text: a resource provider may well print
/// "already exists" during `up`, and that must not read as a name clash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope<'a> {
    /// `stack ls`.
    Project,
    /// `stack init` of a new stack.
    Init(&'a str),
    /// `stack select` or `stack rm` of an existing stack.
    Existing(&'a str),
    /// `up`, `destroy` or `stack output`.
    Update(&'a str),
}

/// Map a failed command's output to an engine error.
pub(crate) fn classify(command: String, exit_code: i32, output: &str, scope: Scope<'_>) -> EngineError {
    let lower = output.to_lowercase();
    let busy = lower.contains("update is currently in progress")
        || lower.contains("[409] conflict")
        || lower.contains("stack is currently locked");

    match scope {
        Scope::Init(stack) if lower.contains("already exists") => {
            EngineError::StackAlreadyExists(stack.to_owned())
        }
        Scope::Existing(stack) if lower.contains("no stack named") => {
            EngineError::StackNotFound(stack.to_owned())
        }
        Scope::Init(stack) | Scope::Existing(stack) | Scope::Update(stack) if busy => {
            EngineError::ConcurrentUpdate(stack.to_owned())
        }
        _ => EngineError::Command {
            command,
            exit_code,
            stderr: output.trim().to_owned(),
        },
    }
}

/// Parse `stack output --json`.
pub(crate) fn parse_outputs(json: &str) -> EngineResult<BTreeMap<String, serde_json::Value>> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(json)
        .map_err(|e| EngineError::Protocol(format!("invalid stack outputs: {e}")))
}

/// Parse `stack ls --json` output, keeping only the stack part of each name.
pub(crate) fn parse_stack_list(json: &str) -> EngineResult<Vec<StackSummary>> {
    let mut stacks: Vec<StackSummary> = serde_json::from_str(json)
        .map_err(|e| EngineError::Protocol(format!("invalid stack list: {e}")))?;

    for stack in &mut stacks {
        if let Some((_, short)) = stack.name.rsplit_once('/') {
            stack.name = short.to_owned();
        }
    }
    stacks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(stacks)
}

async fn remove_dir_if_exists(dir: &Path) -> EngineResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl AutomationEngine for CliEngine {
    async fn list_stacks(&self, project: &ProjectName) -> EngineResult<Vec<StackSummary>> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let stdout = self
            .run(
                &self.work_dir,
                &["stack", "ls", "--all", "--project", project.as_str(), "--json"],
                Scope::Project,
            )
            .await?;

        parse_stack_list(&stdout)
    }

    async fn create_stack(
        &self,
        stack: &StackRef,
        program: &DeploymentProgram,
    ) -> EngineResult<()> {
        // Stage the program so a name collision never clobbers the existing
        // stack's directory.
        let staging = self.next_staging_dir(stack);
        self.write_program(&staging, stack, program).await?;

        let result = self
            .run(
                &staging,
                &["stack", "init", stack.name.as_str(), "--non-interactive"],
                Scope::Init(stack.name.as_str()),
            )
            .await;

        if let Err(e) = result {
            remove_dir_if_exists(&staging).await?;
            return Err(e);
        }

        let dir = self.stack_dir(stack);
        remove_dir_if_exists(&dir).await?;
        tokio::fs::rename(&staging, &dir).await?;

        info!(stack = %stack, dir = %dir.display(), "stack created");
        Ok(())
    }

    async fn select_stack(
        &self,
        stack: &StackRef,
        program: &DeploymentProgram,
    ) -> EngineResult<()> {
        let dir = self.stack_dir(stack);
        let had_dir = tokio::fs::try_exists(&dir).await.unwrap_or(false);
        let has_program = tokio::fs::try_exists(dir.join(PROJECT_FILE))
            .await
            .unwrap_or(false);

        // An empty program only fills in for a missing directory; it never
        // replaces the program a stack was created with.
        if !has_program || matches!(program, DeploymentProgram::Deployment(_)) {
            self.write_program(&dir, stack, program).await?;
        }

        let result = self
            .run(
                &dir,
                &["stack", "select", stack.name.as_str(), "--non-interactive"],
                Scope::Existing(stack.name.as_str()),
            )
            .await;

        if let Err(e) = result {
            if !had_dir {
                remove_dir_if_exists(&dir).await?;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn up(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<UpSummary> {
        let dir = self.stack_dir(stack);
        let name = stack.name.as_str();

        self.run_streaming(
            &dir,
            &[
                "up",
                "--yes",
                "--skip-preview",
                "--non-interactive",
                "--stack",
                name,
            ],
            Scope::Update(name),
            sink,
        )
        .await?;

        let stdout = self
            .run(
                &dir,
                &["stack", "output", "--json", "--stack", name],
                Scope::Update(name),
            )
            .await?;

        Ok(UpSummary {
            outputs: parse_outputs(&stdout)?,
        })
    }

    async fn destroy(&self, stack: &StackRef, sink: &dyn OutputSink) -> EngineResult<()> {
        let name = stack.name.as_str();
        self.run_streaming(
            &self.stack_dir(stack),
            &[
                "destroy",
                "--yes",
                "--skip-preview",
                "--non-interactive",
                "--stack",
                name,
            ],
            Scope::Update(name),
            sink,
        )
        .await
    }

    async fn remove_stack(&self, stack: &StackRef) -> EngineResult<()> {
        let dir = self.stack_dir(stack);
        let name = stack.name.as_str();

        self.run(
            &dir,
            &["stack", "rm", "--yes", "--non-interactive", name],
            Scope::Existing(name),
        )
        .await?;

        remove_dir_if_exists(&dir).await?;
        info!(stack = %stack, "stack removed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{DeploymentName, DeploymentSpec};

    fn engine(work_dir: &Path) -> CliEngine {
        CliEngine::new(&EngineConfig {
            work_dir: work_dir.to_path_buf(),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn stack(name: &str) -> StackRef {
        StackRef::new(
            ProjectName::new("productionapp-platform"),
            DeploymentName::parse(name).unwrap(),
        )
    }

    #[test]
    fn classify_distinguished_errors() {
        let err = classify(
            "pulumi stack init demo".to_owned(),
            255,
            "error: stack 'demo' already exists",
            Scope::Init("demo"),
        );
        assert!(matches!(err, EngineError::StackAlreadyExists(ref n) if n == "demo"));

        let err = classify(
            "pulumi destroy".to_owned(),
            255,
            "error: [409] Conflict: Another update is currently in progress.",
            Scope::Update("demo"),
        );
        assert!(matches!(err, EngineError::ConcurrentUpdate(_)));

        let err = classify(
            "pulumi stack rm demo".to_owned(),
            255,
            "error: the stack is currently locked by 1 lock(s)",
            Scope::Existing("demo"),
        );
        assert!(matches!(err, EngineError::ConcurrentUpdate(_)));

        let err = classify(
            "pulumi stack select demo".to_owned(),
            255,
            "error: no stack named 'demo' found",
            Scope::Existing("demo"),
        );
        assert!(matches!(err, EngineError::StackNotFound(_)));

        let err = classify(
            "pulumi up".to_owned(),
            1,
            "  error: quota exceeded\n",
            Scope::Update("demo"),
        );
        match err {
            EngineError::Command {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "error: quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provider_output_is_not_a_name_clash() {
        let output = "error: namespaces \"demo\" already exists";
        for scope in [Scope::Update("demo"), Scope::Existing("demo")] {
            let err = classify("pulumi up".to_owned(), 255, output, scope);
            assert!(matches!(err, EngineError::Command { .. }), "{scope:?}");
        }

        let err = classify(
            "pulumi up".to_owned(),
            255,
            "error: no stack named 'backend' found in dependency",
            Scope::Update("demo"),
        );
        assert!(matches!(err, EngineError::Command { .. }));
    }

    #[test]
    fn list_failures_are_never_stack_errors() {
        for output in [
            "error: stack already exists",
            "error: no stack named 'x' found",
            "error: [409] Conflict",
        ] {
            let err = classify("pulumi stack ls".to_owned(), 255, output, Scope::Project);
            assert!(matches!(err, EngineError::Command { .. }), "{output}");
        }
    }

    #[test]
    fn parse_outputs_rejects_garbage() {
        let outputs = parse_outputs(r#"{"url": "http://10.0.0.1"}"#).unwrap();
        assert_eq!(outputs["url"], "http://10.0.0.1");
        assert!(parse_outputs("  \n").unwrap().is_empty());
        assert!(matches!(
            parse_outputs("Current stack outputs (0)"),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn parse_stack_list_strips_qualifiers() {
        let json = r#"[
            {"name": "organization/productionapp-platform/zeta", "current": false, "updateInProgress": false, "resourceCount": 4},
            {"name": "alpha", "current": true, "lastUpdate": "2024-05-01T10:00:00.000Z", "updateInProgress": true}
        ]"#;
        let stacks = parse_stack_list(json).unwrap();
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].name, "alpha");
        assert!(stacks[0].update_in_progress);
        assert_eq!(stacks[1].name, "zeta");
        assert_eq!(stacks[1].resource_count, Some(4));
    }

    #[test]
    fn parse_stack_list_rejects_garbage() {
        assert!(matches!(
            parse_stack_list("not json"),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn render_deployment_program() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let spec = DeploymentSpec::new("demo", "gcr.io/kuar-demo/kuard-amd64:blue", 80).unwrap();

        let rendered = engine.render_program(&stack("demo"), &DeploymentProgram::Deployment(spec));
        assert_eq!(rendered["name"], "productionapp-platform");
        assert_eq!(rendered["runtime"], "yaml");
        let resource = &rendered["resources"]["demo"];
        assert_eq!(resource["type"], "productionapp:index:Deployment");
        assert_eq!(resource["properties"]["image"], "gcr.io/kuar-demo/kuard-amd64:blue");
        assert_eq!(resource["properties"]["port"], 80);
        assert_eq!(rendered["outputs"]["url"], "${demo.url}");
    }

    #[test]
    fn render_empty_program() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = engine(dir.path()).render_program(&stack("demo"), &DeploymentProgram::Empty);
        assert!(rendered.get("resources").is_none());
    }

    #[test]
    fn stack_dirs_are_namespaced_by_project() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert_eq!(
            engine.stack_dir(&stack("demo")),
            dir.path().join("productionapp-platform").join("demo")
        );
        let staging = engine.next_staging_dir(&stack("demo"));
        assert!(staging
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".staging-demo-"));
        assert_ne!(staging, engine.next_staging_dir(&stack("demo")));
    }

    #[test]
    fn rejects_empty_binary() {
        let config = EngineConfig {
            binary: PathBuf::new(),
            ..EngineConfig::default()
        };
        assert!(matches!(CliEngine::new(&config), Err(ControlError::Config(_))));
    }
}
