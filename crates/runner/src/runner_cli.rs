#![forbid(unsafe_code)]

//! Subcommands of the external runner binary (`list`, `register`, `unregister`).

use crate::error::ExecutionError;
use crate::invoker::ProcessInvoker;
use crate::live_state;
use fleet_core::LiveRunnerStatus;
use std::sync::Arc;

pub const DEFAULT_RUNNER_PROGRAM: &str = "gitlab-runner";
pub const DEFAULT_EXECUTOR: &str = "shell";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalRegistration {
    pub url: String,
    /// Enrollment secret; used once and never stored.
    pub registration_token: String,
    pub description: String,
    pub tag_list: Option<String>,
}

#[derive(Clone)]
pub struct RunnerCli {
    invoker: Arc<dyn ProcessInvoker>,
    program: String,
    executor: String,
}

impl std::fmt::Debug for RunnerCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerCli")
            .field("program", &self.program)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl RunnerCli {
    pub fn new(invoker: Arc<dyn ProcessInvoker>) -> Self {
        Self {
            invoker,
            program: DEFAULT_RUNNER_PROGRAM.to_string(),
            executor: DEFAULT_EXECUTOR.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = executor.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn list(&self) -> Result<Vec<LiveRunnerStatus>, ExecutionError> {
        let output = self.invoker.run(&self.program, &["list".to_string()])?;
        Ok(live_state::parse(output.listing_text()))
    }

    pub fn register(&self, registration: &ExternalRegistration) -> Result<(), ExecutionError> {
        self.invoker
            .run(&self.program, &self.register_args(registration))
            .map(|_| ())
    }

    pub fn unregister_by_token(&self, token: &str) -> Result<(), ExecutionError> {
        let args = ["unregister", "--token", token].map(str::to_string);
        self.invoker.run(&self.program, &args).map(|_| ())
    }

    pub fn unregister_by_description(&self, description: &str) -> Result<(), ExecutionError> {
        let args = ["unregister", "--description", description].map(str::to_string);
        self.invoker.run(&self.program, &args).map(|_| ())
    }

    fn register_args(&self, registration: &ExternalRegistration) -> Vec<String> {
        let mut args = [
            "register",
            "--non-interactive",
            "--url",
            registration.url.as_str(),
            "--token",
            registration.registration_token.as_str(),
            "--description",
            registration.description.as_str(),
            "--executor",
            self.executor.as_str(),
        ]
        .map(str::to_string)
        .to_vec();
        if let Some(tags) = registration.tag_list.as_deref().filter(|t| !t.is_empty()) {
            args.push("--tag-list".to_string());
            args.push(tags.to_string());
        }
        args
    }
}

/// Trims each tag, drops empty ones and joins the rest with commas. Every entry may itself be
/// a comma-separated list.
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Option<String> {
    let tags = raw
        .iter()
        .flat_map(|entry| entry.as_ref().split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>();
    if tags.is_empty() {
        None
    } else {
        Some(tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::ProcessOutput;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        stdout: String,
    }

    impl ProcessInvoker for Recorder {
        fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, ExecutionError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().push(call);
            Ok(ProcessOutput {
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn tags_are_trimmed_and_joined() {
        assert_eq!(
            normalize_tags(&[" linux, docker ,", "", " arm64 "]),
            Some("linux,docker,arm64".to_string())
        );
        assert_eq!(normalize_tags(&[" , "]), None);
        assert_eq!(normalize_tags::<&str>(&[]), None);
    }

    #[test]
    fn register_builds_the_documented_argument_list() {
        let recorder = Arc::new(Recorder::default());
        let cli = RunnerCli::new(recorder.clone());
        cli.register(&ExternalRegistration {
            url: "https://gitlab.example.com".to_string(),
            registration_token: "glrt-abc".to_string(),
            description: "[owner:1 t:5.0] build".to_string(),
            tag_list: Some("linux,arm64".to_string()),
        })
        .expect("register");

        let calls = recorder.calls.lock();
        assert_eq!(
            calls[0],
            vec![
                "gitlab-runner",
                "register",
                "--non-interactive",
                "--url",
                "https://gitlab.example.com",
                "--token",
                "glrt-abc",
                "--description",
                "[owner:1 t:5.0] build",
                "--executor",
                "shell",
                "--tag-list",
                "linux,arm64",
            ]
        );
    }

    #[test]
    fn unregister_variants_key_on_token_or_description() {
        let recorder = Arc::new(Recorder::default());
        let cli = RunnerCli::new(recorder.clone()).with_program("/opt/bin/gitlab-runner");
        cli.unregister_by_token("tok-1").expect("by token");
        cli.unregister_by_description("desc").expect("by description");

        let calls = recorder.calls.lock();
        assert_eq!(
            calls[0],
            vec!["/opt/bin/gitlab-runner", "unregister", "--token", "tok-1"]
        );
        assert_eq!(
            calls[1],
            vec!["/opt/bin/gitlab-runner", "unregister", "--description", "desc"]
        );
    }

    #[test]
    fn list_parses_the_listing() {
        let recorder = Arc::new(Recorder {
            stdout: "alpha  Executor=shell Token=t1 URL=https://x\n".to_string(),
            ..Recorder::default()
        });
        let cli = RunnerCli::new(recorder);
        let live = cli.list().expect("list");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token, "t1");
    }
}
