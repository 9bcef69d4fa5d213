#![forbid(unsafe_code)]
#![allow(dead_code)]

use fleet_core::{OwnerId, RecordId, Role, RunnerRecord};
use fleet_runner::{ExecutionError, ProcessInvoker, ProcessOutput, RunnerCli, RunnerLifecycle};
use fleet_storage::{OwnerCreateRequest, RunnerInsertRequest, SqliteStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Debug)]
struct FakeRunner {
    description: String,
    token: String,
    url: String,
    hidden: bool,
}

#[derive(Default)]
struct FakeState {
    runners: Vec<FakeRunner>,
    next_token: u64,
    calls: Vec<Vec<String>>,
    fail_list: bool,
    fail_register: bool,
    hide_from_list: bool,
    fail_unregister_tokens: HashSet<String>,
    fail_unregister_description: bool,
    token_override: Option<String>,
}

/// In-memory stand-in for the runner binary. It keeps its own registry, prints `list`
/// on stderr the way the real binary does and can be told to fail individual subcommands.
#[derive(Default)]
pub(crate) struct FakeRunnerBinary {
    state: Mutex<FakeState>,
}

impl FakeRunnerBinary {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn seed(&self, description: &str, token: &str) {
        self.state.lock().runners.push(FakeRunner {
            description: description.to_string(),
            token: token.to_string(),
            url: "https://gitlab.example.com".to_string(),
            hidden: false,
        });
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    pub(crate) fn fail_register(&self, fail: bool) {
        self.state.lock().fail_register = fail;
    }

    /// Registrations succeed but never show up in `list`.
    pub(crate) fn hide_from_list(&self, hide: bool) {
        self.state.lock().hide_from_list = hide;
    }

    pub(crate) fn fail_unregister_token(&self, token: &str) {
        self.state
            .lock()
            .fail_unregister_tokens
            .insert(token.to_string());
    }

    pub(crate) fn fail_unregister_description(&self, fail: bool) {
        self.state.lock().fail_unregister_description = fail;
    }

    /// Next registrations get this token instead of a fresh one.
    pub(crate) fn assign_token(&self, token: &str) {
        self.state.lock().token_override = Some(token.to_string());
    }

    pub(crate) fn live_tokens(&self) -> Vec<String> {
        self.state
            .lock()
            .runners
            .iter()
            .map(|runner| runner.token.clone())
            .collect()
    }

    pub(crate) fn live_descriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .runners
            .iter()
            .map(|runner| runner.description.clone())
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn count(&self, subcommand: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.first().map(String::as_str) == Some(subcommand))
            .count()
    }

    fn failure(program: &str, stderr: &str) -> ExecutionError {
        ExecutionError::NonZeroExit {
            program: program.to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

impl ProcessInvoker for FakeRunnerBinary {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, ExecutionError> {
        let mut state = self.state.lock();
        state.calls.push(args.to_vec());

        match args.first().map(String::as_str) {
            Some("list") => {
                if state.fail_list {
                    return Err(Self::failure(program, "FATAL: config.toml unreadable"));
                }
                let mut stderr = String::from(
                    "Runtime platform                                    arch=amd64 os=linux\n\
                     Listing configured runners                          ConfigFile=/etc/gitlab-runner/config.toml\n",
                );
                for runner in state.runners.iter().filter(|runner| !runner.hidden) {
                    stderr.push_str(&format!(
                        "{:<50}  Executor=shell Token={} URL={}\n",
                        runner.description, runner.token, runner.url
                    ));
                }
                Ok(ProcessOutput {
                    stdout: String::new(),
                    stderr,
                })
            }
            Some("register") => {
                if state.fail_register {
                    return Err(Self::failure(program, "ERROR: Registering runner... failed"));
                }
                let description = flag(args, "--description").unwrap_or_default().to_string();
                let url = flag(args, "--url").unwrap_or_default().to_string();
                let token = match state.token_override.clone() {
                    Some(token) => token,
                    None => {
                        state.next_token += 1;
                        format!("glrt-{:04}", state.next_token)
                    }
                };
                let hidden = state.hide_from_list;
                state.runners.push(FakeRunner {
                    description,
                    token,
                    url,
                    hidden,
                });
                Ok(ProcessOutput::default())
            }
            Some("unregister") => {
                if let Some(token) = flag(args, "--token") {
                    if state.fail_unregister_tokens.contains(token) {
                        return Err(Self::failure(program, "ERROR: Unregistering runner failed"));
                    }
                    let token = token.to_string();
                    state.runners.retain(|runner| runner.token != token);
                } else if let Some(description) = flag(args, "--description") {
                    if state.fail_unregister_description {
                        return Err(Self::failure(program, "ERROR: Unregistering runner failed"));
                    }
                    let description = description.to_string();
                    state.runners.retain(|runner| runner.description != description);
                }
                Ok(ProcessOutput::default())
            }
            _ => Err(Self::failure(program, "unknown command")),
        }
    }
}

pub(crate) struct Fleet {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) binary: Arc<FakeRunnerBinary>,
    pub(crate) lifecycle: RunnerLifecycle,
}

impl Fleet {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SqliteStore::open(dir.path()).expect("open store");
        let binary = FakeRunnerBinary::new();
        let lifecycle = RunnerLifecycle::new(store, RunnerCli::new(binary.clone()));
        Self {
            dir,
            binary,
            lifecycle,
        }
    }

    pub(crate) fn owner(&self, username: &str, role: Role) -> OwnerId {
        self.lifecycle
            .store()
            .lock()
            .owner_create(OwnerCreateRequest {
                username: username.to_string(),
                role,
            })
            .expect("create owner")
            .id
    }

    /// Persists a record directly and makes the fake binary know its token.
    pub(crate) fn existing_runner(
        &self,
        owner_id: OwnerId,
        token: &str,
        age_ms: i64,
    ) -> RunnerRecord {
        self.binary.seed(&format!("seeded {token}"), token);
        self.lifecycle
            .store()
            .lock()
            .runner_insert(RunnerInsertRequest {
                owner_id,
                token: token.to_string(),
                display_name: format!("seeded {token}"),
                endpoint_url: "https://gitlab.example.com".to_string(),
                created_at_ms: Some(now_ms() - age_ms),
            })
            .expect("insert runner")
    }

    pub(crate) fn record_exists(&self, id: RecordId) -> bool {
        self.lifecycle.store().lock().runner_get(id).is_ok()
    }

    pub(crate) fn record_count(&self) -> usize {
        self.lifecycle
            .store()
            .lock()
            .runners_count()
            .expect("count runners")
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
