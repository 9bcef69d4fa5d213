#![forbid(unsafe_code)]

//! Register → re-list → correlate → persist, as an explicit state machine.
//!
//! The runner binary is not transactional and does not report the token it assigned, so the
//! token is recovered by listing runners and looking for this attempt's unique description.
//! Any failure after the binary was asked to register triggers a compensating
//! `unregister --description`, keyed on this attempt's own description so that no other
//! registration can be hit.

use crate::error::{LifecycleError, RegistrationStage};
use crate::runner_cli::{ExternalRegistration, RunnerCli, normalize_tags};
use fleet_core::description::{self, AttemptMarker};
use fleet_core::{OwnerId, RunnerRecord};
use fleet_storage::{RunnerInsertRequest, SqliteStore};
use parking_lot::Mutex;

const MAX_URL_LEN: usize = 2048;

#[derive(Clone, Debug)]
pub struct RegisterRequest {
    pub owner_id: OwnerId,
    pub endpoint_url: String,
    pub registration_token: String,
    pub display_name: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Pending,
    Invoked,
    Correlated { token: String },
    Persisted(RunnerRecord),
    Failed {
        stage: RegistrationStage,
        compensated: bool,
    },
}

#[derive(Debug)]
pub struct RegistrationAttempt {
    owner_id: OwnerId,
    display_name: String,
    external: ExternalRegistration,
    state: RegistrationState,
}

fn normalize_url(raw: &str) -> Result<String, LifecycleError> {
    let url = raw.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(LifecycleError::InvalidInput(
            "endpoint url must start with http:// or https://",
        ));
    }
    if url.len() > MAX_URL_LEN {
        return Err(LifecycleError::InvalidInput("endpoint url is too long"));
    }
    if url.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(LifecycleError::InvalidInput(
            "endpoint url must not contain whitespace",
        ));
    }
    Ok(url.to_string())
}

fn normalize_registration_token(raw: &str) -> Result<String, LifecycleError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(LifecycleError::InvalidInput(
            "registration token must not be empty",
        ));
    }
    if token.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(LifecycleError::InvalidInput(
            "registration token must not contain whitespace",
        ));
    }
    Ok(token.to_string())
}

impl RegistrationAttempt {
    /// Validates the request and fixes this attempt's description. Nothing external happens
    /// yet.
    pub fn prepare(
        request: RegisterRequest,
        marker: AttemptMarker,
    ) -> Result<Self, LifecycleError> {
        let display_name = description::normalize_display_name(&request.display_name)
            .map_err(|err| LifecycleError::InvalidInput(err.message()))?;
        let url = normalize_url(&request.endpoint_url)?;
        let registration_token = normalize_registration_token(&request.registration_token)?;

        Ok(Self {
            owner_id: request.owner_id,
            external: ExternalRegistration {
                url,
                registration_token,
                description: description::disambiguated(request.owner_id, marker, &display_name),
                tag_list: normalize_tags(&request.tags),
            },
            display_name,
            state: RegistrationState::Pending,
        })
    }

    pub fn description(&self) -> &str {
        &self.external.description
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn run(
        &mut self,
        cli: &RunnerCli,
        store: &Mutex<SqliteStore>,
    ) -> Result<RunnerRecord, LifecycleError> {
        self.invoke(cli)?;
        self.correlate(cli)?;
        self.persist(cli, store)
    }

    pub(crate) fn invoke(&mut self, cli: &RunnerCli) -> Result<(), LifecycleError> {
        self.expect_state(matches!(self.state, RegistrationState::Pending))?;
        tracing::debug!(
            owner_id = %self.owner_id,
            description = %self.external.description,
            "registering runner"
        );
        match cli.register(&self.external) {
            Ok(()) => {
                self.state = RegistrationState::Invoked;
                Ok(())
            }
            // A timed-out or failed register may still have left an entry behind.
            Err(err) => Err(self.fail(RegistrationStage::Invoke, cli, err.into())),
        }
    }

    pub(crate) fn correlate(&mut self, cli: &RunnerCli) -> Result<(), LifecycleError> {
        self.expect_state(matches!(self.state, RegistrationState::Invoked))?;
        let live = match cli.list() {
            Ok(live) => live,
            Err(err) => return Err(self.fail(RegistrationStage::Correlate, cli, err.into())),
        };

        let mut matching = live
            .into_iter()
            .filter(|status| status.name == self.external.description);
        let token = match (matching.next(), matching.next()) {
            (Some(only), None) => only.token,
            (first, second) => {
                let seen = usize::from(first.is_some()) + usize::from(second.is_some());
                tracing::warn!(
                    description = %self.external.description,
                    matches = seen,
                    "registered runner not found exactly once in live state"
                );
                let mismatch = LifecycleError::ParseMismatch {
                    description: self.external.description.clone(),
                };
                return Err(self.fail(RegistrationStage::Correlate, cli, mismatch));
            }
        };

        self.state = RegistrationState::Correlated { token };
        Ok(())
    }

    pub(crate) fn persist(
        &mut self,
        cli: &RunnerCli,
        store: &Mutex<SqliteStore>,
    ) -> Result<RunnerRecord, LifecycleError> {
        let token = match &self.state {
            RegistrationState::Correlated { token } => token.clone(),
            _ => return Err(out_of_order()),
        };

        let inserted = store.lock().runner_insert(RunnerInsertRequest {
            owner_id: self.owner_id,
            token,
            display_name: self.display_name.clone(),
            endpoint_url: self.external.url.clone(),
            created_at_ms: None,
        });

        match inserted {
            Ok(record) => {
                tracing::info!(
                    record_id = %record.id,
                    owner_id = %record.owner_id,
                    token = super::token_hint(&record.token),
                    "runner registered"
                );
                self.state = RegistrationState::Persisted(record.clone());
                Ok(record)
            }
            Err(err) => Err(self.fail(RegistrationStage::Persist, cli, err.into())),
        }
    }

    fn fail(
        &mut self,
        stage: RegistrationStage,
        cli: &RunnerCli,
        cause: LifecycleError,
    ) -> LifecycleError {
        let compensated = self.compensate(cli);
        self.state = RegistrationState::Failed { stage, compensated };
        tracing::warn!(%stage, compensated, error = %cause, "runner registration failed");
        match cause {
            LifecycleError::Conflict { .. } => cause,
            other => LifecycleError::Registration {
                stage,
                compensated,
                source: Box::new(other),
            },
        }
    }

    fn compensate(&self, cli: &RunnerCli) -> bool {
        match cli.unregister_by_description(&self.external.description) {
            Ok(()) => {
                tracing::info!(
                    description = %self.external.description,
                    "compensating unregister succeeded"
                );
                true
            }
            Err(err) => {
                tracing::error!(
                    description = %self.external.description,
                    %err,
                    "compensating unregister failed; runner binary may keep an orphaned entry"
                );
                false
            }
        }
    }

    fn expect_state(&self, ok: bool) -> Result<(), LifecycleError> {
        if ok { Ok(()) } else { Err(out_of_order()) }
    }
}

fn out_of_order() -> LifecycleError {
    LifecycleError::Task("registration step called out of order".to_string())
}
