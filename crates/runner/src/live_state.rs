#![forbid(unsafe_code)]

//! Reader for the runner binary's human-oriented `list` output.
//!
//! A typical line looks like
//! `build-box            Executor=shell Token=ASn7aZYvdLuHyyxAsbUY URL=https://git.example.com`,
//! possibly wrapped in ANSI colour codes and preceded by banner lines. The format is not
//! contractually stable, so lines that do not carry all three fields are skipped.

use fleet_core::LiveRunnerStatus;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const BANNER_PREFIXES: [&str; 3] = ["Listing", "Runtime", "ConfigFile"];

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ansi pattern compiles"));
static NAME_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+Executor=").expect("name pattern compiles"));
static EXECUTOR_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Executor=(\S+)").expect("executor pattern compiles"));
static TOKEN_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Token=(\S+)").expect("token pattern compiles"));

pub fn strip_ansi(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").into_owned()
}

fn is_banner(line: &str) -> bool {
    let line = line.trim_start();
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

fn parse_line(line: &str) -> Option<LiveRunnerStatus> {
    let name = NAME_FIELD.captures(line)?.get(1)?.as_str().trim();
    let executor = EXECUTOR_FIELD.captures(line)?.get(1)?.as_str();
    let token = TOKEN_FIELD.captures(line)?.get(1)?.as_str();
    if name.is_empty() {
        return None;
    }
    Some(LiveRunnerStatus {
        name: name.to_string(),
        token: token.to_string(),
        executor_status: executor.to_string(),
    })
}

pub fn parse(raw: &str) -> Vec<LiveRunnerStatus> {
    let clean = strip_ansi(raw);
    clean
        .lines()
        .filter(|line| !line.trim().is_empty() && !is_banner(line))
        .filter_map(parse_line)
        .collect()
}

/// Token-keyed view for correlating persisted records with live entries. The first entry
/// wins when the binary lists a token twice.
pub fn index_by_token(statuses: &[LiveRunnerStatus]) -> HashMap<&str, &LiveRunnerStatus> {
    let mut index = HashMap::with_capacity(statuses.len());
    for status in statuses {
        index.entry(status.token.as_str()).or_insert(status);
    }
    index
}

#[cfg(test)]
mod tests;
