use super::*;
use proptest::prelude::*;

fn status(name: &str, token: &str, executor: &str) -> LiveRunnerStatus {
    LiveRunnerStatus {
        name: name.to_string(),
        token: token.to_string(),
        executor_status: executor.to_string(),
    }
}

#[test]
fn single_line_yields_name_token_and_executor() {
    let parsed = parse("foo  Executor=shell Token=abc123 URL=https://x");
    assert_eq!(parsed, vec![status("foo", "abc123", "shell")]);
}

#[test]
fn ansi_codes_and_banners_are_ignored() {
    let raw = "\x1b[0;33mRuntime platform\x1b[0;m  arch=amd64 os=linux pid=1 revision=1 version=17.0.0\n\
               \x1b[0;33mListing configured runners\x1b[0;m  ConfigFile=/etc/gitlab-runner/config.toml\n\
               \n\
               \x1b[1mbuild-box\x1b[0;m   \x1b[0;32mExecutor\x1b[0;m=shell Token\x1b[0;m=tok-1 URL\x1b[0;m=https://git.example.com\n";
    assert_eq!(parse(raw), vec![status("build-box", "tok-1", "shell")]);
}

#[test]
fn names_with_spaces_and_brackets_survive() {
    let parsed = parse(
        "[owner:7 t:1760572800123456789.0] my build box    \
         Executor=docker Token=t-9 URL=https://x",
    );
    assert_eq!(
        parsed,
        vec![status("[owner:7 t:1760572800123456789.0] my build box", "t-9", "docker")]
    );
}

#[test]
fn lines_missing_a_field_are_skipped() {
    let raw = "no-token   Executor=shell URL=https://x\n\
               Executor=shell Token=nameless\n\
               no-executor Token=abc URL=https://x\n\
               ok   Executor=shell Token=kept URL=https://x\n";
    assert_eq!(parse(raw), vec![status("ok", "kept", "shell")]);
}

#[test]
fn empty_and_banner_only_output_is_empty() {
    assert!(parse("").is_empty());
    assert!(parse("Listing configured runners ConfigFile=/x\n\n").is_empty());
}

#[test]
fn index_keeps_first_entry_per_token() {
    let statuses = vec![
        status("a", "dup", "shell"),
        status("b", "dup", "docker"),
        status("c", "other", "shell"),
    ];
    let index = index_by_token(&statuses);
    assert_eq!(index.len(), 2);
    assert_eq!(index["dup"].name, "a");
}

proptest! {
    #[test]
    fn parse_is_deterministic(raw in "(?s).{0,400}") {
        prop_assert_eq!(parse(&raw), parse(&raw));
    }

    #[test]
    fn well_formed_lines_round_trip(
        name in "[a-z][a-z0-9 _-]{0,20}[a-z0-9]",
        token in "[A-Za-z0-9_-]{1,24}",
        executor in "[a-z]{1,10}",
    ) {
        let line = format!("{name}   Executor={executor} Token={token} URL=https://x");
        prop_assert_eq!(parse(&line), vec![status(name.trim(), &token, &executor)]);
    }
}
