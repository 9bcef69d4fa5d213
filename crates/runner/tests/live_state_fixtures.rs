#![forbid(unsafe_code)]

use fleet_core::OwnerId;
use fleet_core::description::{AttemptMarker, disambiguated};
use fleet_runner::live_state::{index_by_token, parse};

const COLORED: &str = include_str!("fixtures/list_colored.txt");
const PLAIN: &str = include_str!("fixtures/list_plain.txt");

#[test]
fn colored_listing_parses_every_runner() {
    let statuses = parse(COLORED);
    let summary = statuses
        .iter()
        .map(|s| (s.name.as_str(), s.token.as_str(), s.executor_status.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            ("s21_containers", "ASn7aZYvdLuHyyxAsbUY", "shell"),
            (
                "[owner:3 t:1760572800123456789.0] nightly build",
                "glrt-t3_kx9Qm2",
                "shell"
            ),
            ("docker-arm64", "glrt-Zp81LLa0", "docker"),
        ]
    );
}

#[test]
fn plain_listing_skips_banners_and_incomplete_lines() {
    let statuses = parse(PLAIN);
    let names = statuses.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["alpha", "beta"]);

    let index = index_by_token(&statuses);
    assert_eq!(index["tok-beta"].executor_status, "kubernetes");
    assert!(!index.contains_key("gamma"));
}

#[test]
fn registration_descriptions_come_back_verbatim_as_names() {
    let description = disambiguated(
        OwnerId::new(3),
        AttemptMarker {
            unix_nanos: 1_760_572_800_123_456_789,
            seq: 0,
        },
        "nightly build",
    );
    let statuses = parse(COLORED);
    let matching = statuses
        .iter()
        .filter(|s| s.name == description)
        .collect::<Vec<_>>();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].token, "glrt-t3_kx9Qm2");
}
