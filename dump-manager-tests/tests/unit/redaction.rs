//! Unit tests for command line redaction

use dump_manager::utils::command::{censor_args, CommandSpec};
use rstest::rstest;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[rstest]
#[case(&["--foo", "--bar", "1234", "--baz"], "--bar", "1234")]
#[case(&["--foo", "-b=1234", "--baz"], "-b", "-b=1234")]
#[case(&["-h", "db", "-psecret", "--all-databases"], "-p", "secret")]
fn test_secret_never_logged(#[case] input: &[&str], #[case] marker: &str, #[case] secret: &str) {
    let censored = censor_args(&args(input), marker);

    assert_eq!(censored.len(), input.len());
    assert!(censored.iter().all(|a| a != secret));
    assert!(!censored.join(" ").contains(secret));
}

#[test]
fn test_empty_marker_keeps_arguments() {
    let input = args(&["--foo", "--bar", "1234"]);
    assert_eq!(censor_args(&input, ""), input);
}

#[test]
fn test_display_line_is_censored() {
    let spec = CommandSpec::new("/usr/bin/mysqldump")
        .args(["-u", "root", "-phunter2", "--all-databases"])
        .censor("-p");

    let line = spec.display_line();
    assert!(line.starts_with("/usr/bin/mysqldump"));
    assert!(!line.contains("hunter2"));
    assert!(line.contains("--all-databases"));
}
