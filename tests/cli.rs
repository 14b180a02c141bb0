//! Exit codes and usage output of the gauthctl binary.

use std::process::{Command, Output};

fn gauthctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gauthctl"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run gauthctl")
}

#[test]
fn help_goes_to_stdout_with_success() {
    let out = gauthctl(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("enable"), "{stdout}");
    assert!(stdout.contains("disable"), "{stdout}");
}

#[test]
fn version_names_the_tool() {
    let out = gauthctl(&["--version"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        format!("gauthctl {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn invalid_invocations_print_usage_and_exit_one() {
    for args in [
        &[][..],
        &["frobnicate"][..],
        &["enable"][..],
        &["disable", "extra"][..],
    ] {
        let out = gauthctl(args);
        assert_eq!(out.status.code(), Some(1), "args {args:?}");
        assert!(out.stdout.is_empty(), "args {args:?}");
        assert!(
            String::from_utf8_lossy(&out.stderr).contains("Usage"),
            "args {args:?}"
        );
    }
}

#[cfg(not(feature = "pam"))]
#[test]
fn without_pam_every_operation_fails_closed() {
    let out = gauthctl(&["disable"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!out.stderr.is_empty());
}
