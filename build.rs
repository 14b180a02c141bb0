//! Build script: bakes the default state root into the binary and, with the
//! `pam` feature, locates libpam.

use std::env;

const DEFAULT_STATEDIR: &str = "/var/lib/gauth";

fn main() {
    println!("cargo:rerun-if-env-changed=GAUTH_STATEDIR");
    let statedir = env::var("GAUTH_STATEDIR").unwrap_or_else(|_| DEFAULT_STATEDIR.to_string());
    println!("cargo:rustc-env=GAUTH_STATEDIR={statedir}");

    if env::var_os("CARGO_FEATURE_PAM").is_some() {
        // Older Linux-PAM releases ship no pam.pc; fall back to plain -lpam.
        if pkg_config::probe_library("pam").is_err() {
            println!("cargo:rustc-link-lib=pam");
        }
    }
}
