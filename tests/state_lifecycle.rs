//! End-to-end enable/disable through the public controller API.

use std::cell::Cell;
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use gauthctl::state::{self, AtomicInstaller};
use gauthctl::{
    AuthFailure, Authenticator, Controller, GauthError, Identity, Operation, Outcome, Settings,
    ValidationFailure,
};
use nix::unistd::getuid;

/// Accepts or rejects every identity and counts the attempts.
struct FixedAuthenticator {
    accept: bool,
    attempts: Cell<u32>,
}

impl FixedAuthenticator {
    fn accepting() -> Self {
        Self {
            accept: true,
            attempts: Cell::new(0),
        }
    }

    fn rejecting() -> Self {
        Self {
            accept: false,
            attempts: Cell::new(0),
        }
    }
}

impl Authenticator for FixedAuthenticator {
    fn authenticate(&self, _identity: &Identity) -> Result<(), AuthFailure> {
        self.attempts.set(self.attempts.get() + 1);
        if self.accept {
            Ok(())
        } else {
            Err(AuthFailure::Credentials(
                "Authentication failure".to_string(),
            ))
        }
    }
}

struct Fixture {
    root: tempfile::TempDir,
    home: tempfile::TempDir,
    settings: Settings,
    user: Identity,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let settings = Settings {
            state_root: root.path().to_path_buf(),
            ..Settings::default()
        };
        Self {
            root,
            home,
            settings,
            user: Identity::new("u", getuid().as_raw()),
        }
    }

    fn state_file(&self) -> PathBuf {
        self.root.path().join("u")
    }

    fn config(&self, name: &str, content: &[u8], mode: u32) -> PathBuf {
        let path = self.home.path().join(name);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn run(&self, auth: &FixedAuthenticator, operation: Operation) -> Result<Outcome, GauthError> {
        Controller::new(&self.settings, auth).run_as(&self.user, operation)
    }

    fn root_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[test]
fn owner_only_config_is_installed_byte_for_byte() {
    let fx = Fixture::new();
    let config = fx.config("secret.cfg", b"SEED123", 0o600);

    let outcome = fx
        .run(&FixedAuthenticator::accepting(), Operation::Enable { config })
        .unwrap();

    assert_eq!(outcome.to_string(), "GAuth set up successfully");
    assert_eq!(fs::read(fx.state_file()).unwrap(), b"SEED123");
    assert_eq!(fs::metadata(fx.state_file()).unwrap().mode() & 0o777, 0o600);
    assert_eq!(fx.root_entries(), vec!["u".to_string()]);
}

#[test]
fn group_readable_config_is_refused() {
    let fx = Fixture::new();
    let config = fx.config("secret.cfg", b"SEED123", 0o640);

    let err = fx
        .run(&FixedAuthenticator::accepting(), Operation::Enable { config })
        .unwrap_err();

    assert!(
        matches!(
            err,
            GauthError::Validation(ValidationFailure::InsecurePermissions { .. })
        ),
        "got {err:?}"
    );
    assert!(err.to_string().contains("insecure permissions"));
    assert!(fx.root_entries().is_empty());
}

#[test]
fn symlinked_config_is_refused_and_state_kept() {
    let fx = Fixture::new();
    fs::write(fx.state_file(), b"OLD").unwrap();
    let real = fx.config("real.cfg", b"SEED123", 0o600);
    let link = fx.home.path().join("link.cfg");
    symlink(&real, &link).unwrap();

    let err = fx
        .run(
            &FixedAuthenticator::accepting(),
            Operation::Enable { config: link },
        )
        .unwrap_err();

    assert!(
        matches!(
            err,
            GauthError::Validation(ValidationFailure::InsecureLink { .. })
        ),
        "got {err:?}"
    );
    assert_eq!(fs::read(fx.state_file()).unwrap(), b"OLD");
    assert_eq!(fx.root_entries(), vec!["u".to_string()]);
}

#[test]
fn disable_without_state_succeeds() {
    let fx = Fixture::new();

    let outcome = fx
        .run(&FixedAuthenticator::accepting(), Operation::Disable)
        .unwrap();

    assert_eq!(outcome.to_string(), "GAuth disabled successfully");
    assert!(fx.root_entries().is_empty());
}

#[test]
fn later_install_wins() {
    let fx = Fixture::new();
    let auth = FixedAuthenticator::accepting();

    fx.run(
        &auth,
        Operation::Enable {
            config: fx.config("a.cfg", b"A", 0o600),
        },
    )
    .unwrap();
    fx.run(
        &auth,
        Operation::Enable {
            config: fx.config("b.cfg", b"B", 0o600),
        },
    )
    .unwrap();

    assert_eq!(fs::read(fx.state_file()).unwrap(), b"B");
    assert_eq!(auth.attempts.get(), 2);
}

#[test]
fn rejected_authentication_changes_nothing() {
    let fx = Fixture::new();
    fs::write(fx.state_file(), b"OLD").unwrap();
    let auth = FixedAuthenticator::rejecting();

    let err = fx
        .run(
            &auth,
            Operation::Enable {
                config: fx.config("secret.cfg", b"NEW", 0o600),
            },
        )
        .unwrap_err();
    assert!(err.to_string().starts_with("Authentication failed"));

    let err = fx.run(&auth, Operation::Disable).unwrap_err();
    assert!(matches!(err, GauthError::Auth(_)), "got {err:?}");

    assert_eq!(fs::read(fx.state_file()).unwrap(), b"OLD");
    assert_eq!(fx.root_entries(), vec!["u".to_string()]);
}

#[test]
fn enable_then_disable_round_trip() {
    let fx = Fixture::new();
    let auth = FixedAuthenticator::accepting();

    fx.run(
        &auth,
        Operation::Enable {
            config: fx.config("secret.cfg", b"SEED123", 0o400),
        },
    )
    .unwrap();
    assert!(fx.state_file().exists());

    fx.run(&auth, Operation::Disable).unwrap();
    assert!(fx.root_entries().is_empty());
}

#[test]
fn missing_state_root_reports_staging_failure() {
    let fx = Fixture::new();
    let settings = Settings {
        state_root: fx.root.path().join("does-not-exist"),
        ..Settings::default()
    };
    let auth = FixedAuthenticator::accepting();

    let err = Controller::new(&settings, &auth)
        .run_as(
            &fx.user,
            Operation::Enable {
                config: fx.config("secret.cfg", b"SEED123", 0o600),
            },
        )
        .unwrap_err();

    match err {
        GauthError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
        other => panic!("expected I/O failure, got {other:?}"),
    }
}

#[test]
fn readers_never_see_a_mixed_or_missing_state_file() {
    const LEN: usize = 64 * 1024;

    let fx = Fixture::new();
    let target = fx.state_file();
    let a = fx.config("a.cfg", &vec![b'A'; LEN], 0o600);
    let b = fx.config("b.cfg", &vec![b'B'; LEN], 0o600);
    let installer = AtomicInstaller::default();

    installer
        .install(state::validate(&a, &fx.user).unwrap(), &target)
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = Arc::clone(&done);
        let target = target.clone();
        thread::spawn(move || {
            let mut reads = 0u32;
            while !done.load(Ordering::Acquire) {
                let content = fs::read(&target).expect("state file vanished during install");
                assert_eq!(content.len(), LEN, "partial state file observed");
                let first = content[0];
                assert!(
                    content.iter().all(|&byte| byte == first),
                    "mixed state file observed"
                );
                reads += 1;
            }
            reads
        })
    };

    for round in 0..50 {
        let source: &Path = if round % 2 == 0 { &b } else { &a };
        installer
            .install(state::validate(source, &fx.user).unwrap(), &target)
            .unwrap();
    }
    done.store(true, Ordering::Release);

    reader.join().unwrap();
    assert_eq!(fs::read(&target).unwrap(), vec![b'A'; LEN]);
    assert!(!state::staging_path(&target).exists());
}
