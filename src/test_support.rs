//! Test support utilities shared across unit and integration tests.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;

use tokio::sync::{Mutex, MutexGuard};

use crate::params::{BootstrapInstance, RunnerTool};

/// Serialises tests that touch process environment variables.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `set` and clears `unset` while holding the global mutex.
    pub async fn with_vars(set: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                set.iter()
                    .map(|(key, _)| *key)
                    .chain(unset.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(set.len() + unset.len());
        for (key, value) in set {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Sets multiple environment variables while holding the global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::with_vars(pairs, &[]).await
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Bootstrap parameters resembling what GARM sends for a Linux runner.
#[must_use]
pub fn sample_bootstrap(name: &str, pool_id: &str) -> BootstrapInstance {
    BootstrapInstance {
        name: name.to_owned(),
        tools: vec![RunnerTool {
            os: String::from("linux"),
            architecture: String::from("x64"),
            download_url: String::from("https://example.invalid/actions-runner-linux-x64.tar.gz"),
            filename: String::from("actions-runner-linux-x64.tar.gz"),
            ..RunnerTool::default()
        }],
        repo_url: String::from("https://github.com/example/repo"),
        callback_url: String::from("https://garm.example.invalid/api/v1/callbacks"),
        metadata_url: String::from("https://garm.example.invalid/api/v1/metadata"),
        instance_token: String::from("token-value"),
        ssh_keys: vec![String::from("ssh-ed25519 AAAAC3Nza runner@example")],
        extra_specs: None,
        github_runner_group: String::new(),
        os_arch: String::from("amd64"),
        os_type: String::from("linux"),
        flavor: String::from("runner"),
        image: String::from("ubuntu/22.04"),
        labels: vec![String::from("self-hosted"), String::from("incus")],
        pool_id: pool_id.to_owned(),
    }
}
