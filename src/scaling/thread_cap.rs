//! Thread-count caps for numeric libraries, applied to a child process at spawn time.
//!
//! Numeric pools read their size once, when they initialise, so the cap has to be
//! in the environment before the benchmark process starts. The parent process's
//! own environment is left untouched.

use std::collections::BTreeMap;
use std::env;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadCap {
    threads: usize,
    vars: Vec<String>,
}

impl ThreadCap {
    pub fn new(threads: usize, vars: &[String]) -> Self {
        Self {
            threads,
            vars: vars.to_vec(),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// `(variable, value)` pairs this cap sets.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        let value = self.threads.to_string();
        self.vars
            .iter()
            .map(|var| (var.clone(), value.clone()))
            .collect()
    }

    pub fn apply<'a>(&self, command: &'a mut Command) -> &'a mut Command {
        command.envs(self.env_pairs())
    }
}

/// Current values of `vars` in this process; unset variables are omitted.
pub fn snapshot(vars: &[String]) -> BTreeMap<String, String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok().map(|value| (var.clone(), value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;
    use crate::config::DEFAULT_THREAD_ENV_VARS;

    fn default_vars() -> Vec<String> {
        DEFAULT_THREAD_ENV_VARS.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn sets_every_variable_on_the_child_command() {
        let cap = ThreadCap::new(3, &default_vars());
        let mut command = Command::new("true");
        cap.apply(&mut command);

        let envs: BTreeMap<&OsStr, Option<&OsStr>> = command.get_envs().collect();
        for var in DEFAULT_THREAD_ENV_VARS {
            assert_eq!(envs.get(OsStr::new(var)), Some(&Some(OsStr::new("3"))), "{var}");
        }
    }

    #[test]
    fn leaves_parent_environment_alone() {
        let var = "SCALEBENCH_TEST_CAP_NOT_IN_PARENT".to_string();
        let cap = ThreadCap::new(5, std::slice::from_ref(&var));
        let mut command = Command::new("true");
        cap.apply(&mut command);

        assert!(env::var_os(&var).is_none());
        assert!(snapshot(&[var]).is_empty());
    }

    #[test]
    fn env_pairs_use_decimal_thread_count() {
        let cap = ThreadCap::new(12, &["OMP_NUM_THREADS".to_string()]);
        assert_eq!(
            cap.env_pairs(),
            vec![("OMP_NUM_THREADS".to_string(), "12".to_string())]
        );
        assert_eq!(cap.threads(), 12);
    }
}
