//! Harness Switches
//!
//! Environment-driven toggles for the scenario lifecycle. The binary reads
//! them once at startup and hands the struct to the core; nothing below the
//! binary touches the process environment.

pub const SKIP_SETUP: &str = "SKIP_SETUP";
pub const SKIP_TEARDOWN: &str = "SKIP_TEARDOWN";
pub const TEARDOWN_BEFORE_SETUP: &str = "TEARDOWN_BEFORE_SETUP";
pub const SKIP_TESTS: &str = "SKIP_TESTS";
pub const UPDATE_EXPECTED_RESULTS: &str = "UPDATE_EXPECTED_RESULTS";
pub const HOST_ENDPOINT: &str = "HOST_ENDPOINT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessSwitches {
    pub skip_setup: bool,
    pub skip_teardown: bool,
    pub teardown_before_setup: bool,
    pub skip_tests: bool,
    /// Regenerate golden files instead of comparing against them
    pub update_expected_results: bool,
    pub host_endpoint: Option<String>,
}

impl HarnessSwitches {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse switches through an arbitrary variable lookup
    ///
    /// A boolean switch is on only when its value is exactly `true`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).as_deref() == Some("true");

        Self {
            skip_setup: flag(SKIP_SETUP),
            skip_teardown: flag(SKIP_TEARDOWN),
            teardown_before_setup: flag(TEARDOWN_BEFORE_SETUP),
            skip_tests: flag(SKIP_TESTS),
            update_expected_results: flag(UPDATE_EXPECTED_RESULTS),
            host_endpoint: lookup(HOST_ENDPOINT).filter(|value| !value.is_empty()),
        }
    }

    /// Names of the switches that are on, for startup logging
    pub fn active(&self) -> Vec<&'static str> {
        [
            (SKIP_SETUP, self.skip_setup),
            (SKIP_TEARDOWN, self.skip_teardown),
            (TEARDOWN_BEFORE_SETUP, self.teardown_before_setup),
            (SKIP_TESTS, self.skip_tests),
            (UPDATE_EXPECTED_RESULTS, self.update_expected_results),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}
