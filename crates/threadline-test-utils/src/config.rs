//! Configuration builders for tests.

use threadline_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .token_timeout_secs(0)
///     .reaper_interval_ms(10)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn app_name(mut self, name: &str) -> Self {
        self.config.agent.app_name = name.to_string();
        self
    }

    pub fn token_timeout_secs(mut self, secs: u64) -> Self {
        self.config.agent.token_timeout_secs = secs;
        self
    }

    pub fn reaper_interval_ms(mut self, ms: u64) -> Self {
        self.config.agent.reaper_interval_ms = ms;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Shorthand for the fastest reaper settings: 250 ms timeout, 10 ms sweeps.
    pub fn fast_reaper(self) -> Self {
        self.token_timeout_secs(0).reaper_interval_ms(10)
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
