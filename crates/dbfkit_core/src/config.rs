//! Session registry configuration.

use dbfkit_engine::EngineSettings;

/// Configuration for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of session slots.
    pub max_sessions: u16,

    /// Temporary indexes a session may hold open at once.
    pub temp_index_capacity: usize,

    /// Starting high-water limit of the exclusive-open registry.
    pub exclusive_initial_limit: usize,

    /// Hard capacity of the exclusive-open registry.
    pub exclusive_capacity: usize,

    /// Longest alias accepted.
    pub alias_max_len: usize,

    /// Settings every engine handle is initialized with.
    pub engine: EngineSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            temp_index_capacity: 32,
            exclusive_initial_limit: 8,
            exclusive_capacity: 255,
            alias_max_len: 32,
            engine: EngineSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of session slots.
    #[must_use]
    pub const fn max_sessions(mut self, value: u16) -> Self {
        self.max_sessions = value;
        self
    }

    /// Sets the temporary index pool capacity.
    #[must_use]
    pub const fn temp_index_capacity(mut self, value: usize) -> Self {
        self.temp_index_capacity = value;
        self
    }

    /// Sets the exclusive-open registry limits.
    #[must_use]
    pub const fn exclusive_limits(mut self, initial: usize, capacity: usize) -> Self {
        self.exclusive_initial_limit = initial;
        self.exclusive_capacity = capacity;
        self
    }

    /// Sets the longest alias accepted.
    #[must_use]
    pub const fn alias_max_len(mut self, value: usize) -> Self {
        self.alias_max_len = value;
        self
    }

    /// Sets the engine settings.
    #[must_use]
    pub fn engine(mut self, settings: EngineSettings) -> Self {
        self.engine = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_sessions, 10);
        assert!(config.exclusive_initial_limit <= config.exclusive_capacity);
        assert!(config.engine.case_insensitive);
        assert!(config.engine.auto_open);
    }

    #[test]
    fn builder_pattern() {
        let config = SessionConfig::new()
            .max_sessions(2)
            .temp_index_capacity(1)
            .exclusive_limits(1, 2)
            .alias_max_len(10);
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.temp_index_capacity, 1);
        assert_eq!(config.exclusive_capacity, 2);
        assert_eq!(config.alias_max_len, 10);
    }
}
