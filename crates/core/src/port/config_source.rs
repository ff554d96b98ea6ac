// Configuration Port
// Typed lookups into whatever configuration loader the host process uses.

/// Configuration value source
pub trait ConfigSource: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_string(key).and_then(|v| v.trim().parse().ok())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;

    /// Fixed key/value configuration
    #[derive(Default)]
    pub struct StaticConfigSource {
        values: HashMap<String, String>,
    }

    impl StaticConfigSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.values.insert(key.into(), value.into());
            self
        }
    }

    impl ConfigSource for StaticConfigSource {
        fn get_string(&self, key: &str) -> Option<String> {
            self.values.get(key).cloned()
        }
    }
}
