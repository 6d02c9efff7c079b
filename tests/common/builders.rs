//! Test data builders for creating test objects

use serial_scope::config::AppConfig;
use serial_scope::types::IngestMode;

/// Builder for configs tuned for fast tests
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        // Short reads keep teardown fast
        config.serial.read_timeout_ms = 10;
        Self { config }
    }

    pub fn baud_rate(mut self, baud: &str) -> Self {
        self.config.serial.baud_rate = baud.to_string();
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config.display.window_capacity = capacity;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.serial.read_buffer_size = size;
        self
    }

    pub fn ingest_mode(mut self, mode: IngestMode) -> Self {
        self.config.ingest_mode = mode;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .baud_rate("115200")
            .window_capacity(5)
            .build();

        assert_eq!(config.serial.baud_rate, "115200");
        assert_eq!(config.display.window_capacity, 5);
        assert_eq!(config.serial.read_timeout_ms, 10);
    }
}
