//! Extractor sizing and limits.

use crate::error::{Error, Result};

/// Largest fixed-size read the record state machine ever requests
/// (the ZIP64 end-of-central-directory body).
pub const MIN_REQUEST_SIZE: usize = 52;

/// Default upper bound for a single byte request.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024;

/// Default upper bound for an entry path length in bytes.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 512;

/// Default window capacity. The extra `DEFAULT_MAX_REQUEST_SIZE` bytes keep
/// room for an unconsumed tail when a full sub-chunk is loaded.
pub const DEFAULT_WINDOW_SIZE: usize = 16 * 1024 + DEFAULT_MAX_REQUEST_SIZE;

/// Default number of chunks buffered per entry stream.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Configuration for a [`StreamExtractor`](crate::StreamExtractor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Capacity of the sliding window in bytes.
    pub window_size: usize,
    /// Largest number of bytes a parse step may require at once.
    pub max_request_size: usize,
    /// Largest accepted entry path, from the header or a path extra field.
    pub max_name_length: usize,
    /// Chunks buffered in each entry stream before the driver waits.
    pub channel_capacity: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ExtractorConfig {
    /// Check the sizing invariants the driver relies on.
    ///
    /// After compaction the window holds fewer than `max_request_size`
    /// unconsumed bytes, so a sub-chunk of `window_size - max_request_size`
    /// bytes always fits.
    pub fn validate(&self) -> Result<()> {
        if self.max_request_size < MIN_REQUEST_SIZE {
            return Err(Error::Config(
                "max_request_size is smaller than the largest fixed record",
            ));
        }
        if self.max_name_length > self.max_request_size {
            return Err(Error::Config("max_name_length exceeds max_request_size"));
        }
        if self.window_size <= self.max_request_size {
            return Err(Error::Config("window_size must exceed max_request_size"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Largest slice of an incoming chunk loaded into the window at once.
    pub fn max_sub_chunk(&self) -> usize {
        self.window_size - self.max_request_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ExtractorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_sub_chunk(), 16 * 1024);
    }

    #[test]
    fn name_limit_must_fit_one_request() {
        let config = ExtractorConfig {
            max_name_length: 4096,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn window_must_leave_room_for_sub_chunks() {
        let config = ExtractorConfig {
            window_size: DEFAULT_MAX_REQUEST_SIZE,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn tiny_requests_rejected() {
        let config = ExtractorConfig {
            max_request_size: 16,
            max_name_length: 16,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
