//! Sizing policy for [`Storage`](crate::Storage).

use crate::error::{Error, Result};

/// Largest bucket-count exponent a table will grow to.
pub const MAX_EXPONENT: u32 = 31;

/// Bucket-array sizing and load-factor thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    // -------------------------------------------------------------------------
    // Sizing
    // -------------------------------------------------------------------------
    /// Bucket-count exponent at creation (4 => 16 buckets).
    pub initial_exponent: u32,

    /// Shrinking never goes below this exponent.
    pub min_exponent: u32,

    // -------------------------------------------------------------------------
    // Load-factor thresholds
    // -------------------------------------------------------------------------
    /// Grow by one level when, before inserting a new key,
    /// `count > grow_load * buckets`.
    pub grow_load: usize,

    /// Shrink when, after a delete, `count * shrink_divisor < buckets`.
    pub shrink_divisor: usize,

    /// Exponent levels dropped per shrink, clamped at `min_exponent`.
    pub shrink_step: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            initial_exponent: 4,
            min_exponent: 4,
            grow_load: 2,
            shrink_divisor: 4,
            shrink_step: 2,
        }
    }
}

impl StorageConfig {
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::default()
    }

    /// Reject policies that could not hold a table steady.
    ///
    /// A shrink of `shrink_step` levels multiplies the load by
    /// `2^shrink_step`; right after a shrink the load is below
    /// `2^shrink_step / shrink_divisor`, which must not exceed `grow_load`
    /// or the next insert would grow the table straight back.
    pub fn validate(&self) -> Result<()> {
        if self.initial_exponent > MAX_EXPONENT
            || self.min_exponent > self.initial_exponent
            || self.grow_load == 0
            || self.shrink_divisor == 0
            || self.shrink_step == 0
            || self.shrink_step > MAX_EXPONENT
        {
            return Err(Error::InvalidArgument);
        }
        // 2^step / divisor > grow_load, without rounding the ratio down.
        let growth = 1usize << self.shrink_step;
        if growth > self.grow_load.saturating_mul(self.shrink_divisor) {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

/// Builder for [`StorageConfig`].
#[derive(Default)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    pub fn initial_exponent(mut self, e: u32) -> Self {
        self.config.initial_exponent = e;
        self
    }

    pub fn min_exponent(mut self, e: u32) -> Self {
        self.config.min_exponent = e;
        self
    }

    pub fn grow_load(mut self, load: usize) -> Self {
        self.config.grow_load = load;
        self
    }

    pub fn shrink_divisor(mut self, d: usize) -> Self {
        self.config.shrink_divisor = d;
        self
    }

    pub fn shrink_step(mut self, step: u32) -> Self {
        self.config.shrink_step = step;
        self
    }

    pub fn build(self) -> Result<StorageConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
