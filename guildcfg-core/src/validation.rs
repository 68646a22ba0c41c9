//! Input validation for configuration writes.
//!
//! Validation runs before any transaction is opened. A [`ValidatedUpdate`]
//! can only be obtained through [`ConfigUpdate::validate`], so the durable
//! update path never sees unchecked input.

use std::collections::HashSet;

use crate::constants::MAX_WHITELIST_SIZE;
use crate::error::ValidationError;

/// A whitelist replacement as submitted by a caller.
///
/// Callers always submit the complete desired set; there is no diff merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub allow_all_channels: bool,
    pub whitelist: Vec<String>,
}

impl ConfigUpdate {
    pub fn new(allow_all_channels: bool, whitelist: Vec<String>) -> Self {
        Self {
            allow_all_channels,
            whitelist,
        }
    }

    /// Check limits and normalize the whitelist.
    ///
    /// The size limit applies to the raw submission. Duplicate ids collapse
    /// to their first occurrence.
    pub fn validate(self) -> Result<ValidatedUpdate, ValidationError> {
        if self.whitelist.len() > MAX_WHITELIST_SIZE {
            return Err(ValidationError::WhitelistTooLarge {
                submitted: self.whitelist.len(),
                limit: MAX_WHITELIST_SIZE,
            });
        }

        let mut seen = HashSet::with_capacity(self.whitelist.len());
        let mut whitelist = Vec::with_capacity(self.whitelist.len());
        for (index, channel_id) in self.whitelist.into_iter().enumerate() {
            if channel_id.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: format!("whitelistedChannelIds[{}]", index),
                    reason: "channel id must not be empty".to_string(),
                });
            }
            if seen.insert(channel_id.clone()) {
                whitelist.push(channel_id);
            }
        }

        Ok(ValidatedUpdate {
            allow_all_channels: self.allow_all_channels,
            whitelist,
        })
    }
}

/// An update that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpdate {
    allow_all_channels: bool,
    whitelist: Vec<String>,
}

impl ValidatedUpdate {
    pub fn allow_all_channels(&self) -> bool {
        self.allow_all_channels
    }

    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }
}
