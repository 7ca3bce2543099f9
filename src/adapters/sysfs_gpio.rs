//! sysfs GPIO signal source
//!
//! Reads exported lines from `<base>/gpio<N>/value`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{SignalRef, SignalSource};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SysfsGpioSource {
    base: PathBuf,
}

impl SysfsGpioSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn value_path(&self, signal: SignalRef) -> PathBuf {
        self.base.join(signal.to_string()).join("value")
    }
}

#[async_trait]
impl SignalSource for SysfsGpioSource {
    async fn read(&self, signal: SignalRef) -> Result<String> {
        let content = tokio::fs::read_to_string(self.value_path(signal)).await?;
        Ok(content
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}
