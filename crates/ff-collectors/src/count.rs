//! People-count source.

use async_trait::async_trait;
use ff_protocol::PiReading;

use crate::error::CollectorResult;

/// Reads the on-device people counter.
#[async_trait]
pub trait CountSource: Send + Sync {
    async fn read(&self) -> CollectorResult<PiReading>;
}

/// Count supplied up front, e.g. from the `--pi` flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticCount(pub i64);

#[async_trait]
impl CountSource for StaticCount {
    async fn read(&self) -> CollectorResult<PiReading> {
        Ok(PiReading {
            people_count: self.0,
        })
    }
}
