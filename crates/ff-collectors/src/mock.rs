//! Mock collaborators for testing snapshot assembly and the publish session.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use ff_protocol::{EnvironmentReading, PiReading};

use crate::count::CountSource;
use crate::environment::EnvironmentSource;
use crate::error::{CollectorError, CollectorResult};

/// Environment source returning a fixed reading or a fixed failure,
/// counting how often it was asked.
#[derive(Debug)]
pub struct MockEnvironment {
    name: String,
    reading: Option<EnvironmentReading>,
    calls: AtomicU32,
}

impl MockEnvironment {
    pub fn new(name: &str, reading: EnvironmentReading) -> Self {
        Self {
            name: name.to_string(),
            reading: Some(reading),
            calls: AtomicU32::new(0),
        }
    }

    /// A source whose every fetch fails.
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EnvironmentSource for MockEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> CollectorResult<EnvironmentReading> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.reading
            .clone()
            .ok_or_else(|| CollectorError::Unavailable {
                name: self.name.clone(),
                message: "scripted failure".into(),
            })
    }
}

/// Count source that always fails.
#[derive(Debug, Default)]
pub struct FailingCount;

#[async_trait]
impl CountSource for FailingCount {
    async fn read(&self) -> CollectorResult<PiReading> {
        Err(CollectorError::Unavailable {
            name: "pi".into(),
            message: "people counter offline".into(),
        })
    }
}
