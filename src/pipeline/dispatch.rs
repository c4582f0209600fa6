//! Conversion dispatch: run the converter over every page artifact.
//!
//! Guarantees, whatever the converter does:
//!
//! * exactly one [`ConversionOutcome`] per input artifact, carrying that
//!   artifact's page number;
//! * a failing, timing-out or panicking page becomes a
//!   [`ConversionOutcome::Failure`] and never stops the other pages;
//! * at most `concurrency` conversions are in flight.
//!
//! Outcomes come back in completion order. The assembler restores page order.

use crate::error::{ConversionError, EngineError};
use crate::pipeline::split::PageArtifact;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

/// An engine that turns one single-page PDF into Markdown.
///
/// Implementations are shared by every concurrent worker of a dispatch and
/// must be safe to call concurrently. They must not modify or keep the
/// artifact file beyond the call.
#[async_trait]
pub trait PageConverter: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Called once per run before any page is dispatched. An error here is a
    /// total dispatch failure and aborts the run.
    async fn prepare(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Convert one page to Markdown.
    async fn convert(&self, artifact: &PageArtifact) -> Result<String, ConversionError>;
}

/// Result of converting one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success { page_number: usize, markdown: String },
    Failure { page_number: usize, reason: ConversionError },
}

impl ConversionOutcome {
    pub fn page_number(&self) -> usize {
        match self {
            ConversionOutcome::Success { page_number, .. }
            | ConversionOutcome::Failure { page_number, .. } => *page_number,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Knobs for one dispatch.
#[derive(Clone, Default)]
pub struct DispatchOptions<'a> {
    /// Maximum conversions in flight; `0` and `1` both mean sequential.
    pub concurrency: usize,
    pub convert_timeout: Option<Duration>,
    pub doc_id: &'a str,
    pub progress: Option<&'a ProgressCallback>,
}

/// Convert every artifact, returning one outcome per artifact in completion order.
pub async fn dispatch(
    artifacts: &[PageArtifact],
    converter: &dyn PageConverter,
    options: &DispatchOptions<'_>,
) -> Vec<ConversionOutcome> {
    if options.concurrency <= 1 {
        let mut outcomes = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            outcomes.push(convert_one(artifact, converter, options).await);
        }
        outcomes
    } else {
        stream::iter(
            artifacts
                .iter()
                .map(|artifact| convert_one(artifact, converter, options)),
        )
        .buffer_unordered(options.concurrency)
        .collect()
        .await
    }
}

async fn convert_one(
    artifact: &PageArtifact,
    converter: &dyn PageConverter,
    options: &DispatchOptions<'_>,
) -> ConversionOutcome {
    let page_number = artifact.page_number;
    if let Some(cb) = options.progress {
        cb.on_page_start(options.doc_id, page_number);
    }

    let guarded = AssertUnwindSafe(converter.convert(artifact)).catch_unwind();
    let result = match options.convert_timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(r) => r,
            Err(_) => Ok(Err(ConversionError::Timeout {
                ms: limit.as_millis() as u64,
            })),
        },
        None => guarded.await,
    };

    let result = result
        .unwrap_or_else(|payload| Err(ConversionError::Panicked(panic_message(payload))));

    match result {
        Ok(markdown) => {
            debug!(
                "{}: page {} converted ({} bytes)",
                options.doc_id,
                page_number,
                markdown.len()
            );
            if let Some(cb) = options.progress {
                cb.on_page_complete(options.doc_id, page_number, markdown.len());
            }
            ConversionOutcome::Success {
                page_number,
                markdown,
            }
        }
        Err(reason) => {
            warn!(
                "{}: page {} failed via {}: {}",
                options.doc_id,
                page_number,
                converter.name(),
                reason
            );
            if let Some(cb) = options.progress {
                cb.on_page_error(options.doc_id, page_number, &reason.to_string());
            }
            ConversionOutcome::Failure {
                page_number,
                reason,
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
