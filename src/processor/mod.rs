//! Transform processors
//!
//! A source attaches a [`ProcessorChain`] to every document it yields. The
//! pipeline workers run the chain; the first failure is attached to the
//! document and the rest of the chain is skipped.

pub mod extractor;
pub mod grok;

pub use extractor::MappedVariableExtractor;
pub use grok::GrokPattern;

use crate::document::VersionedDocument;
use crate::error::ExportError;
use std::fmt;
use std::sync::Arc;

/// One transformation step over a document
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, doc: &mut VersionedDocument) -> Result<(), ExportError>;
}

/// Ordered, shareable list of processors
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    /// Append a processor to the end of the chain
    pub fn with(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Run every processor in order; errors end up on the document
    pub fn apply(&self, doc: &mut VersionedDocument) {
        for processor in &self.processors {
            if doc.has_errors() {
                tracing::debug!(
                    "{}: skipping {} on failed document",
                    doc.identifier(),
                    processor.name()
                );
                return;
            }
            if let Err(e) = processor.process(doc) {
                tracing::debug!("{}: {} failed: {}", doc.identifier(), processor.name(), e);
                doc.add_error(e);
            }
        }
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}
