//! Signature-keyed cache of shared data sources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pm_core::{Error, Result};

use crate::decoder::{RecordDecoder, SourceLoader};
use crate::signature::Signature;
use crate::source::{DataSource, SourceId};

/// Maps each [`Signature`] to the single [`DataSource`] that reads it.
///
/// Lookup-or-insert is atomic: concurrent callers asking for the same
/// signature all receive the same `Arc`, and the loader runs once.
#[derive(Default)]
pub struct SourceRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sources: HashMap<Signature, Arc<DataSource>>,
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `signature`, opening it with `loader` on first reference.
    pub fn get_or_create(
        &self,
        signature: &Signature,
        loader: &dyn SourceLoader,
    ) -> Result<Arc<DataSource>> {
        if loader.schema() != signature.schema() {
            return Err(Error::Configuration(format!(
                "loader for schema '{}' cannot open source {signature}",
                loader.schema()
            )));
        }
        self.get_or_create_with(signature, |sig| loader.open(sig.files()))
    }

    /// Like [`get_or_create`](Self::get_or_create) with an arbitrary
    /// decoder factory. The factory is not called on a hit.
    pub fn get_or_create_with<F>(&self, signature: &Signature, open: F) -> Result<Arc<DataSource>>
    where
        F: FnOnce(&Signature) -> Result<Box<dyn RecordDecoder>>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(src) = inner.sources.get(signature) {
            tracing::debug!(source = %signature, id = %src.id(), "data source reused");
            return Ok(Arc::clone(src));
        }

        let decoder = open(signature)?;
        let id = SourceId::fresh();
        let src = Arc::new(DataSource::new(id, signature.clone(), decoder));
        inner.sources.insert(signature.clone(), Arc::clone(&src));

        tracing::info!(
            source = %signature,
            id = %id,
            n_files = signature.files().len(),
            n_fields = src.fields().len(),
            "data source opened"
        );
        Ok(src)
    }

    /// Existing source for `signature`, if any.
    pub fn get(&self, signature: &Signature) -> Option<Arc<DataSource>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sources.get(signature).cloned()
    }

    /// All sources, ordered by id.
    pub fn sources(&self) -> Vec<Arc<DataSource>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = inner.sources.values().cloned().collect();
        out.sort_by_key(|s| s.id());
        out
    }

    /// Number of distinct sources.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sources.len()
    }

    /// True when no source has been opened.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
