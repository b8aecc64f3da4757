//! # Adapter Contract & Scheme Registrar
//!
//! This is THE contract between the projection engine and any backend.
//! An [`Adapter`] is selected by connection-string scheme and produces
//! [`Connection`]s; a connection executes logical plans and returns tabular
//! [`ResultSet`]s. The adapter owns translation into its native query
//! language; this layer never sees SQL.
//!
//! Scheme registration happens once, during single-threaded startup, before
//! the first [`setup`](crate::setup) call for that scheme; afterwards the
//! registrar is read-only and safe to share.

use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::plan::QueryPlan;
use crate::uri::Uri;
use crate::{Error, Result};

// ============================================================================
// ResultSet
// ============================================================================

/// The adapter's sole output contract: ordered column names plus ordered
/// rows of optional text cells (raw decoded wire values, pre type-coercion).
///
/// Column names follow the wire convention `t{alias}_c{index}` described in
/// [`crate::plan`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

// ============================================================================
// Contract traits
// ============================================================================

/// One live backend session.
///
/// `execute` takes `&self`: relation resolution issues nested queries on the
/// same connection before an outer `each` returns, and implementations must
/// tolerate that re-entrancy. Timeouts and retries, if any, live here; the
/// projection layer performs neither.
///
/// `Send` so a Context can live on whichever thread its caller runs;
/// concurrent use of one connection is not part of the model.
pub trait Connection: Send {
    fn execute(&self, plan: &QueryPlan) -> Result<ResultSet>;
}

/// A pluggable backend, selected by connection-string scheme.
pub trait Adapter: Send + Sync {
    fn connect(&self, uri: &Uri) -> Result<Box<dyn Connection>>;
}

// ============================================================================
// Registrar
// ============================================================================

static ADAPTERS: LazyLock<RwLock<HashMap<String, Arc<dyn Adapter>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Associate a connection-string scheme with an adapter.
///
/// Duplicate registration for the same scheme is an [`Error::Metadata`].
pub fn register_adapter(scheme: &str, adapter: Arc<dyn Adapter>) -> Result<()> {
    let mut registrar = ADAPTERS.write();
    if registrar.contains_key(scheme) {
        return Err(Error::Metadata(format!(
            "an adapter is already registered for scheme {scheme:?}"
        )));
    }
    tracing::debug!(scheme, "registered adapter");
    registrar.insert(scheme.to_owned(), adapter);
    Ok(())
}

pub(crate) fn adapter_for(scheme: &str) -> Option<Arc<dyn Adapter>> {
    ADAPTERS.read().get(scheme).cloned()
}
