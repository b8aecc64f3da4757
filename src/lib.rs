//! # quarry: Typed Projection and Query Construction
//!
//! An object-relational projection engine: declare typed entities with named
//! properties and relations once at startup, build typed queries into
//! backend-agnostic logical plans, execute them through a pluggable adapter,
//! and decode the tabular results back into entity instances.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `Adapter`/`Connection` are the contract between the
//!    engine and any backend
//! 2. **Clean DTOs**: `QueryPlan`, `ResultSet`, `Uri` cross all boundaries
//! 3. **Registry owns the mapping**: entity metadata is registered once,
//!    then frozen; the query path only reads
//! 4. **Backend-agnostic plans**: the builder never sees a query language,
//!    the adapter never sees entity types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry::{BelongsTo, Entity, PrimaryKey};
//!
//! #[derive(Default)]
//! struct Author {
//!     id: PrimaryKey,
//!     name: String,
//! }
//!
//! #[derive(Default)]
//! struct Book {
//!     id: PrimaryKey,
//!     title: String,
//!     author: BelongsTo<Author>,
//! }
//!
//! impl Entity for Author {}
//! impl Entity for Book {}
//!
//! fn main() -> quarry::Result<()> {
//!     quarry::entity::<Author>("authors")
//!         .property("id", |a| &mut a.id)
//!         .property("name", |a| &mut a.name)
//!         .register()?;
//!     quarry::entity::<Book>("books")
//!         .property("id", |b| &mut b.id)
//!         .property("title", |b| &mut b.title)
//!         .belongs_to("author", "author_id", |b| &mut b.author)
//!         .register()?;
//!
//!     // An adapter crate registers itself for a scheme before setup().
//!     let ctx = quarry::setup("mem://localhost/library")?;
//!
//!     quarry::from::<Book>(&ctx)
//!         .inner_join("author")
//!         .r#where(quarry::column::<Author>("name").ilike("%austen%"))
//!         .each(|book| println!("{}", book.title))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Execution model
//!
//! Synchronous and blocking, one adapter connection per [`Context`]. Query
//! construction performs no I/O; execution makes one blocking adapter call
//! per plan. Lazy relation resolution re-enters the same Context, including
//! from inside a row callback. Callers wanting overlap run independent
//! Contexts on independent threads.

// ============================================================================
// Modules
// ============================================================================

pub mod adapter;
pub mod metadata;
pub mod model;
pub mod plan;
pub mod query;
pub mod uri;

mod row;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{BelongsTo, Column, DecodeError, HasMany, PrimaryKey, TypeTag};

// ============================================================================
// Re-exports: Metadata registry
// ============================================================================

pub use metadata::{
    entity, header_of, properties_of, relations_of, ColumnInfo, Entity, EntityBuilder,
    EntityHeader, RelationInfo, RelationKind,
};

// ============================================================================
// Re-exports: Plans
// ============================================================================

pub use plan::{
    CompareOp, Join, JoinKind, JoinOn, PlanColumn, PlanValue, Predicate, QueryPlan, TableRef,
};

// ============================================================================
// Re-exports: Query builder
// ============================================================================

pub use query::{alias_column, column, from, ColumnExpr, Condition, Query};

// ============================================================================
// Re-exports: Adapter contract
// ============================================================================

pub use adapter::{register_adapter, Adapter, Connection, ResultSet};

pub use uri::Uri;

// ============================================================================
// Context and setup
// ============================================================================

/// Session handle binding one resolved adapter connection.
///
/// Created by [`setup`] and passed by reference into every query operation;
/// the Context itself holds no other state.
pub struct Context {
    connection: Box<dyn Connection>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

impl Context {
    /// Wrap an already-established connection (adapters and test doubles).
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

/// Parse a connection string, select the adapter registered for its scheme,
/// connect, and wrap the session in a [`Context`].
///
/// Fails with [`Error::Configuration`] when the string violates the grammar
/// or no adapter is registered for the scheme; no partial Context exists
/// after a failure.
pub fn setup(connection_string: &str) -> Result<Context> {
    let uri = Uri::parse(connection_string).ok_or_else(|| {
        Error::Configuration(format!("malformed connection string: {connection_string:?}"))
    })?;
    let adapter = adapter::adapter_for(&uri.scheme).ok_or_else(|| {
        Error::Configuration(format!("no adapter registered for scheme {:?}", uri.scheme))
    })?;
    let connection = adapter.connect(&uri)?;
    tracing::debug!(scheme = %uri.scheme, host = %uri.host, "context established");
    Ok(Context { connection })
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad connection string, or no adapter for its scheme.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Duplicate or missing registration, or a reference the registry
    /// cannot resolve.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A result cell the declared property type cannot accept.
    #[error("decode error in column {column}: {source}")]
    Decode {
        column: String,
        #[source]
        source: DecodeError,
    },

    /// A belongs-to target the backend no longer has.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend-originated failure, propagated unchanged.
    #[error("adapter error: {0}")]
    Adapter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
