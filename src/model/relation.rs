//! Typed, lazily-resolved relation fields.
//!
//! `BelongsTo<T>` and `HasMany<T>` are the two field types an entity embeds
//! for its associations. Neither touches an adapter when a row is decoded:
//! a belongs-to stores the raw foreign key, a has-many stores the owning
//! row's primary key. Dereferencing resolves through the [`Context`] the
//! caller passes in, synchronously, including from inside a row callback.

use std::cell::OnceCell;
use std::marker::PhantomData;

use crate::metadata::{self, Entity};
use crate::query;
use crate::{Context, Error, Result};

use super::PrimaryKey;

// ============================================================================
// BelongsTo
// ============================================================================

/// Many-to-one reference: this row carries the target's primary key.
///
/// `get()` resolves at most once per instance; the target is cached for the
/// lifetime of the owning entity. A fresh decode of the same row yields a
/// fresh, unresolved reference.
pub struct BelongsTo<T: Entity> {
    key: Option<PrimaryKey>,
    cached: OnceCell<Box<T>>,
}

impl<T: Entity> Default for BelongsTo<T> {
    fn default() -> Self {
        Self { key: None, cached: OnceCell::new() }
    }
}

impl<T: Entity> std::fmt::Debug for BelongsTo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BelongsTo")
            .field("key", &self.key)
            .field("resolved", &self.cached.get().is_some())
            .finish()
    }
}

impl<T: Entity> BelongsTo<T> {
    /// The raw foreign key, if the source row carried one.
    pub fn key(&self) -> Option<PrimaryKey> {
        self.key
    }

    /// Whether the target has already been fetched (or primed by a join).
    pub fn is_resolved(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Resolve the target, fetching it through `ctx` on first use.
    ///
    /// A present foreign key whose target row does not exist is a
    /// caller-visible [`Error::NotFound`], never a silent null.
    pub fn get(&self, ctx: &Context) -> Result<&T> {
        if let Some(target) = self.cached.get() {
            return Ok(target);
        }
        let key = self
            .key
            .ok_or_else(|| Error::NotFound("belongs-to foreign key is null".into()))?;
        let header = metadata::header_of::<T>()?;
        tracing::debug!(entity = %header.entity, %key, "resolving belongs-to");
        let target = query::find_by_key::<T>(ctx, key)?.ok_or_else(|| {
            Error::NotFound(format!("{} with primary key {key}", header.entity))
        })?;
        Ok(self.cached.get_or_init(|| Box::new(target)))
    }

    pub(crate) fn set_key(&mut self, key: Option<PrimaryKey>) {
        self.key = key;
    }

    /// Pre-populate the cache from an already-decoded joined row.
    pub(crate) fn prime(&mut self, target: T) {
        let _ = self.cached.set(Box::new(target));
    }
}

// ============================================================================
// HasMany
// ============================================================================

/// One-to-many reference: the target table carries a foreign key pointing
/// back at this row.
///
/// Nothing is stored eagerly. Every `each`/`load` call issues a fresh query
/// against the passed context, so the sequence is restartable and always
/// reflects the backend, never a cached snapshot.
pub struct HasMany<T: Entity> {
    owner: Option<PrimaryKey>,
    fk_column: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for HasMany<T> {
    fn default() -> Self {
        Self { owner: None, fk_column: None, _marker: PhantomData }
    }
}

impl<T: Entity> std::fmt::Debug for HasMany<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HasMany")
            .field("owner", &self.owner)
            .field("fk_column", &self.fk_column)
            .finish()
    }
}

impl<T: Entity> HasMany<T> {
    /// The owning row's primary key, once bound by the row mapper.
    pub fn owner_key(&self) -> Option<PrimaryKey> {
        self.owner
    }

    /// Visit every related row in backend order.
    pub fn each(&self, ctx: &Context, callback: impl FnMut(&T)) -> Result<()> {
        let (owner, fk_column) = self.binding()?;
        tracing::debug!(fk_column, %owner, "resolving has-many");
        query::find_by_foreign_key::<T>(ctx, fk_column, owner)?.each(callback)
    }

    /// Collect every related row into a vector.
    pub fn load(&self, ctx: &Context) -> Result<Vec<T>> {
        let (owner, fk_column) = self.binding()?;
        tracing::debug!(fk_column, %owner, "resolving has-many");
        query::find_by_foreign_key::<T>(ctx, fk_column, owner)?.all()
    }

    fn binding(&self) -> Result<(PrimaryKey, &str)> {
        match (self.owner, self.fk_column.as_deref()) {
            (Some(owner), Some(fk)) => Ok((owner, fk)),
            _ => Err(Error::Metadata(
                "has-many relation is not bound to a decoded row".into(),
            )),
        }
    }

    pub(crate) fn bind(&mut self, owner: PrimaryKey, fk_column: &str) {
        self.owner = Some(owner);
        self.fk_column = Some(fk_column.to_owned());
    }
}
