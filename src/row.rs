//! Row mapper: decodes adapter result rows into typed entity instances.
//!
//! Column positions are resolved once per [`ResultSet`] against the wire
//! convention `t{alias}_c{index}`, then each row is decoded through the
//! entity's registered closures. A decode failure is fatal for the row and
//! aborts the surrounding callback loop; no partial entity escapes.

use crate::adapter::ResultSet;
use crate::metadata::{Entity, EntityMetadata, TypedMember};
use crate::model::PrimaryKey;
use crate::{Error, Result};

// ============================================================================
// Alias-scoped column resolution
// ============================================================================

/// Positions of one alias's columns within a ResultSet header.
///
/// `positions[i]` is where wire column `t{alias}_c{i}` sits in the row, or
/// `None` when the header does not carry it (treated as a null cell).
pub(crate) struct AliasColumns {
    positions: Vec<Option<usize>>,
}

impl AliasColumns {
    pub(crate) fn resolve(result: &ResultSet, alias: usize, column_count: usize) -> Self {
        let positions = (0..column_count)
            .map(|index| {
                let wire = format!("t{alias}_c{index}");
                result.columns.iter().position(|name| *name == wire)
            })
            .collect();
        Self { positions }
    }
}

/// One row restricted to one alias's columns.
pub(crate) struct AliasView<'a> {
    row: &'a [Option<String>],
    columns: &'a AliasColumns,
}

impl AliasView<'_> {
    pub(crate) fn cell(&self, column: usize) -> Option<&str> {
        self.columns
            .positions
            .get(column)
            .copied()
            .flatten()
            .and_then(|pos| self.row.get(pos))
            .and_then(|cell| cell.as_deref())
    }
}

// ============================================================================
// Entity decoding
// ============================================================================

/// Decode one alias's columns into a fresh entity instance.
///
/// Scalar properties and belongs-to foreign keys decode first; has-many
/// members are then bound to the row's primary key.
pub(crate) fn decode_entity<T: Entity>(
    meta: &EntityMetadata<T>,
    view: &AliasView<'_>,
) -> Result<T> {
    let mut entity = T::default();
    let primary_key = meta.header().primary_key;
    let mut owner_key: Option<PrimaryKey> = None;

    for member in meta.members() {
        match member {
            TypedMember::Scalar { column, decode } => {
                let cell = view.cell(*column);
                decode(&mut entity, cell)?;
                if primary_key == Some(*column) {
                    owner_key = cell.and_then(|text| text.parse().ok());
                }
            }
            TypedMember::BelongsTo { column, decode, .. } => {
                decode(&mut entity, view.cell(*column))?;
            }
            TypedMember::HasMany { .. } => {}
        }
    }

    if let Some(owner) = owner_key {
        for member in meta.members() {
            if let TypedMember::HasMany { bind } = member {
                bind(&mut entity, owner);
            }
        }
    }

    Ok(entity)
}

// ============================================================================
// Row decoder
// ============================================================================

/// A joined alias the decoder also has to read.
#[derive(Clone, Copy)]
pub(crate) struct JoinDecode {
    pub alias: usize,
    pub column_count: usize,
    /// Typed-member index of the belongs-to this join came from; joined
    /// has-many aliases widen the result but decode nothing extra.
    pub attach_member: Option<usize>,
}

/// Per-ResultSet decoder for one query's root entity and joined aliases.
pub(crate) struct RowDecoder<'a, T: Entity> {
    meta: &'a EntityMetadata<T>,
    root: AliasColumns,
    joined: Vec<(usize, AliasColumns)>,
}

impl<'a, T: Entity> RowDecoder<'a, T> {
    pub(crate) fn new(
        meta: &'a EntityMetadata<T>,
        result: &ResultSet,
        joins: impl IntoIterator<Item = JoinDecode>,
    ) -> Self {
        let root = AliasColumns::resolve(result, 0, meta.header().columns.len());
        let joined = joins
            .into_iter()
            .filter_map(|join| {
                let member = join.attach_member?;
                Some((member, AliasColumns::resolve(result, join.alias, join.column_count)))
            })
            .collect();
        Self { meta, root, joined }
    }

    /// Decode one row into an entity, priming joined belongs-to caches.
    pub(crate) fn decode(&self, row: &[Option<String>]) -> Result<T> {
        let view = AliasView { row, columns: &self.root };
        let mut entity = decode_entity(self.meta, &view)?;

        for (member_index, columns) in &self.joined {
            let view = AliasView { row, columns };
            match self.meta.members().get(*member_index) {
                Some(TypedMember::BelongsTo { attach, .. }) => attach(&mut entity, &view)?,
                _ => {
                    return Err(Error::Metadata(
                        "join is not backed by a belongs-to member".into(),
                    ));
                }
            }
        }

        Ok(entity)
    }
}
