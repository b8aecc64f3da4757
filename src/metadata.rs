//! # Entity Metadata Registry
//!
//! Process-wide table describing how each entity type maps onto columns and
//! relations. Registration happens once, during single-threaded startup,
//! through [`entity`]; after that the registry is read-only and safe to
//! share (initialize-once-then-freeze).
//!
//! Accessors are plain `fn(&mut T) -> &mut F` pointers captured into typed
//! decode/bind closures at registration time, so the query path never needs
//! reflection, only the untyped [`EntityHeader`] and, behind a downcast,
//! the typed closure table.
//!
//! Column indices follow registration order: scalar properties and
//! belongs-to foreign keys each take the next `c{n}` slot; has-many members
//! carry no column and take none. This ordering is what the wire convention
//! `t{alias}_c{index}` refers to.

use std::any::{Any, TypeId};
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::{BelongsTo, Column, HasMany, PrimaryKey, TypeTag};
use crate::row::AliasView;
use crate::{Error, Result};

/// Marker for types that can be registered and decoded.
///
/// Entities are built field-by-field from a defaulted instance, hence the
/// `Default` bound.
pub trait Entity: Default + 'static {}

// ============================================================================
// Untyped header (shared with the builder and adapters)
// ============================================================================

/// One column-bearing member: a scalar property or a belongs-to foreign key.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub tag: TypeTag,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
}

/// One registered relation, by symbolic member name.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub member: String,
    pub kind: RelationKind,
    pub target: TypeId,
    pub target_type_name: &'static str,
    pub fk_column: String,
    /// Column index of the foreign key (belongs-to only).
    pub fk_index: Option<usize>,
    /// Position in the typed member table; the row decoder uses this to find
    /// the relation's attach/bind closure.
    pub(crate) member_index: usize,
}

/// Everything the query builder needs to know about an entity type,
/// without knowing the type.
#[derive(Debug)]
pub struct EntityHeader {
    pub entity: String,
    pub type_name: &'static str,
    pub type_id: TypeId,
    pub columns: Vec<ColumnInfo>,
    /// Column index of the primary key property, if one was registered.
    pub primary_key: Option<usize>,
    pub relations: Vec<RelationInfo>,
}

impl EntityHeader {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn relation(&self, member: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.member == member)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub(crate) fn primary_key_column(&self) -> Result<&ColumnInfo> {
        self.primary_key
            .and_then(|i| self.columns.get(i))
            .ok_or_else(|| {
                Error::Metadata(format!("{} has no primary key property", self.entity))
            })
    }
}

// ============================================================================
// Typed member table
// ============================================================================

type DecodeFn<T> = Box<dyn Fn(&mut T, Option<&str>) -> Result<()> + Send + Sync>;
type AttachFn<T> = Box<dyn Fn(&mut T, &AliasView<'_>) -> Result<()> + Send + Sync>;
type BindFn<T> = Box<dyn Fn(&mut T, PrimaryKey) + Send + Sync>;

pub(crate) enum TypedMember<T> {
    /// Scalar property: decode the cell at `column` into the field.
    Scalar { column: usize, decode: DecodeFn<T> },
    /// Belongs-to: decode the fk cell; `attach` primes the cache from a
    /// joined alias's columns.
    BelongsTo { column: usize, decode: DecodeFn<T>, attach: AttachFn<T> },
    /// Has-many: bind the owning row's primary key after scalar decoding.
    HasMany { bind: BindFn<T> },
}

/// Typed side of the registry entry: the header plus the closure table the
/// row mapper drives.
pub struct EntityMetadata<T: Entity> {
    header: Arc<EntityHeader>,
    members: Vec<TypedMember<T>>,
}

impl<T: Entity> EntityMetadata<T> {
    pub(crate) fn header(&self) -> &Arc<EntityHeader> {
        &self.header
    }

    pub(crate) fn members(&self) -> &[TypedMember<T>] {
        &self.members
    }
}

// ============================================================================
// Registration builder
// ============================================================================

/// Open a registration block for `T`, mapped to the named backend entity
/// (table or collection, the adapter decides what the name means).
///
/// ```rust
/// use quarry::{Entity, PrimaryKey};
///
/// #[derive(Default)]
/// struct Account {
///     id: PrimaryKey,
///     name: String,
/// }
/// impl Entity for Account {}
///
/// quarry::entity::<Account>("accounts")
///     .property("id", |a| &mut a.id)
///     .property("name", |a| &mut a.name)
///     .register()
///     .unwrap();
/// ```
pub fn entity<T: Entity>(name: &str) -> EntityBuilder<T> {
    EntityBuilder {
        entity: name.to_owned(),
        columns: Vec::new(),
        relations: Vec::new(),
        members: Vec::new(),
        member_names: Vec::new(),
        primary_key: None,
    }
}

pub struct EntityBuilder<T: Entity> {
    entity: String,
    columns: Vec<ColumnInfo>,
    relations: Vec<RelationInfo>,
    members: Vec<TypedMember<T>>,
    member_names: Vec<String>,
    primary_key: Option<usize>,
}

impl<T: Entity> EntityBuilder<T> {
    /// Register a scalar property. The column name doubles as the symbolic
    /// member name used in query conditions.
    pub fn property<F: Column>(mut self, column: &str, access: fn(&mut T) -> &mut F) -> Self {
        let index = self.columns.len();
        if F::TAG == TypeTag::PrimaryKey && !F::NULLABLE && self.primary_key.is_none() {
            self.primary_key = Some(index);
        }
        self.columns.push(ColumnInfo {
            name: column.to_owned(),
            tag: F::TAG,
            nullable: F::NULLABLE,
        });
        let name = column.to_owned();
        let decode: DecodeFn<T> = Box::new(move |target, cell| {
            *access(target) = F::decode(cell)
                .map_err(|source| Error::Decode { column: name.clone(), source })?;
            Ok(())
        });
        self.members.push(TypedMember::Scalar { column: index, decode });
        self.member_names.push(column.to_owned());
        self
    }

    /// Register a many-to-one relation. The foreign-key column takes the
    /// next column index; a null fk leaves the reference unset.
    pub fn belongs_to<U: Entity>(
        mut self,
        member: &str,
        fk_column: &str,
        access: fn(&mut T) -> &mut BelongsTo<U>,
    ) -> Self {
        let index = self.columns.len();
        self.columns.push(ColumnInfo {
            name: fk_column.to_owned(),
            tag: TypeTag::PrimaryKey,
            nullable: true,
        });
        let name = fk_column.to_owned();
        let decode: DecodeFn<T> = Box::new(move |target, cell| {
            let key = <Option<PrimaryKey>>::decode(cell)
                .map_err(|source| Error::Decode { column: name.clone(), source })?;
            access(target).set_key(key);
            Ok(())
        });
        let attach: AttachFn<T> = Box::new(move |target, view| {
            let meta = metadata_of::<U>()?;
            let joined = crate::row::decode_entity(&meta, view)?;
            access(target).prime(joined);
            Ok(())
        });
        self.relations.push(RelationInfo {
            member: member.to_owned(),
            kind: RelationKind::BelongsTo,
            target: TypeId::of::<U>(),
            target_type_name: std::any::type_name::<U>(),
            fk_column: fk_column.to_owned(),
            fk_index: Some(index),
            member_index: self.members.len(),
        });
        self.members.push(TypedMember::BelongsTo { column: index, decode, attach });
        self.member_names.push(member.to_owned());
        self
    }

    /// Register a one-to-many relation. Carries no column; the target
    /// table's `fk_column` points back at this entity's primary key.
    pub fn has_many<U: Entity>(
        mut self,
        member: &str,
        fk_column: &str,
        access: fn(&mut T) -> &mut HasMany<U>,
    ) -> Self {
        let fk = fk_column.to_owned();
        let bind: BindFn<T> = Box::new(move |target, owner| access(target).bind(owner, &fk));
        self.relations.push(RelationInfo {
            member: member.to_owned(),
            kind: RelationKind::HasMany,
            target: TypeId::of::<U>(),
            target_type_name: std::any::type_name::<U>(),
            fk_column: fk_column.to_owned(),
            fk_index: None,
            member_index: self.members.len(),
        });
        self.members.push(TypedMember::HasMany { bind });
        self.member_names.push(member.to_owned());
        self
    }

    /// Commit the registration. Fails (and leaves the registry untouched)
    /// on a duplicate member name within the entity or a second registration
    /// of the same type.
    pub fn register(self) -> Result<()> {
        for (i, name) in self.member_names.iter().enumerate() {
            if self.member_names[..i].contains(name) {
                return Err(Error::Metadata(format!(
                    "member {name:?} registered twice on {}",
                    self.entity
                )));
            }
        }
        let type_id = TypeId::of::<T>();
        let header = Arc::new(EntityHeader {
            entity: self.entity,
            type_name: std::any::type_name::<T>(),
            type_id,
            columns: self.columns,
            primary_key: self.primary_key,
            relations: self.relations,
        });
        let typed: Arc<dyn Any + Send + Sync> =
            Arc::new(EntityMetadata::<T> { header: header.clone(), members: self.members });

        let mut registry = REGISTRY.write();
        if registry.contains_key(&type_id) {
            return Err(Error::Metadata(format!(
                "entity type {} is already registered",
                header.type_name
            )));
        }
        tracing::debug!(entity = %header.entity, columns = header.columns.len(), "registered entity");
        registry.insert(type_id, Entry { header, typed });
        Ok(())
    }
}

// ============================================================================
// Registry storage and lookups
// ============================================================================

struct Entry {
    header: Arc<EntityHeader>,
    typed: Arc<dyn Any + Send + Sync>,
}

static REGISTRY: LazyLock<RwLock<HashMap<TypeId, Entry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Read-only view of an entity's registered properties and relations.
pub fn header_of<T: Entity>() -> Result<Arc<EntityHeader>> {
    header_by_id(TypeId::of::<T>(), std::any::type_name::<T>())
}

/// All registered column-bearing properties of `T`, in index order.
pub fn properties_of<T: Entity>() -> Result<Vec<ColumnInfo>> {
    header_of::<T>().map(|h| h.columns.clone())
}

/// All registered relations of `T`, in registration order.
pub fn relations_of<T: Entity>() -> Result<Vec<RelationInfo>> {
    header_of::<T>().map(|h| h.relations.clone())
}

pub(crate) fn header_by_id(id: TypeId, type_name: &str) -> Result<Arc<EntityHeader>> {
    REGISTRY
        .read()
        .get(&id)
        .map(|entry| entry.header.clone())
        .ok_or_else(|| {
            Error::Metadata(format!("entity type {type_name} has no registered metadata"))
        })
}

pub(crate) fn metadata_of<T: Entity>() -> Result<Arc<EntityMetadata<T>>> {
    let typed = REGISTRY
        .read()
        .get(&TypeId::of::<T>())
        .map(|entry| entry.typed.clone())
        .ok_or_else(|| {
            Error::Metadata(format!(
                "entity type {} has no registered metadata",
                std::any::type_name::<T>()
            ))
        })?;
    typed.downcast::<EntityMetadata<T>>().map_err(|_| {
        Error::Metadata(format!(
            "registry entry for {} holds the wrong type",
            std::any::type_name::<T>()
        ))
    })
}
