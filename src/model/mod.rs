//! # Entity Value Model
//!
//! Clean DTOs for the values an entity is made of: primary keys, decodable
//! column types, and the two lazily-resolved relation fields.
//! These types cross every boundary between adapter, builder, mapper and
//! user code.
//!
//! Design rule: this module is pure data plus decoding. No registry access
//! except at the relation-resolution entry points, no adapter state.

pub mod column;
pub mod key;
pub mod relation;

pub use column::{Column, DecodeError, TypeTag};
pub use key::PrimaryKey;
pub use relation::{BelongsTo, HasMany};
