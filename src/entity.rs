//! Entity trait - how a Rust type maps onto its descriptor
//!
//! Implementations are normally produced by a code generator; the trait is
//! small enough to write by hand:
//!
//! ```ignore
//! impl Entity for Test {
//!     const TYPE_NAME: &'static str = "Test";
//!     fn descriptor() -> ObjectDescriptor {
//!         ObjectDescriptor::new("Test", "test").column("length", ColumnKind::Integer)
//!     }
//!     fn id(&self) -> i64 { self.id }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//!     fn encode(&self, row: &mut Row) { row.set("length", self.length); }
//!     fn decode(row: &Row) -> Self { Test { id: 0, length: row.get_i64("length") } }
//! }
//! ```

use crate::codec::{Link, Row};
use crate::schema::{ObjectDescriptor, SchemaRegistry};
use crate::storage::Engine;
use crate::Result;

/// A persistable object type.
pub trait Entity: Sized {
    /// Registry key of the type
    const TYPE_NAME: &'static str;

    /// Table layout of the type
    fn descriptor() -> ObjectDescriptor;

    /// Primary key; 0 while unsaved
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Write every non-key column, links included
    fn encode(&self, row: &mut Row);

    /// Rebuild the value from a row; the key is set by the caller
    fn decode(row: &Row) -> Self;

    /// Link fields, so embedded targets can be saved before this row
    fn links_mut(&mut self) -> Vec<&mut dyn LinkSlot> {
        Vec::new()
    }

    /// Register the types this type links to
    fn describe_links(_registry: &mut SchemaRegistry) -> Result<()> {
        Ok(())
    }
}

/// Type-erased access to a [`Link`] field.
pub trait LinkSlot {
    fn target_type(&self) -> &'static str;

    /// Save an embedded, unsaved target. Returns true when a row was inserted.
    fn save_target(&mut self, engine: &Engine) -> Result<bool>;

    /// Reset the embedded target's key after its insert was rolled back
    fn forget_key(&mut self);
}

impl<T: Entity> LinkSlot for Link<T> {
    fn target_type(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn save_target(&mut self, engine: &Engine) -> Result<bool> {
        match self {
            Link::Loaded(target) if target.id() == 0 => {
                engine.try_save(target.as_mut())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn forget_key(&mut self) {
        if let Link::Loaded(target) = self {
            target.set_id(0);
        }
    }
}
