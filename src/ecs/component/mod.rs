//! Component types, schemas, and instances.
//!
//! A component type in this ECS is a registered descriptor, not a plain Rust
//! struct: a Rust marker type implements [`Component`] to provide a display
//! name, a [`Kind`], and a [`Schema`] describing the fields every instance of
//! the type carries. Registering the marker with the
//! [`Registry`](registry::Registry) assigns it a dense [`Id`] and installs an
//! object pool for its instances.
//!
//! # Architecture
//!
//! - [`Component`]: the static descriptor trait, usually produced by the
//!   `component!`, `tag_component!`, or `system_state_component!` macros.
//! - [`Schema`]: ordered field list; owns the reset/copy/clone logic that the
//!   pools rely on.
//! - [`Instance`]: one component's field values, allocated through a pool and
//!   reset on release.
//! - [`View`] / [`ViewMut`]: borrow-scoped field access. `View` exposes no
//!   setters, so writes through an immutable view are rejected at compile
//!   time rather than trapped at runtime.
//!
//! # Component kinds
//!
//! [`Kind::Tag`] marks schema-less components used purely for matching.
//! [`Kind::SystemState`] marks components that extend an entity's lifetime
//! past its removal: an entity holding one lingers as a ghost until the last
//! such component is detached.

pub mod pool;
pub mod registry;

use std::rc::Rc;
use std::sync::Arc;

use crate::ecs::field::{FieldType, Value};

pub use pool::{Pool, PoolOption};
pub use registry::Registry;

/// A component type identifier. Dense, unique per world, assigned at
/// registration and stable for the world's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// Construct a component Id from a raw u32 value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the index of this component type in dense storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Id {
    #[inline]
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<usize> for Id {
    #[inline]
    fn from(value: usize) -> Self {
        Self::new(value as u32)
    }
}

/// The behavioral kind of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Ordinary data component.
    Data,
    /// Marker component with an empty schema.
    Tag,
    /// Component that keeps a removed entity alive until detached.
    SystemState,
}

/// The static descriptor implemented by component marker types.
///
/// The marker type itself carries no data; instances are
/// [`Instance`]s shaped by the schema. Implemented by hand when a component
/// needs custom field types, or through the declaration macros:
///
/// ```rust,ignore
/// component! {
///     pub struct Projectile {
///         speed: number = 12.5,
///         waypoints: array,
///         payload: json,
///     }
/// }
/// ```
pub trait Component: 'static {
    /// Display name for diagnostics and stats.
    fn name() -> &'static str;

    /// The schema instances of this type follow.
    fn schema() -> Schema;

    /// The component kind. Defaults to plain data.
    fn kind() -> Kind {
        Kind::Data
    }
}

/// One field declaration inside a [`Schema`].
pub struct Field {
    name: &'static str,
    ty: Arc<dyn FieldType>,
    default: Option<Value>,
}

impl Field {
    /// The field's name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The field's type.
    #[inline]
    pub fn ty(&self) -> &dyn FieldType {
        self.ty.as_ref()
    }

    /// Construct this field's initial value: the declared default under the
    /// field type's clone semantics, or the type default.
    fn initial(&self) -> Value {
        match &self.default {
            Some(default) => self.ty.clone_value(default),
            None => self.ty.default_value(),
        }
    }
}

/// The ordered field list of a component type.
///
/// The schema owns every operation that touches a whole instance: construct,
/// reset to defaults, copy, clone, and partial application of init values.
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// An empty schema, used by tag components.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { fields: Vec::new() }
    }

    /// Number of declared fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are declared.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate the declared fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Position of a field by name.
    #[inline]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Construct a fresh instance with every field at its default.
    pub fn instantiate(&self, type_id: Id) -> Instance {
        Instance {
            type_id,
            values: self.fields.iter().map(Field::initial).collect(),
        }
    }

    /// Reset an instance so every field equals the schema default again.
    /// Reuses the instance's field slots.
    pub fn reset(&self, instance: &mut Instance) {
        for (field, value) in self.fields.iter().zip(instance.values.iter_mut()) {
            let initial = field.initial();
            field.ty.copy(&initial, value);
        }
    }

    /// Copy every field of `src` into `dest` under the field types' copy
    /// semantics.
    pub fn copy(&self, src: &Instance, dest: &mut Instance) {
        for (index, field) in self.fields.iter().enumerate() {
            field.ty.copy(&src.values[index], &mut dest.values[index]);
        }
    }

    /// Produce a fresh instance equal to `src` under the field types' clone
    /// semantics.
    pub fn clone_instance(&self, src: &Instance) -> Instance {
        Instance {
            type_id: src.type_id,
            values: self
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| field.ty.clone_value(&src.values[index]))
                .collect(),
        }
    }

    /// Copy a partial set of named values into an instance. Used for attach
    /// init values. Unknown field names are skipped with a warning.
    pub fn apply(&self, instance: &mut Instance, values: &[(&str, Value)]) {
        for (name, value) in values {
            match self.field_index(name) {
                Some(index) => self.fields[index].ty.copy(value, &mut instance.values[index]),
                None => log::warn!("init value for unknown field '{name}' skipped"),
            }
        }
    }
}

/// Builder for hand-written schemas.
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Declare a field.
    ///
    /// # Panics
    ///
    /// Panics if a field with the same name was already declared. A schema
    /// with colliding field names is invalid.
    pub fn field(
        mut self,
        name: &'static str,
        ty: Arc<dyn FieldType>,
        default: Option<Value>,
    ) -> Self {
        if self.fields.iter().any(|f| f.name == name) {
            panic!("invalid schema: duplicate field '{name}'");
        }
        self.fields.push(Field { name, ty, default });
        self
    }

    /// Finish the schema.
    pub fn finish(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

/// Registered metadata for a component type.
#[derive(Clone)]
pub struct Info {
    id: Id,
    name: &'static str,
    kind: Kind,
    schema: Arc<Schema>,
}

impl Info {
    pub(crate) fn new(id: Id, name: &'static str, kind: Kind, schema: Arc<Schema>) -> Self {
        Self {
            id,
            name,
            kind,
            schema,
        }
    }

    /// The component type's dense id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// The component type's display name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The component type's kind.
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The component type's schema.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// One component's field values. Owned by an entity while attached, and by
/// the type's pool while free.
pub struct Instance {
    type_id: Id,
    values: Box<[Value]>,
}

impl Instance {
    /// The component type this instance belongs to.
    #[inline]
    pub fn type_id(&self) -> Id {
        self.type_id
    }

    #[inline]
    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

/// Read-only access to a component instance's fields.
///
/// Obtaining a `View` never emits reactive events. Writes are rejected at
/// compile time: the type has no mutating methods.
pub struct View<'a> {
    schema: Arc<Schema>,
    instance: &'a Instance,
}

impl<'a> View<'a> {
    pub(crate) fn new(schema: Arc<Schema>, instance: &'a Instance) -> Self {
        Self { schema, instance }
    }

    /// The component type of the viewed instance.
    #[inline]
    pub fn type_id(&self) -> Id {
        self.instance.type_id
    }

    /// Look up a field value by name.
    #[inline]
    pub fn try_value(&self, name: &str) -> Option<&Value> {
        let index = self.schema.field_index(name)?;
        Some(&self.instance.values[index])
    }

    /// A field value by name.
    ///
    /// # Panics
    ///
    /// Panics if the schema declares no such field.
    pub fn value(&self, name: &str) -> &Value {
        self.try_value(name)
            .unwrap_or_else(|| panic!("component has no field '{name}'"))
    }

    /// A numeric field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not a number.
    pub fn number(&self, name: &str) -> f64 {
        self.value(name)
            .as_number()
            .unwrap_or_else(|| panic!("field '{name}' is not a number"))
    }

    /// A boolean field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not a boolean.
    pub fn boolean(&self, name: &str) -> bool {
        self.value(name)
            .as_bool()
            .unwrap_or_else(|| panic!("field '{name}' is not a boolean"))
    }

    /// A text field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not text.
    pub fn text(&self, name: &str) -> &str {
        self.value(name)
            .as_text()
            .unwrap_or_else(|| panic!("field '{name}' is not text"))
    }

    /// An array field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not an array.
    pub fn array(&self, name: &str) -> &[Value] {
        self.value(name)
            .as_array()
            .unwrap_or_else(|| panic!("field '{name}' is not an array"))
    }

    /// A JSON field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not JSON.
    pub fn json(&self, name: &str) -> &serde_json::Value {
        self.value(name)
            .as_json()
            .unwrap_or_else(|| panic!("field '{name}' is not json"))
    }

    /// A reference field by name, if set.
    ///
    /// # Panics
    ///
    /// Panics if the schema declares no such field.
    pub fn reference(&self, name: &str) -> Option<&Rc<dyn std::any::Any>> {
        self.value(name).as_reference()
    }
}

/// Mutable access to a component instance's fields.
///
/// Handed out by the mutable component accessors, which announce the access
/// to every reactive query listening for changes on this component type.
pub struct ViewMut<'a> {
    schema: Arc<Schema>,
    instance: &'a mut Instance,
}

impl<'a> ViewMut<'a> {
    pub(crate) fn new(schema: Arc<Schema>, instance: &'a mut Instance) -> Self {
        Self { schema, instance }
    }

    /// The component type of the viewed instance.
    #[inline]
    pub fn type_id(&self) -> Id {
        self.instance.type_id
    }

    /// A field value by name.
    ///
    /// # Panics
    ///
    /// Panics if the schema declares no such field.
    pub fn value(&self, name: &str) -> &Value {
        let index = self
            .schema
            .field_index(name)
            .unwrap_or_else(|| panic!("component has no field '{name}'"));
        &self.instance.values[index]
    }

    /// A field value by name, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the schema declares no such field.
    pub fn value_mut(&mut self, name: &str) -> &mut Value {
        let index = self
            .schema
            .field_index(name)
            .unwrap_or_else(|| panic!("component has no field '{name}'"));
        &mut self.instance.values[index]
    }

    /// Copy a value into a field under its field type's copy semantics.
    ///
    /// # Panics
    ///
    /// Panics if the schema declares no such field.
    pub fn set(&mut self, name: &str, value: &Value) {
        let index = self
            .schema
            .field_index(name)
            .unwrap_or_else(|| panic!("component has no field '{name}'"));
        let field = &self.schema.fields[index];
        field.ty.copy(value, &mut self.instance.values[index]);
    }

    /// Set a numeric field.
    pub fn set_number(&mut self, name: &str, value: f64) {
        *self.value_mut(name) = Value::Number(value);
    }

    /// Set a boolean field.
    pub fn set_boolean(&mut self, name: &str, value: bool) {
        *self.value_mut(name) = Value::Bool(value);
    }

    /// Set a text field.
    pub fn set_text(&mut self, name: &str, value: &str) {
        match self.value_mut(name) {
            Value::Text(text) => {
                text.clear();
                text.push_str(value);
            }
            slot => *slot = Value::from(value),
        }
    }

    /// A numeric field by name.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or not a number.
    pub fn number(&self, name: &str) -> f64 {
        self.value(name)
            .as_number()
            .unwrap_or_else(|| panic!("field '{name}' is not a number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::field;

    fn sample_schema() -> Schema {
        Schema::builder()
            .field("x", field::number(), Some(Value::from(7)))
            .field("xs", field::array(), Some(Value::from(vec![1, 2, 3])))
            .field("label", field::text(), None)
            .finish()
    }

    #[test]
    fn instantiate_applies_defaults() {
        // Given
        let schema = sample_schema();

        // When
        let instance = schema.instantiate(Id::new(0));

        // Then
        assert_eq!(instance.values()[0], Value::from(7));
        assert_eq!(instance.values()[1], Value::from(vec![1, 2, 3]));
        assert_eq!(instance.values()[2], Value::from(""));
    }

    #[test]
    fn instantiate_clones_array_defaults() {
        // Given
        let schema = sample_schema();

        // When
        let mut a = schema.instantiate(Id::new(0));
        let b = schema.instantiate(Id::new(0));
        a.values_mut()[1].as_array_mut().unwrap().push(Value::from(4));

        // Then - Instances do not share default storage
        assert_eq!(b.values()[1].as_array().unwrap().len(), 3);
    }

    #[test]
    fn reset_restores_defaults() {
        // Given
        let schema = sample_schema();
        let mut instance = schema.instantiate(Id::new(0));
        instance.values_mut()[0] = Value::from(99);
        instance.values_mut()[1].as_array_mut().unwrap().clear();

        // When
        schema.reset(&mut instance);

        // Then
        assert_eq!(instance.values()[0], Value::from(7));
        assert_eq!(instance.values()[1], Value::from(vec![1, 2, 3]));
    }

    #[test]
    fn clone_then_copy_roundtrip() {
        // Given
        let schema = sample_schema();
        let mut src = schema.instantiate(Id::new(0));
        src.values_mut()[0] = Value::from(13);
        src.values_mut()[2] = Value::from("named");

        // When
        let cloned = schema.clone_instance(&src);
        let mut copied = schema.instantiate(Id::new(0));
        schema.copy(&cloned, &mut copied);

        // Then - Deep structural equality across both transfers
        assert_eq!(copied.values()[0], Value::from(13));
        assert_eq!(copied.values()[1], Value::from(vec![1, 2, 3]));
        assert_eq!(copied.values()[2], Value::from("named"));
    }

    #[test]
    fn apply_copies_partial_values() {
        // Given
        let schema = sample_schema();
        let mut instance = schema.instantiate(Id::new(0));

        // When - One known field, one unknown
        schema.apply(
            &mut instance,
            &[("x", Value::from(3)), ("missing", Value::from(1))],
        );

        // Then - Known field updated, rest untouched
        assert_eq!(instance.values()[0], Value::from(3));
        assert_eq!(instance.values()[1], Value::from(vec![1, 2, 3]));
    }

    #[test]
    #[should_panic(expected = "duplicate field 'x'")]
    fn builder_rejects_duplicate_fields() {
        Schema::builder()
            .field("x", field::number(), None)
            .field("x", field::boolean(), None)
            .finish();
    }

    #[test]
    fn views_expose_fields_by_name() {
        // Given
        let schema = Arc::new(sample_schema());
        let mut instance = schema.instantiate(Id::new(2));

        // When
        {
            let mut view = ViewMut::new(Arc::clone(&schema), &mut instance);
            view.set_number("x", 21.0);
            view.set_text("label", "tag");
        }
        let view = View::new(Arc::clone(&schema), &instance);

        // Then
        assert_eq!(view.number("x"), 21.0);
        assert_eq!(view.text("label"), "tag");
        assert_eq!(view.array("xs").len(), 3);
        assert_eq!(view.type_id(), Id::new(2));
        assert!(view.try_value("nope").is_none());
    }
}
