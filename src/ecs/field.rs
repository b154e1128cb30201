//! Field values and field types for schema-driven components.
//!
//! Components in this ECS are not static Rust structs. Each component type
//! carries a [`Schema`](crate::ecs::component::Schema) describing its fields,
//! and each field holds a [`Value`]. A [`FieldType`] governs how a field is
//! defaulted, copied, and cloned, which is what lets pooled component
//! instances be reset to a pristine state without reallocating.
//!
//! # Architecture
//!
//! - **[`Value`]**: a tagged variant covering every representation a field can
//!   take. Arrays and JSON values are deep structures; references are opaque
//!   and compared/copied by identity.
//!
//! - **[`FieldType`]**: the four-member contract `{name, default, copy, clone}`.
//!   Built-in kinds are provided for numbers, booleans, text, arrays,
//!   references, and JSON documents. Custom kinds implement the same trait,
//!   either directly or through [`FieldTypeBuilder`].
//!
//! # Copy vs. clone
//!
//! `copy` writes into an existing destination and is allowed to reuse its
//! allocations (the array kind clears and refills the destination vector).
//! `clone` produces a fresh value. Pool reset uses clone semantics against the
//! schema default, so a recycled instance is indistinguishable from a newly
//! constructed one.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A single field value inside a component instance.
///
/// `Clone` is structural for everything except [`Value::Reference`], which
/// clones the handle only. This matches the built-in field type semantics, so
/// `Value::clone` is the right primitive for field types to build on.
#[derive(Clone)]
pub enum Value {
    /// A numeric field. All numbers are stored as `f64`.
    Number(f64),
    /// A boolean field.
    Bool(bool),
    /// A text field.
    Text(String),
    /// An ordered list of values.
    Array(Vec<Value>),
    /// An opaque reference, copied by identity. `None` is the unset state.
    Reference(Option<Rc<dyn Any>>),
    /// A JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Wrap an arbitrary value in an identity-copied reference field.
    pub fn reference<T: Any>(value: T) -> Self {
        Value::Reference(Some(Rc::new(value)))
    }

    /// The unset reference value.
    #[inline]
    pub const fn empty_reference() -> Self {
        Value::Reference(None)
    }

    /// Get the numeric value, if this is a number.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean value, if this is a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the text value, if this is text.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the elements, if this is an array.
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the elements mutably, if this is an array.
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get the reference handle, if this is a reference field.
    #[inline]
    pub fn as_reference(&self) -> Option<&Rc<dyn Any>> {
        match self {
            Value::Reference(handle) => handle.as_ref(),
            _ => None,
        }
    }

    /// Get the JSON document, if this is a JSON field.
    #[inline]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Reference(Some(_)) => write!(f, "Reference(<opaque>)"),
            Value::Reference(None) => write!(f, "Reference(None)"),
            Value::Json(json) => write!(f, "Json({json})"),
        }
    }
}

/// Structural equality, except references which compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => match (a, b) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

/// The contract every field type implements: a name, a default value, copy
/// into an existing destination, and clone into a fresh value.
///
/// Built-in kinds cover the common representations. Custom kinds can reuse
/// the same [`Value`] variants with different semantics (for example an array
/// copied by identity), implemented directly or via [`FieldTypeBuilder`].
pub trait FieldType: 'static {
    /// The field type's name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Construct the default value for a field of this type.
    fn default_value(&self) -> Value;

    /// Copy `src` into `dest`, reusing `dest`'s allocations where possible.
    fn copy(&self, src: &Value, dest: &mut Value);

    /// Produce a fresh value equal to `src` under this type's semantics.
    fn clone_value(&self, src: &Value) -> Value;
}

/// The built-in numeric field type. Default `0`.
pub struct NumberType;

impl FieldType for NumberType {
    fn name(&self) -> &'static str {
        "number"
    }

    fn default_value(&self) -> Value {
        Value::Number(0.0)
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        *dest = src.clone();
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The built-in boolean field type. Default `false`.
pub struct BooleanType;

impl FieldType for BooleanType {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn default_value(&self) -> Value {
        Value::Bool(false)
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        *dest = src.clone();
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The built-in text field type. Default `""`.
///
/// Copy reuses the destination string's allocation.
pub struct TextType;

impl FieldType for TextType {
    fn name(&self) -> &'static str {
        "text"
    }

    fn default_value(&self) -> Value {
        Value::Text(String::new())
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        match (src, dest) {
            (Value::Text(src), Value::Text(dest)) => dest.clone_from(src),
            (src, dest) => *dest = src.clone(),
        }
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The built-in array field type. Default `[]`.
///
/// Copy replaces the destination's contents element by element, keeping the
/// destination vector's allocation. Clone produces a fresh vector whose
/// elements follow [`Value::clone`] semantics.
pub struct ArrayType;

impl FieldType for ArrayType {
    fn name(&self) -> &'static str {
        "array"
    }

    fn default_value(&self) -> Value {
        Value::Array(Vec::new())
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        match (src, dest) {
            (Value::Array(src), Value::Array(dest)) => {
                dest.clear();
                dest.extend(src.iter().cloned());
            }
            (src, dest) => *dest = src.clone(),
        }
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The built-in reference field type. Default unset.
///
/// References are copied and cloned by identity, never deeply.
pub struct ReferenceType;

impl FieldType for ReferenceType {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn default_value(&self) -> Value {
        Value::Reference(None)
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        *dest = src.clone();
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The built-in JSON field type. Default `null`.
///
/// Copy and clone are deep structural copies of the document.
pub struct JsonType;

impl FieldType for JsonType {
    fn name(&self) -> &'static str {
        "json"
    }

    fn default_value(&self) -> Value {
        Value::Json(serde_json::Value::Null)
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        match (src, dest) {
            (Value::Json(src), Value::Json(dest)) => dest.clone_from(src),
            (src, dest) => *dest = src.clone(),
        }
    }

    fn clone_value(&self, src: &Value) -> Value {
        src.clone()
    }
}

/// The number field type.
pub fn number() -> Arc<dyn FieldType> {
    Arc::new(NumberType)
}

/// The boolean field type.
pub fn boolean() -> Arc<dyn FieldType> {
    Arc::new(BooleanType)
}

/// The text field type.
pub fn text() -> Arc<dyn FieldType> {
    Arc::new(TextType)
}

/// The array field type.
pub fn array() -> Arc<dyn FieldType> {
    Arc::new(ArrayType)
}

/// The reference field type.
pub fn reference() -> Arc<dyn FieldType> {
    Arc::new(ReferenceType)
}

/// The JSON field type.
pub fn json() -> Arc<dyn FieldType> {
    Arc::new(JsonType)
}

/// Resolve a built-in field type by its kind name.
///
/// This backs the `component!` declaration macros.
///
/// # Panics
///
/// Panics if `kind` does not name a built-in field type. A schema declaring an
/// unknown kind is invalid.
pub fn builtin(kind: &str) -> Arc<dyn FieldType> {
    match kind {
        "number" => number(),
        "boolean" => boolean(),
        "text" => text(),
        "array" => array(),
        "reference" => reference(),
        "json" => json(),
        other => panic!("invalid schema: unknown field type '{other}'"),
    }
}

/// A field type assembled from closures via [`FieldTypeBuilder`].
pub struct CustomFieldType {
    name: &'static str,
    default: Box<dyn Fn() -> Value>,
    copy: Box<dyn Fn(&Value, &mut Value)>,
    clone: Box<dyn Fn(&Value) -> Value>,
}

impl FieldType for CustomFieldType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_value(&self) -> Value {
        (self.default)()
    }

    fn copy(&self, src: &Value, dest: &mut Value) {
        (self.copy)(src, dest)
    }

    fn clone_value(&self, src: &Value) -> Value {
        (self.clone)(src)
    }
}

/// Builder for user-defined field types.
///
/// All four members of the field type contract must be provided before
/// [`finish`](Self::finish) will produce a type.
///
/// ```rust,ignore
/// let vec2 = FieldTypeBuilder::new()
///     .name("vec2")
///     .default_value(|| Value::from(vec![0.0, 0.0]))
///     .copy(|src, dest| { /* ... */ })
///     .clone_with(|src| src.clone())
///     .finish();
/// ```
#[derive(Default)]
pub struct FieldTypeBuilder {
    name: Option<&'static str>,
    default: Option<Box<dyn Fn() -> Value>>,
    copy: Option<Box<dyn Fn(&Value, &mut Value)>>,
    clone: Option<Box<dyn Fn(&Value) -> Value>>,
}

impl FieldTypeBuilder {
    /// Start an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field type's name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Set the default value factory.
    pub fn default_value(mut self, default: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    /// Set the copy function.
    pub fn copy(mut self, copy: impl Fn(&Value, &mut Value) + 'static) -> Self {
        self.copy = Some(Box::new(copy));
        self
    }

    /// Set the clone function.
    pub fn clone_with(mut self, clone: impl Fn(&Value) -> Value + 'static) -> Self {
        self.clone = Some(Box::new(clone));
        self
    }

    /// Finish the definition.
    ///
    /// # Panics
    ///
    /// Panics if any of the four members (name, default, copy, clone) was not
    /// provided.
    pub fn finish(self) -> Arc<dyn FieldType> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.default.is_none() {
            missing.push("default");
        }
        if self.copy.is_none() {
            missing.push("copy");
        }
        if self.clone.is_none() {
            missing.push("clone");
        }
        if !missing.is_empty() {
            panic!(
                "invalid field type definition: missing {}",
                missing.join(", ")
            );
        }
        Arc::new(CustomFieldType {
            name: self.name.unwrap(),
            default: self.default.unwrap(),
            copy: self.copy.unwrap(),
            clone: self.clone.unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_defaults_and_copy() {
        // Given
        let ty = NumberType;

        // When
        let mut dest = ty.default_value();
        ty.copy(&Value::Number(42.0), &mut dest);

        // Then
        assert_eq!(dest, Value::Number(42.0));
        assert_eq!(ty.default_value(), Value::Number(0.0));
    }

    #[test]
    fn array_copy_replaces_contents() {
        // Given
        let ty = ArrayType;
        let src = Value::from(vec![1, 2, 3]);
        let mut dest = Value::from(vec![9, 9]);

        // When
        ty.copy(&src, &mut dest);

        // Then
        assert_eq!(dest, Value::from(vec![1, 2, 3]));
    }

    #[test]
    fn array_clone_is_fresh() {
        // Given
        let ty = ArrayType;
        let src = Value::from(vec![1, 2, 3]);

        // When
        let mut cloned = ty.clone_value(&src);
        cloned.as_array_mut().unwrap().push(Value::Number(4.0));

        // Then - Source unaffected
        assert_eq!(src.as_array().unwrap().len(), 3);
        assert_eq!(cloned.as_array().unwrap().len(), 4);
    }

    #[test]
    fn reference_copies_by_identity() {
        // Given
        let ty = ReferenceType;
        let src = Value::reference(String::from("shared"));

        // When
        let cloned = ty.clone_value(&src);

        // Then - Same handle, not a deep copy
        assert_eq!(src, cloned);
        assert_eq!(ty.default_value(), Value::Reference(None));
    }

    #[test]
    fn json_copy_is_deep() {
        // Given
        let ty = JsonType;
        let src = Value::Json(serde_json::json!({"a": [1, 2], "b": {"c": true}}));
        let mut dest = ty.default_value();

        // When
        ty.copy(&src, &mut dest);

        // Then
        assert_eq!(src, dest);
    }

    #[test]
    fn builtin_lookup() {
        // Then
        assert_eq!(builtin("number").name(), "number");
        assert_eq!(builtin("array").name(), "array");
        assert_eq!(builtin("json").name(), "json");
    }

    #[test]
    #[should_panic(expected = "unknown field type")]
    fn builtin_lookup_rejects_unknown_kind() {
        builtin("quaternion");
    }

    #[test]
    fn custom_field_type_roundtrip() {
        // Given - An array kind copied by identity instead of element-wise
        let ty = FieldTypeBuilder::new()
            .name("frozen_array")
            .default_value(|| Value::Array(Vec::new()))
            .copy(|src, dest| *dest = src.clone())
            .clone_with(Value::clone)
            .finish();

        // When
        let mut dest = ty.default_value();
        ty.copy(&Value::from(vec![5]), &mut dest);

        // Then
        assert_eq!(ty.name(), "frozen_array");
        assert_eq!(dest, Value::from(vec![5]));
    }

    #[test]
    #[should_panic(expected = "missing default, clone")]
    fn builder_rejects_incomplete_definition() {
        FieldTypeBuilder::new()
            .name("incomplete")
            .copy(|src, dest| *dest = src.clone())
            .finish();
    }

    #[test]
    fn value_equality_by_variant() {
        // Then
        assert_eq!(Value::from(1.5), Value::Number(1.5));
        assert_ne!(Value::from(1.5), Value::Bool(true));
        assert_ne!(
            Value::reference(String::from("a")),
            Value::reference(String::from("a"))
        );
    }
}
