//! Field specifications bound to the attributes of a schema.
//!
//! A [`FieldSpec`] gates persistence of one record field. Validation is a
//! required-field gate first and a kind check second: an optional field passes
//! [`FieldSpec::validate`] whatever the value's kind, a required field passes only
//! when the value's [`ValueKind`] is one the spec accepts (or, for
//! [`EnumField`]/[`BoolField`], when the value is a member of the allowed set).
//!
//! # Example
//!
//! ```ignore
//! use docmapper::field::{FieldBuilder, IndexKind, IntegerField, StringField};
//!
//! let name = StringField::new().required().index(IndexKind::Unique);
//! let nights = IntegerField::new().required().default_value(1);
//! ```

use bson::{Bson, DateTime};
use chrono::Utc;
use std::{fmt, sync::Arc};

/// Classification of a BSON value used by field specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    String,
    Binary,
    Int32,
    Int64,
    Double,
    Boolean,
    Array,
    Document,
    DateTime,
    ObjectId,
    Null,
    /// Any BSON type without a dedicated kind (regex, timestamp, decimal, ...).
    Other,
}

impl ValueKind {
    /// Every kind, in declaration order.
    pub const ALL: [ValueKind; 12] = [
        ValueKind::String,
        ValueKind::Binary,
        ValueKind::Int32,
        ValueKind::Int64,
        ValueKind::Double,
        ValueKind::Boolean,
        ValueKind::Array,
        ValueKind::Document,
        ValueKind::DateTime,
        ValueKind::ObjectId,
        ValueKind::Null,
        ValueKind::Other,
    ];

    /// Returns the kind of the given value.
    pub fn of(value: &Bson) -> Self {
        match value {
            Bson::String(_) => ValueKind::String,
            Bson::Binary(_) => ValueKind::Binary,
            Bson::Int32(_) => ValueKind::Int32,
            Bson::Int64(_) => ValueKind::Int64,
            Bson::Double(_) => ValueKind::Double,
            Bson::Boolean(_) => ValueKind::Boolean,
            Bson::Array(_) => ValueKind::Array,
            Bson::Document(_) => ValueKind::Document,
            Bson::DateTime(_) => ValueKind::DateTime,
            Bson::ObjectId(_) => ValueKind::ObjectId,
            Bson::Null => ValueKind::Null,
            _ => ValueKind::Other,
        }
    }
}

/// Index hint attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    Ascending,
    Descending,
    /// Ascending index enforcing uniqueness.
    Unique,
    Hashed,
    Text,
}

/// Default applied to a field that is absent at save time.
#[derive(Clone, Default)]
pub enum DefaultValue {
    /// The field has no default.
    #[default]
    None,
    /// A fixed value.
    Constant(Bson),
    /// A producer invoked each time a default is needed.
    Producer(Arc<dyn Fn() -> Bson + Send + Sync>),
}

impl DefaultValue {
    /// Returns `true` when no default is configured.
    pub fn is_none(&self) -> bool {
        matches!(self, DefaultValue::None)
    }

    /// Resolves the default, invoking the producer if there is one.
    pub fn resolve(&self) -> Option<Bson> {
        match self {
            DefaultValue::None => None,
            DefaultValue::Constant(value) => Some(value.clone()),
            DefaultValue::Producer(producer) => Some(producer()),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => f.write_str("None"),
            DefaultValue::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Options shared by every field spec.
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    /// `Some(true)` makes the field required. `None` and `Some(false)` are both optional.
    pub required: Option<bool>,
    /// Optional index hint.
    pub index: Option<IndexKind>,
    /// Default filled in at save time when the field is absent.
    pub default: DefaultValue,
}

impl FieldOptions {
    /// Returns `true` only when the field was explicitly marked required.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }
}

/// Validator and normalizer for one schema field.
pub trait FieldSpec: Send + Sync + fmt::Debug {
    /// The options this spec was declared with.
    fn options(&self) -> &FieldOptions;

    /// The value kinds this spec accepts.
    fn accepted_kinds(&self) -> Vec<ValueKind>;

    /// Returns `true` when the value's kind is accepted.
    fn accepts(&self, value: &Bson) -> bool {
        self.accepted_kinds().contains(&ValueKind::of(value))
    }

    /// Returns `true` when the value may be persisted.
    ///
    /// Optional fields always pass, regardless of the value's kind.
    fn validate(&self, value: &Bson) -> bool {
        !self.options().is_required() || self.accepts(value)
    }

    /// Normalizes a value into the field's canonical representation.
    ///
    /// Numeric conversions are lossless only; anything else is returned
    /// unchanged. Saving never applies this, so callers coerce explicitly.
    fn ensure_value(&self, value: Bson) -> Bson {
        value
    }
}

/// Fluent setters for [`FieldOptions`], implemented by every field type.
pub trait FieldBuilder: Sized {
    /// Mutable access to the field's options.
    fn options_mut(&mut self) -> &mut FieldOptions;

    /// Marks the field as required.
    fn required(mut self) -> Self {
        self.options_mut().required = Some(true);
        self
    }

    /// Marks the field as explicitly optional.
    fn optional(mut self) -> Self {
        self.options_mut().required = Some(false);
        self
    }

    /// Attaches an index hint.
    fn index(mut self, kind: IndexKind) -> Self {
        self.options_mut().index = Some(kind);
        self
    }

    /// Sets a constant default.
    fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.options_mut().default = DefaultValue::Constant(value.into());
        self
    }

    /// Sets a producer invoked whenever a default is needed.
    fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.options_mut().default = DefaultValue::Producer(Arc::new(producer));
        self
    }
}

macro_rules! simple_field {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            options: FieldOptions,
        }

        impl $name {
            /// Creates an optional field with no index and no default.
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl FieldBuilder for $name {
            fn options_mut(&mut self) -> &mut FieldOptions {
                &mut self.options
            }
        }
    };
}

simple_field!(
    /// Text field accepting strings and byte sequences.
    StringField
);
simple_field!(
    /// Integer field accepting 32 and 64 bit integers.
    IntegerField
);
simple_field!(
    /// Floating point field.
    FloatField
);
simple_field!(
    /// Numeric field accepting integers and floats.
    NumericField
);
simple_field!(
    /// Date-time field.
    DateTimeField
);
simple_field!(
    /// Untyped field. Every value validates.
    ComplexField
);

impl FieldSpec for StringField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::String, ValueKind::Binary]
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        match value {
            Bson::Int32(v) => Bson::String(v.to_string()),
            Bson::Int64(v) => Bson::String(v.to_string()),
            Bson::Double(v) => Bson::String(v.to_string()),
            Bson::Boolean(v) => Bson::String(v.to_string()),
            other => other,
        }
    }
}

impl FieldSpec for IntegerField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::Int32, ValueKind::Int64]
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        match value {
            Bson::Double(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Bson::Int64(v as i64)
            }
            Bson::String(s) => match s.trim().parse::<i64>() {
                Ok(v) => Bson::Int64(v),
                Err(_) => Bson::String(s),
            },
            other => other,
        }
    }
}

/// Largest magnitude an `f64` holds exactly for every integer below it.
const MAX_EXACT_DOUBLE_INT: u64 = 1 << 53;

impl FieldSpec for FloatField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::Double]
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        match value {
            Bson::Int32(v) => Bson::Double(v as f64),
            Bson::Int64(v) if v.unsigned_abs() <= MAX_EXACT_DOUBLE_INT => Bson::Double(v as f64),
            Bson::String(s) => match s.trim().parse::<f64>() {
                Ok(v) => Bson::Double(v),
                Err(_) => Bson::String(s),
            },
            other => other,
        }
    }
}

impl FieldSpec for NumericField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::Int32, ValueKind::Int64, ValueKind::Double]
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        match value {
            Bson::String(s) => {
                let trimmed = s.trim();
                if let Ok(v) = trimmed.parse::<i64>() {
                    Bson::Int64(v)
                } else if let Ok(v) = trimmed.parse::<f64>() {
                    Bson::Double(v)
                } else {
                    Bson::String(s)
                }
            }
            other => other,
        }
    }
}

impl FieldSpec for DateTimeField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::DateTime]
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        match value {
            Bson::String(s) => match chrono::DateTime::parse_from_rfc3339(&s) {
                Ok(parsed) => Bson::DateTime(DateTime::from_chrono(parsed.with_timezone(&Utc))),
                Err(_) => Bson::String(s),
            },
            Bson::Int64(millis) => Bson::DateTime(DateTime::from_millis(millis)),
            other => other,
        }
    }
}

impl FieldSpec for ComplexField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        ValueKind::ALL.to_vec()
    }

    fn accepts(&self, _value: &Bson) -> bool {
        true
    }

    fn validate(&self, _value: &Bson) -> bool {
        true
    }
}

/// Ordered sequence field with positional sub-specs.
///
/// Elements are checked by zipping the sub-specs against the sequence, so a
/// sequence longer than the sub-spec list leaves its excess elements unchecked.
#[derive(Debug, Clone, Default)]
pub struct SequenceField {
    options: FieldOptions,
    items: Vec<Arc<dyn FieldSpec>>,
}

impl SequenceField {
    /// Creates a sequence field with no positional sub-specs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequence field checking its leading elements against `items`.
    pub fn of(items: Vec<Arc<dyn FieldSpec>>) -> Self {
        Self { options: FieldOptions::default(), items }
    }

    /// Appends a positional sub-spec.
    pub fn item(mut self, spec: impl FieldSpec + 'static) -> Self {
        self.items.push(Arc::new(spec));
        self
    }

    /// The positional sub-specs.
    pub fn items(&self) -> &[Arc<dyn FieldSpec>] {
        &self.items
    }
}

impl FieldBuilder for SequenceField {
    fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }
}

impl FieldSpec for SequenceField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::Array]
    }

    fn validate(&self, value: &Bson) -> bool {
        if !self.options.is_required() {
            return true;
        }

        match value {
            Bson::Array(elements) => self
                .items
                .iter()
                .zip(elements)
                .all(|(spec, element)| spec.validate(element)),
            _ => false,
        }
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        let elements = match value {
            Bson::Array(elements) => elements,
            Bson::Document(doc) => doc.into_iter().map(|(_, v)| v).collect(),
            Bson::Null => Vec::new(),
            other => vec![other],
        };

        Bson::Array(
            elements
                .into_iter()
                .enumerate()
                .map(|(position, element)| match self.items.get(position) {
                    Some(spec) => spec.ensure_value(element),
                    None => element,
                })
                .collect(),
        )
    }
}

/// Field restricted to a finite set of values.
#[derive(Debug, Clone, Default)]
pub struct EnumField {
    options: FieldOptions,
    members: Vec<Bson>,
}

impl EnumField {
    /// Creates an enum field accepting the given members.
    pub fn new<I, V>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Self {
            options: FieldOptions::default(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    /// The allowed values.
    pub fn members(&self) -> &[Bson] {
        &self.members
    }
}

impl FieldBuilder for EnumField {
    fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }
}

impl FieldSpec for EnumField {
    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        let mut kinds = self.members.iter().map(ValueKind::of).collect::<Vec<_>>();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    fn accepts(&self, value: &Bson) -> bool {
        self.members.contains(value)
    }
}

/// Boolean field, an [`EnumField`] over `{true, false}`.
#[derive(Debug, Clone)]
pub struct BoolField {
    inner: EnumField,
}

impl BoolField {
    /// Creates an optional boolean field with no index and no default.
    pub fn new() -> Self {
        Self { inner: EnumField::new([true, false]) }
    }
}

impl Default for BoolField {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldBuilder for BoolField {
    fn options_mut(&mut self) -> &mut FieldOptions {
        self.inner.options_mut()
    }
}

impl FieldSpec for BoolField {
    fn options(&self) -> &FieldOptions {
        self.inner.options()
    }

    fn accepted_kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::Boolean]
    }

    fn accepts(&self, value: &Bson) -> bool {
        self.inner.accepts(value)
    }

    fn ensure_value(&self, value: Bson) -> Bson {
        Bson::Boolean(truthy(&value))
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(v) => *v,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::String(v) => !v.is_empty(),
        Bson::Array(v) => !v.is_empty(),
        Bson::Document(v) => !v.is_empty(),
        Bson::Binary(v) => !v.bytes.is_empty(),
        _ => true,
    }
}
