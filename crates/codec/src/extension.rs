//! Type extensions: per-type overrides of structural encoding
//!
//! A codec owns an [`ExtensionRegistry`] built before first use. While the
//! codec encodes or decodes, its registry is installed for the current
//! thread. Types that route their serde impls through [`serialize`] and
//! [`deserialize`] (see [`Extensible`]) look themselves up there: with an
//! extension registered they travel as a single [`WireValue`], otherwise they
//! fall back to their structural form.

use crate::error::ExtensionError;
use crate::timestamp::TimestampExtension;
use serde::de::{self, DeserializeSeed, Deserializer, Unexpected, Visitor};
use serde::{ser, Serialize, Serializer};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Shape of a wire value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireKind {
    Int,
    UInt,
    Float,
    Bool,
    Str,
    Bytes,
}

impl fmt::Display for WireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireKind::Int => "signed integer",
            WireKind::UInt => "unsigned integer",
            WireKind::Float => "float",
            WireKind::Bool => "bool",
            WireKind::Str => "string",
            WireKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Primitive value an extension converts its type to
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl WireValue {
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::Int(_) => WireKind::Int,
            WireValue::UInt(_) => WireKind::UInt,
            WireValue::Float(_) => WireKind::Float,
            WireValue::Bool(_) => WireKind::Bool,
            WireValue::Str(_) => WireKind::Str,
            WireValue::Bytes(_) => WireKind::Bytes,
        }
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireValue::Int(v) => serializer.serialize_i64(*v),
            WireValue::UInt(v) => serializer.serialize_u64(*v),
            WireValue::Float(v) => serializer.serialize_f64(*v),
            WireValue::Bool(v) => serializer.serialize_bool(*v),
            WireValue::Str(v) => serializer.serialize_str(v),
            WireValue::Bytes(v) => serializer.serialize_bytes(v),
        }
    }
}

/// Reads a wire value of a known kind
///
/// The kind picks the `deserialize_*` hint, so positional formats that
/// cannot describe themselves still decode extension values.
#[derive(Debug, Clone, Copy)]
struct WireSeed(WireKind);

impl<'de> DeserializeSeed<'de> for WireSeed {
    type Value = WireValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        let visitor = WireVisitor(self.0);
        match self.0 {
            WireKind::Int => deserializer.deserialize_i64(visitor),
            WireKind::UInt => deserializer.deserialize_u64(visitor),
            WireKind::Float => deserializer.deserialize_f64(visitor),
            WireKind::Bool => deserializer.deserialize_bool(visitor),
            WireKind::Str => deserializer.deserialize_string(visitor),
            WireKind::Bytes => deserializer.deserialize_byte_buf(visitor),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WireVisitor(WireKind);

impl<'de> Visitor<'de> for WireVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {} wire value", self.0)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        match self.0 {
            WireKind::Bool => Ok(WireValue::Bool(v)),
            _ => Err(E::invalid_type(Unexpected::Bool(v), &self)),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        match self.0 {
            WireKind::Int => Ok(WireValue::Int(v)),
            WireKind::UInt => u64::try_from(v)
                .map(WireValue::UInt)
                .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self)),
            _ => Err(E::invalid_type(Unexpected::Signed(v), &self)),
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        match self.0 {
            WireKind::UInt => Ok(WireValue::UInt(v)),
            WireKind::Int => i64::try_from(v)
                .map(WireValue::Int)
                .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self)),
            _ => Err(E::invalid_type(Unexpected::Unsigned(v), &self)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        match self.0 {
            WireKind::Float => Ok(WireValue::Float(v)),
            _ => Err(E::invalid_type(Unexpected::Float(v), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        self.visit_string(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        match self.0 {
            WireKind::Str => Ok(WireValue::Str(v)),
            _ => Err(E::invalid_type(Unexpected::Str(&v), &self)),
        }
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<WireValue, E> {
        self.visit_byte_buf(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<WireValue, E> {
        match self.0 {
            WireKind::Bytes => Ok(WireValue::Bytes(v)),
            _ => Err(E::invalid_type(Unexpected::Bytes(&v), &self)),
        }
    }

    // Some formats hand byte strings over as sequences of u8
    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        if self.0 != WireKind::Bytes {
            return Err(de::Error::invalid_type(Unexpected::Seq, &self));
        }
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(WireValue::Bytes(bytes))
    }
}

/// Custom wire conversion for one type
///
/// Only [`Extensible`] types consult the registry, so only they can be
/// targets.
pub trait Extension: Send + Sync + 'static {
    /// The type this extension encodes
    type Target: Extensible;

    /// Wire shape produced by [`Extension::to_wire`]
    fn wire_kind(&self) -> WireKind;

    fn to_wire(&self, value: &Self::Target) -> Result<WireValue, ExtensionError>;

    fn from_wire(&self, wire: WireValue) -> Result<Self::Target, ExtensionError>;
}

/// Extension built from a pair of closures
struct FnExtension<T, F, G> {
    kind: WireKind,
    to_wire: F,
    from_wire: G,
    _target: PhantomData<fn() -> T>,
}

impl<T, F, G> Extension for FnExtension<T, F, G>
where
    T: Extensible,
    F: Fn(&T) -> Result<WireValue, ExtensionError> + Send + Sync + 'static,
    G: Fn(WireValue) -> Result<T, ExtensionError> + Send + Sync + 'static,
{
    type Target = T;

    fn wire_kind(&self) -> WireKind {
        self.kind
    }

    fn to_wire(&self, value: &T) -> Result<WireValue, ExtensionError> {
        (self.to_wire)(value)
    }

    fn from_wire(&self, wire: WireValue) -> Result<T, ExtensionError> {
        (self.from_wire)(wire)
    }
}

/// Object-safe view of an [`Extension`]
trait ErasedExtension: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn wire_kind(&self) -> WireKind;
    fn to_wire_any(&self, value: &dyn Any) -> Result<WireValue, ExtensionError>;
    fn from_wire_any(&self, wire: WireValue) -> Result<Box<dyn Any>, ExtensionError>;
}

impl<E: Extension> ErasedExtension for E {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<E::Target>()
    }

    fn wire_kind(&self) -> WireKind {
        Extension::wire_kind(self)
    }

    fn to_wire_any(&self, value: &dyn Any) -> Result<WireValue, ExtensionError> {
        let value = value
            .downcast_ref::<E::Target>()
            .ok_or(ExtensionError::TypeMismatch {
                expected: std::any::type_name::<E::Target>(),
            })?;
        Extension::to_wire(self, value)
    }

    fn from_wire_any(&self, wire: WireValue) -> Result<Box<dyn Any>, ExtensionError> {
        let expected = Extension::wire_kind(self);
        if wire.kind() != expected {
            return Err(ExtensionError::UnexpectedWire {
                expected,
                actual: wire.kind(),
            });
        }
        Extension::from_wire(self, wire).map(|value| Box::new(value) as Box<dyn Any>)
    }
}

/// Lookup table from type to extension
///
/// Populated before the owning codec is built and read-only afterwards.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    entries: HashMap<TypeId, Arc<dyn ErasedExtension>>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extensions ([`TimestampExtension`])
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TimestampExtension);
        registry
    }

    /// Register an extension, replacing any earlier one for the same type
    pub fn register<E: Extension>(&mut self, extension: E) -> &mut Self {
        let type_name = std::any::type_name::<E::Target>();
        let previous = self
            .entries
            .insert(TypeId::of::<E::Target>(), Arc::new(extension));
        if previous.is_some() {
            debug!(type_name, "replaced type extension");
        } else {
            debug!(type_name, "registered type extension");
        }
        self
    }

    /// Register a conversion pair for `T`
    ///
    /// `T` must be [`Extensible`]; types with plain serde impls never look
    /// the registry up and are rejected at compile time:
    ///
    /// ```compile_fail
    /// use codec::{ExtensionRegistry, WireKind, WireValue};
    ///
    /// let mut registry = ExtensionRegistry::new();
    /// registry.register_fn::<u32, _, _>(
    ///     WireKind::Str,
    ///     |v| Ok(WireValue::Str(format!("n{}", v))),
    ///     |_| Ok(0),
    /// );
    /// ```
    pub fn register_fn<T, F, G>(&mut self, kind: WireKind, to_wire: F, from_wire: G) -> &mut Self
    where
        T: Extensible,
        F: Fn(&T) -> Result<WireValue, ExtensionError> + Send + Sync + 'static,
        G: Fn(WireValue) -> Result<T, ExtensionError> + Send + Sync + 'static,
    {
        self.register(FnExtension {
            kind,
            to_wire,
            from_wire,
            _target: PhantomData,
        })
    }

    /// Builder form of [`ExtensionRegistry::register`]
    pub fn with<E: Extension>(mut self, extension: E) -> Self {
        self.register(extension);
        self
    }

    /// Check whether `T` has an extension
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, id: TypeId) -> Option<Arc<dyn ErasedExtension>> {
        self.entries.get(&id).cloned()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|ext| ext.type_name()).collect();
        names.sort_unstable();
        f.debug_struct("ExtensionRegistry")
            .field("types", &names)
            .finish()
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<Arc<ExtensionRegistry>>> = const { RefCell::new(None) };
}

/// Registry installed for the current thread; restores the previous one on drop
pub(crate) struct Scope {
    previous: Option<Arc<ExtensionRegistry>>,
}

/// Install `registry` for the duration of one encode or decode call
pub(crate) fn enter(registry: &Arc<ExtensionRegistry>) -> Scope {
    let previous = ACTIVE.with(|active| active.replace(Some(Arc::clone(registry))));
    Scope { previous }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = ACTIVE.try_with(|active| *active.borrow_mut() = previous);
    }
}

fn active_extension(id: TypeId) -> Option<Arc<dyn ErasedExtension>> {
    ACTIVE.with(|active| active.borrow().as_ref().and_then(|registry| registry.lookup(id)))
}

/// A type whose encoding can be overridden by a registered extension
///
/// Implementors provide their structural form and route their serde impls
/// through [`serialize`] and [`deserialize`]:
///
/// ```
/// use codec::extension::{self, Extensible};
/// use serde::{Deserialize, Deserializer, Serialize, Serializer};
///
/// struct Meters(f64);
///
/// impl Extensible for Meters {
///     fn serialize_structural<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
///         s.serialize_f64(self.0)
///     }
///
///     fn deserialize_structural<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
///         f64::deserialize(d).map(Meters)
///     }
/// }
///
/// impl Serialize for Meters {
///     fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
///         extension::serialize(self, s)
///     }
/// }
///
/// impl<'de> Deserialize<'de> for Meters {
///     fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
///         extension::deserialize(d)
///     }
/// }
/// ```
pub trait Extensible: Sized + 'static {
    fn serialize_structural<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;

    fn deserialize_structural<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>;
}

/// Serialize through the active extension for `T`, or structurally
pub fn serialize<T: Extensible, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    match active_extension(TypeId::of::<T>()) {
        Some(extension) => {
            let wire = extension
                .to_wire_any(value as &dyn Any)
                .map_err(ser::Error::custom)?;
            wire.serialize(serializer)
        }
        None => value.serialize_structural(serializer),
    }
}

/// Deserialize through the active extension for `T`, or structurally
pub fn deserialize<'de, T: Extensible, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
    match active_extension(TypeId::of::<T>()) {
        Some(extension) => {
            let wire = WireSeed(extension.wire_kind()).deserialize(deserializer)?;
            let value = extension.from_wire_any(wire).map_err(de::Error::custom)?;
            value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
                de::Error::custom(ExtensionError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                })
            })
        }
        None => T::deserialize_structural(deserializer),
    }
}
