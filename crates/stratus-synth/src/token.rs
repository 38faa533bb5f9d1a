//! Property values, including deferred ones.
//!
//! A [`Value`] is either a JSON-like literal or a reference whose concrete
//! form is only known at synthesis time: a resource reference, a resource
//! attribute, a join over other values, or a [`Lazy`] producer evaluated
//! against the finished tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::tree::{ConstructTree, NodeId};

/// Producer signature of a [`Lazy`] value.
pub type LazyFn = dyn Fn(&ConstructTree) -> Value + Send + Sync;

/// A value computed from the tree when it is resolved.
#[derive(Clone)]
pub struct Lazy(Arc<LazyFn>);

impl Lazy {
    /// Wraps a producer closure.
    pub fn new(producer: impl Fn(&ConstructTree) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(producer))
    }

    /// Runs the producer against `tree`.
    #[must_use]
    pub fn produce(&self, tree: &ConstructTree) -> Value {
        (self.0)(tree)
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lazy(..)")
    }
}

/// A property value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent. Omitted from rendered maps and lists.
    #[default]
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(serde_json::Number),
    /// String literal, possibly containing token markers.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Reference to a resource's primary identifier.
    Ref(NodeId),
    /// Named attribute of a resource.
    GetAtt(NodeId, String),
    /// Concatenation of the parts with a separator.
    Join(String, Vec<Value>),
    /// Value produced at resolution time.
    Lazy(Lazy),
}

impl Value {
    /// Builds a map value from key/value pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a list value.
    pub fn list<T: Into<Self>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds an attribute reference.
    pub fn get_att(node: NodeId, attribute: impl Into<String>) -> Self {
        Self::GetAtt(node, attribute.into())
    }

    /// Builds a join over `parts`.
    pub fn join(separator: impl Into<String>, parts: Vec<Self>) -> Self {
        Self::Join(separator.into(), parts)
    }

    /// Builds a lazily produced value.
    pub fn lazy(producer: impl Fn(&ConstructTree) -> Self + Send + Sync + 'static) -> Self {
        Self::Lazy(Lazy::new(producer))
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string literal, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric literal as `u64`, if this is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up `key` in a map value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the entries of a map value for mutation.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the items of a list value for mutation.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Number(serde_json::Number::from(value))
                }
            }
        )*
    };
}

impl_from_number!(u8, u16, u32, u64, usize, i32, i64);

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
