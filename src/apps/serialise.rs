//! Reversible serialization and compression stages.
//!
//! ```text
//! ToPrimitive + PickleIt + Compress        object -> bytes
//! Decompress + UnpickleIt + FromPrimitive  bytes  -> object
//! ```
//!
//! The primitive form is a `serde_json::Value`. "Pickled" bytes are a
//! bincode encoding of that tree, so anything with a primitive form can be
//! pickled and anything else fails with a [`NotCompleted`].

use crate::apps::composable::{App, impl_add};
use crate::core::not_completed::{AppResult, NotCompleted};
use crate::data::object::{self, DataObject};
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

/// Byte transform used by [`Compress`] and [`Decompress`].
pub type Codec = fn(&[u8]) -> io::Result<Vec<u8>>;

pub fn gzip_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gzip_decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

pub fn zlib_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn zlib_decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Binary image of a primitive tree. bincode cannot encode a
/// `serde_json::Value` directly, so the tree is mirrored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Pickled {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Pickled>),
    Map(Vec<(String, Pickled)>),
}

impl From<Value> for Pickled {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Pickled::Null,
            Value::Bool(b) => Pickled::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Pickled::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Pickled::UInt(u)
                } else {
                    Pickled::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Pickled::Str(s),
            Value::Array(items) => Pickled::List(items.into_iter().map(Pickled::from).collect()),
            Value::Object(map) => {
                Pickled::Map(map.into_iter().map(|(k, v)| (k, Pickled::from(v))).collect())
            }
        }
    }
}

impl From<Pickled> for Value {
    fn from(p: Pickled) -> Self {
        match p {
            Pickled::Null => Value::Null,
            Pickled::Bool(b) => Value::Bool(b),
            Pickled::Int(i) => Value::from(i),
            Pickled::UInt(u) => Value::from(u),
            Pickled::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            Pickled::Str(s) => Value::String(s),
            Pickled::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Pickled::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Decode pickled bytes back into a primitive tree.
pub fn unpickle(data: &[u8]) -> AppResult<Value> {
    bincode::deserialize::<Pickled>(data)
        .map(Value::from)
        .map_err(|e| NotCompleted::error("unpickle_it", e))
}

/// Object to primitive tree.
pub struct ToPrimitive<T> {
    _types: PhantomData<fn(T)>,
}

impl<T> ToPrimitive<T> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<T> Default for ToPrimitive<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + Send> App for ToPrimitive<T> {
    type Input = T;
    type Output = Value;

    fn name(&self) -> &str {
        "to_primitive"
    }

    fn main(&self, input: T) -> AppResult<Value> {
        serde_json::to_value(&input).map_err(|e| NotCompleted::error(self.name(), e))
    }
}

/// Primitive (or serialized) form back to an object, through a pluggable
/// deserializer.
pub struct FromPrimitive<I, O> {
    deserialiser: Arc<dyn Fn(I) -> AppResult<O> + Send + Sync>,
}

impl<I, O> Clone for FromPrimitive<I, O> {
    fn clone(&self) -> Self {
        Self {
            deserialiser: Arc::clone(&self.deserialiser),
        }
    }
}

impl<I, O> fmt::Debug for FromPrimitive<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromPrimitive").finish_non_exhaustive()
    }
}

impl<I, O> FromPrimitive<I, O> {
    pub fn new(deserialiser: impl Fn(I) -> AppResult<O> + Send + Sync + 'static) -> Self {
        Self {
            deserialiser: Arc::new(deserialiser),
        }
    }
}

/// Rich dict to data object.
pub fn from_primitive() -> FromPrimitive<Value, DataObject> {
    FromPrimitive::new(object::deserialise_object)
}

/// JSON text to data object.
pub fn from_json() -> FromPrimitive<String, DataObject> {
    FromPrimitive::new(|raw: String| object::deserialise_json(&raw))
}

/// Pickled bytes straight to data object.
pub fn from_pickle() -> FromPrimitive<Vec<u8>, DataObject> {
    FromPrimitive::new(|data: Vec<u8>| unpickle(&data).and_then(object::deserialise_object))
}

/// Primitive tree to any deserializable type.
pub fn from_primitive_as<T: DeserializeOwned + Send + 'static>() -> FromPrimitive<Value, T> {
    FromPrimitive::new(|value: Value| {
        serde_json::from_value(value).map_err(|e| NotCompleted::error("from_primitive", e))
    })
}

impl<I: Send, O: Send> App for FromPrimitive<I, O> {
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        "from_primitive"
    }

    fn main(&self, input: I) -> AppResult<O> {
        (self.deserialiser)(input)
    }
}

/// Object to pickled bytes.
pub struct PickleIt<T> {
    _types: PhantomData<fn(T)>,
}

impl<T> PickleIt<T> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<T> Default for PickleIt<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + Send> App for PickleIt<T> {
    type Input = T;
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "pickle_it"
    }

    fn main(&self, input: T) -> AppResult<Vec<u8>> {
        let value = serde_json::to_value(&input)
            .map_err(|e| NotCompleted::error(self.name(), format!("unpicklable payload: {}", e)))?;
        bincode::serialize(&Pickled::from(value)).map_err(|e| NotCompleted::error(self.name(), e))
    }
}

/// Pickled bytes to primitive tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpickleIt;

impl App for UnpickleIt {
    type Input = Vec<u8>;
    type Output = Value;

    fn name(&self) -> &str {
        "unpickle_it"
    }

    fn main(&self, input: Vec<u8>) -> AppResult<Value> {
        unpickle(&input)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Compress {
    codec: Codec,
}

impl Compress {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl Default for Compress {
    fn default() -> Self {
        Self::new(gzip_compress)
    }
}

impl App for Compress {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "compress"
    }

    fn main(&self, input: Vec<u8>) -> AppResult<Vec<u8>> {
        (self.codec)(&input).map_err(|e| NotCompleted::error(self.name(), e))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Decompress {
    codec: Codec,
}

impl Decompress {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl Default for Decompress {
    fn default() -> Self {
        Self::new(gzip_decompress)
    }
}

impl App for Decompress {
    type Input = Vec<u8>;
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "decompress"
    }

    fn main(&self, input: Vec<u8>) -> AppResult<Vec<u8>> {
        (self.codec)(&input).map_err(|e| NotCompleted::error(self.name(), e))
    }
}

impl_add!(
    ToPrimitive<T>,
    FromPrimitive<I, O>,
    PickleIt<T>,
    UnpickleIt,
    Compress,
    Decompress,
);
