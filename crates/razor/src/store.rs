//! Named-array storage for persisted library tables.
//!
//! The container format is opaque to the rest of the crate: tables are
//! written as a handful of flat, typed arrays addressed by name, and read back
//! the same way.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum Array {
    Str(Vec<String>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    I8(Vec<i8>),
}

impl Array {
    pub fn type_name(&self) -> &'static str {
        match self {
            Array::Str(_) => "str",
            Array::U32(_) => "u32",
            Array::U64(_) => "u64",
            Array::F32(_) => "f32",
            Array::I8(_) => "i8",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Array::Str(v) => v.len(),
            Array::U32(v) => v.len(),
            Array::U64(v) => v.len(),
            Array::F32(v) => v.len(),
            Array::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! array_conversion {
    ($variant:ident, $ty:ty, $name:literal) => {
        impl From<Vec<$ty>> for Array {
            fn from(values: Vec<$ty>) -> Self {
                Array::$variant(values)
            }
        }

        impl<'a> TryFrom<&'a Array> for &'a [$ty] {
            type Error = Error;

            fn try_from(array: &'a Array) -> Result<Self, Self::Error> {
                match array {
                    Array::$variant(values) => Ok(values.as_slice()),
                    other => Err(Error::ArrayType {
                        expected: $name,
                        found: other.type_name(),
                    }),
                }
            }
        }
    };
}

array_conversion!(Str, String, "str");
array_conversion!(U32, u32, "u32");
array_conversion!(U64, u64, "u64");
array_conversion!(F32, f32, "f32");
array_conversion!(I8, i8, "i8");

/// Put and get typed arrays by name
pub trait ArrayStore {
    fn put(&mut self, name: &str, array: Array);

    fn get(&self, name: &str) -> Result<&Array, Error>;

    /// Fetch an array and check its element type
    fn get_as<'a, T>(&'a self, name: &str) -> Result<&'a [T], Error>
    where
        &'a [T]: TryFrom<&'a Array, Error = Error>,
    {
        self.get(name)?.try_into()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    arrays: BTreeMap<String, Array>,
}

impl MemoryStore {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }
}

impl ArrayStore for MemoryStore {
    fn put(&mut self, name: &str, array: Array) {
        self.arrays.insert(name.to_string(), array);
    }

    fn get(&self, name: &str) -> Result<&Array, Error> {
        self.arrays
            .get(name)
            .ok_or_else(|| Error::MissingArray(name.into()))
    }
}

/// File-backed store: arrays are held in memory and written out as a single
/// JSON document on [`JsonStore::flush`]
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Create a new, empty store that will be written to `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        JsonStore {
            path: path.as_ref().to_path_buf(),
            inner: MemoryStore::default(),
        }
    }

    /// Read an existing store from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let inner = crate::read_json(&path)?;
        Ok(JsonStore {
            path: path.as_ref().to_path_buf(),
            inner,
        })
    }

    pub fn flush(&self) -> Result<(), Error> {
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), &self.inner)?;
        log::trace!("wrote {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArrayStore for JsonStore {
    fn put(&mut self, name: &str, array: Array) {
        self.inner.put(name, array)
    }

    fn get(&self, name: &str) -> Result<&Array, Error> {
        self.inner.get(name)
    }
}
