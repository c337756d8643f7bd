use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ColonyError, Result};

/// Well-known metadata keys.
pub mod keys {
    pub const UUID: &str = "UUID";
    pub const IMAGE_NAME: &str = "ImageName";
    pub const PARENT_IMAGE_NAME: &str = "ParentImageName";
    pub const IMAGE_FORMAT: &str = "ImageFormat";
    pub const IMAGE_TYPE: &str = "ImageType";
    pub const BIT_DEPTH: &str = "BitDepth";
    pub const GRID_ROW_NUM: &str = "Grid_RowNum";
    pub const GRID_COL_NUM: &str = "Grid_ColNum";
}

/// A typed metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Three-tier key-value store attached to every image.
///
/// Tiers, in lookup order:
/// - private: the immutable unique id, set at construction;
/// - protected: system-managed fields (name, parent name, format, bit
///   depth, image type) written only through crate-internal paths;
/// - public: free for user code and operations.
///
/// Writes through [`MetadataStore::set`] land in the public tier; a key that
/// shadows a private or protected name is rejected so operations cannot
/// silently override system fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataStore {
    private: BTreeMap<String, MetaValue>,
    protected: BTreeMap<String, MetaValue>,
    public: BTreeMap<String, MetaValue>,
}

impl MetadataStore {
    pub fn new(name: Option<&str>) -> Self {
        let mut private = BTreeMap::new();
        private.insert(
            keys::UUID.to_string(),
            MetaValue::Str(Uuid::new_v4().to_string()),
        );

        let mut protected = BTreeMap::new();
        protected.insert(
            keys::IMAGE_NAME.to_string(),
            MetaValue::Str(name.unwrap_or("").to_string()),
        );
        protected.insert(keys::PARENT_IMAGE_NAME.to_string(), MetaValue::Str(String::new()));
        protected.insert(keys::IMAGE_TYPE.to_string(), MetaValue::Str("Base".to_string()));

        Self {
            private,
            protected,
            public: BTreeMap::new(),
        }
    }

    /// Look a key up across tiers: private, then protected, then public.
    pub fn get(&self, key: &str) -> Result<&MetaValue> {
        self.try_get(key)
            .ok_or_else(|| ColonyError::MetadataKey(key.to_string()))
    }

    pub fn try_get(&self, key: &str) -> Option<&MetaValue> {
        self.private
            .get(key)
            .or_else(|| self.protected.get(key))
            .or_else(|| self.public.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.try_get(key).is_some()
    }

    /// Write a public entry. Private and protected keys are not writable.
    pub fn set(&mut self, key: &str, value: impl Into<MetaValue>) -> Result<()> {
        if self.private.contains_key(key) || self.protected.contains_key(key) {
            return Err(ColonyError::MetadataAccess(key.to_string()));
        }
        self.public.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.private.contains_key(key) || self.protected.contains_key(key) {
            return Err(ColonyError::MetadataAccess(key.to_string()));
        }
        self.public
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ColonyError::MetadataKey(key.to_string()))
    }

    pub(crate) fn set_protected(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.protected.insert(key.to_string(), value.into());
    }

    pub fn name(&self) -> String {
        match self.try_get(keys::IMAGE_NAME) {
            Some(MetaValue::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.set_protected(keys::IMAGE_NAME, name);
    }

    pub fn uuid(&self) -> &str {
        match self.private.get(keys::UUID) {
            Some(MetaValue::Str(s)) => s.as_str(),
            _ => "",
        }
    }

    /// Copy protected and public tiers from another store. The private tier
    /// (the unique id) stays this image's own.
    pub(crate) fn copy_from(&mut self, other: &MetadataStore) {
        self.protected = other.protected.clone();
        self.public = other.public.clone();
    }

    /// Protected and public entries in deterministic order, used for
    /// persistence and for prepending metadata columns onto tables.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.protected
            .iter()
            .chain(self.public.iter())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn tier_entries(
        &self,
    ) -> (
        &BTreeMap<String, MetaValue>,
        &BTreeMap<String, MetaValue>,
        &BTreeMap<String, MetaValue>,
    ) {
        (&self.private, &self.protected, &self.public)
    }

    pub(crate) fn from_tiers(
        private: BTreeMap<String, MetaValue>,
        protected: BTreeMap<String, MetaValue>,
        public: BTreeMap<String, MetaValue>,
    ) -> Self {
        Self {
            private,
            protected,
            public,
        }
    }
}
