//! Types of the remote metadata authority.
//!
//! These are the values that travel across the [`CypressClient`](crate::services::CypressClient)
//! boundary. Object ids are rendered as four lowercase hex parts joined by `-`, which is also how
//! they (de)serialize.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// The durable identity of an object in the metadata authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u32; 4]);

impl ObjectId {
    pub const NULL: Self = Self([0; 4]);

    pub const fn from_parts(parts: [u32; 4]) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> [u32; 4] {
        self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Generates a new random, non-null id.
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random());
            if !id.is_null() {
                return id;
            }
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:x}-{b:x}-{c:x}-{d:x}")
    }
}

/// An error parsing an [`ObjectId`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object id {0:?}")]
pub struct ParseObjectIdError(String);

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseObjectIdError(s.to_owned());

        let mut parts = [0; 4];
        let mut split = s.split('-');
        for part in &mut parts {
            let hex = split.next().ok_or_else(invalid)?;
            // `from_str_radix` accepts a leading sign, which is not part of the format.
            if hex.is_empty() || hex.len() > 8 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *part = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        }
        if split.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(parts))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The kind of object to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    User,
    Group,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Group => "group",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options of a `create-or-get` request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CreateObjectOptions {
    /// When the object already exists, return it instead of failing.
    pub ignore_existing: bool,
    /// Attributes of the new object. The `name` attribute identifies users and groups.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CreateObjectOptions {
    /// The `name` attribute, if it is set to a string.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name")?.as_str()
    }
}
