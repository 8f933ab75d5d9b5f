//! Canonical schema model and the schema unifier.
//!
//! This module owns [`ColumnType`] (the four value shapes the loader knows how
//! to create), [`TypeOverrides`] (the versioned, hand-maintained table of
//! columns whose type must not be left to inference) and [`CanonicalSchema`]
//! (the union of every scanned header plus the per-column types every
//! normalized file must carry).
//!
//! ## Lifecycle
//!
//! 1. [`unify`] folds the scanned headers into a column set. Pure computation.
//! 2. [`CanonicalSchema::resolve_types`] applies the overrides and the corpus
//!    profile, including the nullable-integer coercion.
//! 3. The resolved schema is shared read-only by every normalizer task and
//!    saved next to the normalized files as the loader's manifest.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    header::FileHeader,
    io_utils,
    profile::{ColumnProfile, CorpusProfile},
};

/// File name of the manifest written beside the normalized files.
pub const MANIFEST_FILE_NAME: &str = "_canonical_schema.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Integer,
    Decimal,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        }
    }

    /// Column type used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Decimal => "DOUBLE PRECISION",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }

    /// Reverse of [`ColumnType::sql_type`], also accepting the spelling the
    /// catalog reports. `None` for types the loader never creates.
    pub fn from_sql_type(sql_type: &str) -> Option<Self> {
        match sql_type.trim().to_ascii_lowercase().as_str() {
            "bigint" => Some(ColumnType::Integer),
            "double precision" => Some(ColumnType::Decimal),
            "timestamp" | "timestamp without time zone" => Some(ColumnType::Timestamp),
            "text" => Some(ColumnType::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" => Ok(ColumnType::Integer),
            "decimal" | "float" | "double" | "numeric" => Ok(ColumnType::Decimal),
            "timestamp" | "datetime" => Ok(ColumnType::Timestamp),
            "text" | "string" => Ok(ColumnType::Text),
            other => Err(anyhow!(
                "Unknown column type '{other}' (expected integer, decimal, timestamp or text)"
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ColumnType::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Explicit types for columns that some file generations do not carry.
///
/// Kept as a versioned input rather than inferred: a column that is missing
/// from the current corpus would otherwise change type silently between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOverrides {
    pub version: u32,
    #[serde(deserialize_with = "deserialize_override_columns")]
    pub columns: BTreeMap<String, ColumnType>,
}

impl Default for TypeOverrides {
    fn default() -> Self {
        let columns = [
            ("congestion_surcharge", ColumnType::Decimal),
            ("dolocationid", ColumnType::Integer),
            ("dropoff_latitude", ColumnType::Decimal),
            ("dropoff_longitude", ColumnType::Decimal),
            ("improvement_surcharge", ColumnType::Decimal),
            ("pickup_latitude", ColumnType::Decimal),
            ("pickup_longitude", ColumnType::Decimal),
            ("pulocationid", ColumnType::Integer),
        ]
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect();
        Self {
            version: 1,
            columns,
        }
    }
}

impl TypeOverrides {
    pub fn get(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).copied()
    }
}

fn deserialize_override_columns<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ColumnType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, ColumnType>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, ty)| (io_utils::normalize_column_name(&name), ty))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    /// Union of all header columns. Iteration order is the canonical column order.
    pub columns: BTreeSet<String>,
    pub overrides: TypeOverrides,
    /// Resolved per-column types; empty until [`CanonicalSchema::resolve_types`].
    #[serde(default)]
    pub types: BTreeMap<String, ColumnType>,
}

impl CanonicalSchema {
    pub fn ordered_columns(&self) -> Vec<String> {
        self.columns.iter().cloned().collect()
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.types.get(column).copied()
    }

    pub fn is_resolved(&self) -> bool {
        !self.columns.is_empty() && self.columns.iter().all(|c| self.types.contains_key(c))
    }

    /// Fixes the type of every canonical column.
    ///
    /// Overrides win over inference. An integer column that holds a null in
    /// any file, or is absent from any profiled file, becomes decimal so every
    /// normalized file carries the same type for it.
    pub fn resolve_types(&mut self, profile: &CorpusProfile) {
        let mut types = BTreeMap::new();
        for column in &self.columns {
            let column_profile = profile.column(column);
            let inferred = column_profile
                .and_then(ColumnProfile::decide)
                .unwrap_or(ColumnType::Decimal);
            let base = self.overrides.get(column).unwrap_or(inferred);
            let nullable = column_profile.is_none_or(|p| {
                p.nulls > 0 || p.files_present < profile.files_profiled()
            });
            let resolved = if base == ColumnType::Integer && nullable {
                ColumnType::Decimal
            } else {
                base
            };
            types.insert(column.clone(), resolved);
        }
        self.types = types;
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing canonical schema YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let schema: CanonicalSchema = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing canonical schema {path:?}"))?;
        ensure!(
            schema.types.keys().all(|name| schema.columns.contains(name)),
            "Schema file {path:?} types columns that are not part of its column set"
        );
        Ok(schema)
    }
}

/// Folds scanned headers into the canonical column set.
///
/// Order across files does not matter; canonical order is the sorted order
/// of the set.
pub fn unify(headers: &[FileHeader], overrides: &TypeOverrides) -> CanonicalSchema {
    let columns = headers
        .iter()
        .flat_map(|header| header.columns.iter().cloned())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>();
    CanonicalSchema {
        columns,
        overrides: overrides.clone(),
        types: BTreeMap::new(),
    }
}
