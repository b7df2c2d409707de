// SPDX-License-Identifier: Apache-2.0

//! Remote catalog queries and row decoding for schema reflection.

use fdw_core::{FdwError, FdwResult, FieldMetadata, RemoteValue};
use serde::{Deserialize, Serialize};

/// User tables, excluding views and system relations.
pub const RELATIONS_QUERY: &str = "SELECT TRIM(rdb$relation_name)
  FROM rdb$relations
 WHERE rdb$view_blr IS NULL
   AND COALESCE(rdb$system_flag, 0) = 0
 ORDER BY 1";

/// Columns of one relation (bound parameter: relation name), in position order.
pub const COLUMNS_QUERY: &str = "SELECT TRIM(rf.rdb$field_name),
       f.rdb$field_type,
       f.rdb$field_sub_type,
       f.rdb$character_length,
       f.rdb$field_precision,
       f.rdb$field_scale,
       f.rdb$dimensions,
       CAST(COALESCE(rf.rdb$default_source, f.rdb$default_source) AS VARCHAR(8191)),
       COALESCE(rf.rdb$null_flag, f.rdb$null_flag, 0),
       TRIM(cs.rdb$character_set_name),
       CASE WHEN f.rdb$computed_blr IS NULL THEN 0 ELSE 1 END
  FROM rdb$relation_fields rf
  JOIN rdb$fields f
    ON f.rdb$field_name = rf.rdb$field_source
  LEFT JOIN rdb$character_sets cs
    ON cs.rdb$character_set_id = f.rdb$character_set_id
 WHERE TRIM(rf.rdb$relation_name) = ?
 ORDER BY rf.rdb$field_position";

/// Number of foreign keys in other relations referencing the bound relation.
pub const FK_DEPENDENTS_QUERY: &str = "SELECT COUNT(*)
  FROM rdb$relation_constraints fk
  JOIN rdb$ref_constraints ref
    ON ref.rdb$constraint_name = fk.rdb$constraint_name
  JOIN rdb$relation_constraints pk
    ON pk.rdb$constraint_name = ref.rdb$const_name_uq
 WHERE fk.rdb$constraint_type = 'FOREIGN KEY'
   AND TRIM(pk.rdb$relation_name) = ?
   AND TRIM(fk.rdb$relation_name) <> TRIM(pk.rdb$relation_name)";

/// One decoded row of [`COLUMNS_QUERY`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    pub metadata: FieldMetadata,
    /// Raw default clause, e.g. `DEFAULT 0`.
    pub default_source: Option<String>,
    pub not_null: bool,
    pub charset: Option<String>,
    pub computed: bool,
}

fn text(value: &RemoteValue, what: &str) -> FdwResult<Option<String>> {
    match value {
        RemoteValue::Null => Ok(None),
        RemoteValue::Text(s) => Ok(Some(s.trim_end().to_string())),
        // Catalog text is ASCII in practice; metadata never needs the
        // unmapped-charset policy.
        RemoteValue::UntaggedText(bytes) => Ok(Some(
            String::from_utf8_lossy(bytes).trim_end().to_string(),
        )),
        other => Err(FdwError::conversion(format!(
            "catalog {what}: expected text, got {}",
            other.kind()
        ))),
    }
}

fn int(value: &RemoteValue, what: &str) -> FdwResult<Option<i64>> {
    match value {
        RemoteValue::Null => Ok(None),
        RemoteValue::Integer(i) => Ok(Some(*i)),
        RemoteValue::Int128(i) => i64::try_from(*i)
            .map(Some)
            .map_err(|_| FdwError::conversion(format!("catalog {what} out of range"))),
        other => Err(FdwError::conversion(format!(
            "catalog {what}: expected integer, got {}",
            other.kind()
        ))),
    }
}

fn small(value: &RemoteValue, what: &str) -> FdwResult<Option<i16>> {
    int(value, what)?
        .map(|i| i16::try_from(i).map_err(|_| FdwError::conversion(format!("catalog {what} out of range"))))
        .transpose()
}

impl CatalogColumn {
    pub fn from_row(row: &[RemoteValue]) -> FdwResult<Self> {
        if row.len() < 11 {
            return Err(FdwError::internal(format!(
                "column catalog row has {} fields, expected 11",
                row.len()
            )));
        }
        let name = text(&row[0], "field name")?
            .ok_or_else(|| FdwError::conversion("catalog field name is NULL"))?;
        let field_type = small(&row[1], "field type")?
            .ok_or_else(|| FdwError::conversion(format!("no field type for column \"{name}\"")))?;
        let char_length = int(&row[3], "character length")?
            .map(|l| u32::try_from(l).map_err(|_| FdwError::conversion("catalog character length out of range")))
            .transpose()?;

        Ok(Self {
            metadata: FieldMetadata {
                field_type,
                sub_type: small(&row[2], "sub type")?,
                char_length,
                precision: small(&row[4], "precision")?,
                scale: small(&row[5], "scale")?,
                dimensions: small(&row[6], "dimensions")?,
            },
            default_source: text(&row[7], "default source")?,
            not_null: int(&row[8], "null flag")?.unwrap_or(0) != 0,
            charset: text(&row[9], "character set")?,
            computed: int(&row[10], "computed flag")?.unwrap_or(0) != 0,
            name,
        })
    }

    /// Default expression with the leading `DEFAULT` keyword removed.
    pub fn default_expression(&self) -> Option<&str> {
        let source = self.default_source.as_deref()?.trim();
        let expr = match source.get(..7) {
            Some(head) if head.eq_ignore_ascii_case("default") => source[7..].trim_start(),
            _ => source,
        };
        (!expr.is_empty()).then_some(expr)
    }
}

/// Relation names from a [`RELATIONS_QUERY`] result.
pub fn relation_names(rows: &[Vec<RemoteValue>]) -> FdwResult<Vec<String>> {
    rows.iter()
        .filter_map(|row| row.first())
        .map(|v| text(v, "relation name"))
        .filter_map(|r| r.transpose())
        .collect()
}
