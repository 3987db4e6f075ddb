//! Low-level Parquet read/write for collection data: a flat physical
//! layout (system, audit, and soft-delete columns plus one optional typed
//! leaf per shredded field, with a residual JSON column for everything
//! else), driven directly off the `parquet` crate rather than `arrow`.
//!
//! The nested VARIANT column tree in `schema` is the logical, documented
//! shredding layout used for statistics-path naming and the persisted
//! `parquedb.shredding` metadata; this module's physical schema flattens
//! that tree to one column per leaf; see DESIGN.md for the rationale.

use crate::error::{DbError, Result};
use crate::schema::ShreddingPlan;
use crate::variant::{Variant, VariantType};
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::reader::{FileReader, RowGroupReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::Type as SchemaType;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const SHREDDING_METADATA_KEY: &str = "parquedb.shredding";

/// One materialized row: the system/audit columns plus the entity's
/// remaining field map (shredded fields are pulled out of it at write
/// time; everything left over becomes the residual `$data` payload).
#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub type_name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: String,
    pub version: i64,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
    pub fields: Map<String, Value>,
}

fn flat_leaf_name(field: &str) -> String {
    format!("shred_{field}")
}

fn build_flat_schema(plan: &ShreddingPlan) -> SchemaType {
    let mut fields: Vec<Arc<SchemaType>> = vec![
        req_bytes("id", Some(LogicalType::String)),
        req_bytes("type_name", Some(LogicalType::String)),
        req_i64("created_at", true),
        req_i64("updated_at", true),
        req_bytes("created_by", Some(LogicalType::String)),
        req_bytes("updated_by", Some(LogicalType::String)),
        req_i64("version", false),
        opt_i64("deleted_at", true),
        opt_bytes("deleted_by", Some(LogicalType::String)),
        opt_bytes("data_metadata", None),
        opt_bytes("data_value", None),
    ];
    for (field, variant_type) in &plan.fields {
        fields.push(shredded_leaf(&flat_leaf_name(field), *variant_type));
    }
    SchemaType::group_type_builder("collection")
        .with_fields(fields)
        .build()
        .expect("static flat schema always builds")
}

fn shredded_leaf(name: &str, variant_type: VariantType) -> Arc<SchemaType> {
    match variant_type {
        VariantType::Int32 => opt_i32(name),
        VariantType::Int64 => opt_i64(name, false),
        VariantType::Double => opt_f64(name),
        VariantType::Boolean => opt_bool(name),
        VariantType::TimestampMillis => opt_i64(name, true),
        VariantType::Utf8 | VariantType::Json => opt_bytes(name, Some(LogicalType::String)),
    }
}

fn req_bytes(name: &str, logical: Option<LogicalType>) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_repetition(Repetition::REQUIRED)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}

fn opt_bytes(name: &str, logical: Option<LogicalType>) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_repetition(Repetition::OPTIONAL)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}

fn req_i64(name: &str, timestamp: bool) -> Arc<SchemaType> {
    let logical = timestamp.then_some(LogicalType::Timestamp {
        is_adjusted_to_u_t_c: true,
        unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
    });
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::INT64)
            .with_repetition(Repetition::REQUIRED)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}

fn opt_i64(name: &str, timestamp: bool) -> Arc<SchemaType> {
    let logical = timestamp.then_some(LogicalType::Timestamp {
        is_adjusted_to_u_t_c: true,
        unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
    });
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::INT64)
            .with_repetition(Repetition::OPTIONAL)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}

fn opt_i32(name: &str) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::INT32)
            .with_repetition(Repetition::OPTIONAL)
            .build()
            .expect("static primitive always builds"),
    )
}

fn opt_f64(name: &str) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::DOUBLE)
            .with_repetition(Repetition::OPTIONAL)
            .build()
            .expect("static primitive always builds"),
    )
}

fn opt_bool(name: &str) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, PhysicalType::BOOLEAN)
            .with_repetition(Repetition::OPTIONAL)
            .build()
            .expect("static primitive always builds"),
    )
}

/// `{ fields: [...], fieldTypes: { field -> physicalType } }`, persisted as
/// Parquet key-value metadata under `parquedb.shredding`.
pub fn shredding_metadata_json(plan: &ShreddingPlan) -> Value {
    let fields: Vec<Value> = plan.fields.iter().map(|(f, _)| Value::String(f.clone())).collect();
    let mut field_types = Map::new();
    for (field, variant_type) in &plan.fields {
        let physical = match variant_type {
            VariantType::Int32 => "INT32",
            VariantType::Int64 => "INT64",
            VariantType::Double => "DOUBLE",
            VariantType::Boolean => "BOOLEAN",
            VariantType::TimestampMillis => "INT64",
            VariantType::Utf8 | VariantType::Json => "BYTE_ARRAY",
        };
        field_types.insert(field.clone(), Value::String(physical.to_string()));
    }
    Value::Object(Map::from_iter([
        ("fields".to_string(), Value::Array(fields)),
        ("fieldTypes".to_string(), Value::Object(field_types)),
    ]))
}

pub struct ParquetCodec;

impl ParquetCodec {
    /// Encode rows into a Parquet file, one row group, column-by-column.
    /// The root `value` leaf (`data_value`) carries whatever's left of
    /// `fields` after shredded fields are pulled out; it is left null when
    /// every field was shredded.
    pub fn encode(plan: &ShreddingPlan, rows: &[Row]) -> Result<Vec<u8>> {
        let schema = Arc::new(build_flat_schema(plan));
        let props = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .set_statistics_enabled(parquet::file::properties::EnabledStatistics::Chunk)
                .set_key_value_metadata(Some(vec![parquet::format::KeyValue {
                    key: SHREDDING_METADATA_KEY.to_string(),
                    value: Some(shredding_metadata_json(plan).to_string()),
                }]))
                .build(),
        );

        let mut buf = Vec::new();
        let mut writer = SerializedFileWriter::new(&mut buf, schema, props)
            .map_err(|e| DbError::Corruption(format!("parquet writer init: {e}")))?;
        let mut row_group = writer
            .next_row_group()
            .map_err(|e| DbError::Corruption(format!("parquet row group: {e}")))?;

        write_bytes_col(&mut row_group, rows.iter().map(|r| r.id.as_bytes().to_vec()).collect(), false)?;
        write_bytes_col(&mut row_group, rows.iter().map(|r| r.type_name.as_bytes().to_vec()).collect(), false)?;
        write_i64_col(&mut row_group, rows.iter().map(|r| Some(r.created_at)).collect())?;
        write_i64_col(&mut row_group, rows.iter().map(|r| Some(r.updated_at)).collect())?;
        write_bytes_col(&mut row_group, rows.iter().map(|r| r.created_by.as_bytes().to_vec()).collect(), false)?;
        write_bytes_col(&mut row_group, rows.iter().map(|r| r.updated_by.as_bytes().to_vec()).collect(), false)?;
        write_i64_col(&mut row_group, rows.iter().map(|r| Some(r.version)).collect())?;
        write_i64_opt_col(&mut row_group, rows.iter().map(|r| r.deleted_at).collect())?;
        write_bytes_opt_col(&mut row_group, rows.iter().map(|r| r.deleted_by.clone().map(String::into_bytes)).collect())?;

        let (metadata, residual_payloads): (Vec<_>, Vec<_>) = rows
            .iter()
            .map(|r| {
                let mut residual = r.fields.clone();
                for (field, _) in &plan.fields {
                    residual.remove(field);
                }
                let (metadata, payload) = Variant::encode(&Value::Object(residual)).unwrap_or_default();
                (metadata, payload)
            })
            .unzip();
        write_bytes_col(&mut row_group, metadata, false)?;
        write_bytes_opt_col(
            &mut row_group,
            residual_payloads
                .into_iter()
                .map(|p| if p.is_empty() || p == b"null" { None } else { Some(p) })
                .collect(),
        )?;

        for (field, variant_type) in &plan.fields {
            write_shredded_column(&mut row_group, rows, field, *variant_type)?;
        }

        row_group
            .close()
            .map_err(|e| DbError::Corruption(format!("parquet row group close: {e}")))?;
        writer
            .close()
            .map_err(|e| DbError::Corruption(format!("parquet writer close: {e}")))?;
        Ok(buf)
    }

    /// Per-row-group min/max statistics for every leaf, keyed by physical
    /// column name (e.g. `shred_year`, via `shredded_column_name`/
    /// `flat_leaf_name`) — the same keying `decode_with_skip` probes.
    pub fn read_row_group_stats(data: &[u8]) -> Result<Vec<HashMap<String, (Value, Value)>>> {
        let reader = SerializedFileReader::new(bytes::Bytes::copy_from_slice(data))
            .map_err(|e| DbError::Corruption(format!("parquet reader init: {e}")))?;
        let metadata = reader.metadata();
        Ok(metadata.row_groups().iter().map(|rg| row_group_stats(rg)).collect())
    }

    /// Translate a shredded document field name to the physical column name
    /// its statistics are keyed by. Callers building a pushdown plan must
    /// key `PushedPredicate::stats_path` with this, not the logical
    /// `schema::ShreddingPlan::stats_path` naming — the two namespaces don't
    /// overlap.
    pub fn shredded_column_name(field: &str) -> String {
        flat_leaf_name(field)
    }

    /// Materialize every row back out of an encoded file: system/audit
    /// columns, plus shredded fields reassembled by stripping their
    /// `shred_` prefix, plus whatever the residual `data_value` column
    /// still carries (unshredded fields not named in `plan`).
    pub fn decode(data: &[u8], plan: &ShreddingPlan) -> Result<Vec<Row>> {
        Self::decode_with_skip(data, plan, |_| false)
    }

    /// Like `decode`, but skips entire row groups whose statistics
    /// `should_skip` judges excluded by a pushed-down predicate, never
    /// reading those groups' column chunks at all.
    pub fn decode_with_skip(
        data: &[u8],
        plan: &ShreddingPlan,
        should_skip: impl Fn(&HashMap<String, (Value, Value)>) -> bool,
    ) -> Result<Vec<Row>> {
        let reader = SerializedFileReader::new(bytes::Bytes::copy_from_slice(data))
            .map_err(|e| DbError::Corruption(format!("parquet reader init: {e}")))?;
        let shred_types: HashMap<&str, VariantType> =
            plan.fields.iter().map(|(f, t)| (f.as_str(), *t)).collect();
        let metadata = reader.metadata();

        let mut out = Vec::new();
        for i in 0..metadata.num_row_groups() {
            if should_skip(&row_group_stats(metadata.row_group(i))) {
                continue;
            }
            let row_group = reader
                .get_row_group(i)
                .map_err(|e| DbError::Corruption(format!("parquet row group read: {e}")))?;
            let iter = row_group
                .get_row_iter(None)
                .map_err(|e| DbError::Corruption(format!("parquet row iter: {e}")))?;
            for row_result in iter {
                let row = row_result.map_err(|e| DbError::Corruption(format!("parquet row read: {e}")))?;
                out.push(parse_row(&row, &shred_types));
            }
        }
        Ok(out)
    }
}

fn row_group_stats(rg: &RowGroupMetaData) -> HashMap<String, (Value, Value)> {
    let mut stats = HashMap::new();
    for col in rg.columns() {
        if let Some(col_stats) = col.statistics() {
            if let (Some(min), Some(max)) = (stat_min(col_stats), stat_max(col_stats)) {
                stats.insert(col.column_path().string(), (min, max));
            }
        }
    }
    stats
}

fn parse_row(row: &parquet::record::Row, shred_types: &HashMap<&str, VariantType>) -> Row {
    let mut id = String::new();
    let mut type_name = String::new();
    let mut created_at = 0i64;
    let mut updated_at = 0i64;
    let mut created_by = String::new();
    let mut updated_by = String::new();
    let mut version = 0i64;
    let mut deleted_at = None;
    let mut deleted_by = None;
    let mut metadata_bytes = Vec::new();
    let mut payload_bytes = None;
    let mut fields = Map::new();

    for (name, field) in row.get_column_iter() {
        match name.as_str() {
            "id" => id = field_str(field),
            "type_name" => type_name = field_str(field),
            "created_at" => created_at = field_i64(field),
            "updated_at" => updated_at = field_i64(field),
            "created_by" => created_by = field_str(field),
            "updated_by" => updated_by = field_str(field),
            "version" => version = field_i64(field),
            "deleted_at" => deleted_at = field_i64_opt(field),
            "deleted_by" => deleted_by = field_str_opt(field),
            "data_metadata" => metadata_bytes = field_bytes_opt(field).unwrap_or_default(),
            "data_value" => payload_bytes = field_bytes_opt(field),
            other => {
                if let Some(field_name) = other.strip_prefix("shred_") {
                    if let Some(variant_type) = shred_types.get(field_name) {
                        if let Some(v) = shredded_field_to_json(field, *variant_type) {
                            fields.insert(field_name.to_string(), v);
                        }
                    }
                }
            }
        }
    }

    if let Some(payload) = payload_bytes {
        if let Ok(variant) = Variant::decode(&metadata_bytes, &payload) {
            if let Value::Object(obj) = variant.value {
                for (k, v) in obj {
                    fields.entry(k).or_insert(v);
                }
            }
        }
    }

    Row {
        id,
        type_name,
        created_at,
        updated_at,
        created_by,
        updated_by,
        version,
        deleted_at,
        deleted_by,
        fields,
    }
}

fn field_str(field: &Field) -> String {
    match field {
        Field::Str(s) => s.clone(),
        _ => String::new(),
    }
}

fn field_str_opt(field: &Field) -> Option<String> {
    match field {
        Field::Null => None,
        Field::Str(s) => Some(s.clone()),
        _ => None,
    }
}

fn field_i64(field: &Field) -> i64 {
    match field {
        Field::Long(v) => *v,
        Field::TimestampMillis(v) => *v,
        Field::Int(v) => *v as i64,
        _ => 0,
    }
}

fn field_i64_opt(field: &Field) -> Option<i64> {
    match field {
        Field::Null => None,
        other => Some(field_i64(other)),
    }
}

fn field_bytes_opt(field: &Field) -> Option<Vec<u8>> {
    match field {
        Field::Null => None,
        Field::Bytes(b) => Some(b.data().to_vec()),
        _ => None,
    }
}

fn shredded_field_to_json(field: &Field, variant_type: VariantType) -> Option<Value> {
    match field {
        Field::Null => None,
        Field::Int(v) => Some(json!(v)),
        Field::Long(v) => Some(json!(v)),
        Field::Double(v) => Some(json!(v)),
        Field::Bool(v) => Some(json!(v)),
        Field::TimestampMillis(v) => Some(json!(v)),
        Field::Str(s) => {
            if variant_type == VariantType::Json {
                serde_json::from_str(s).ok()
            } else {
                Some(json!(s))
            }
        }
        _ => None,
    }
}

fn stat_min(stats: &parquet::file::statistics::Statistics) -> Option<Value> {
    statistics_value(stats, true)
}

fn stat_max(stats: &parquet::file::statistics::Statistics) -> Option<Value> {
    statistics_value(stats, false)
}

fn statistics_value(stats: &parquet::file::statistics::Statistics, min: bool) -> Option<Value> {
    use parquet::file::statistics::Statistics as S;
    match stats {
        S::Int32(s) => Some(Value::from(*(if min { s.min() } else { s.max() }))),
        S::Int64(s) => Some(Value::from(*(if min { s.min() } else { s.max() }))),
        S::Double(s) => Some(Value::from(*(if min { s.min() } else { s.max() }))),
        S::Boolean(s) => Some(Value::from(*(if min { s.min() } else { s.max() }))),
        S::ByteArray(s) => std::str::from_utf8((if min { s.min() } else { s.max() }).data())
            .ok()
            .map(|s| Value::String(s.to_string())),
        _ => None,
    }
}

type RowGroupWriter<'a, 'b> = parquet::file::writer::SerializedRowGroupWriter<'a, &'b mut Vec<u8>>;

fn write_bytes_col(rg: &mut RowGroupWriter<'_, '_>, values: Vec<Vec<u8>>, _optional: bool) -> Result<()> {
    let mut col = rg
        .next_column()
        .map_err(|e| DbError::Corruption(e.to_string()))?
        .ok_or_else(|| DbError::Corruption("missing expected column".into()))?;
    let typed = col.typed::<parquet::data_type::ByteArrayType>();
    let data: Vec<ByteArray> = values.into_iter().map(ByteArray::from).collect();
    typed
        .write_batch(&data, None, None)
        .map_err(|e| DbError::Corruption(e.to_string()))?;
    col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
    Ok(())
}

fn write_bytes_opt_col(rg: &mut RowGroupWriter<'_, '_>, values: Vec<Option<Vec<u8>>>) -> Result<()> {
    let mut col = rg
        .next_column()
        .map_err(|e| DbError::Corruption(e.to_string()))?
        .ok_or_else(|| DbError::Corruption("missing expected column".into()))?;
    let typed = col.typed::<parquet::data_type::ByteArrayType>();
    let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
    let data: Vec<ByteArray> = values.into_iter().flatten().map(ByteArray::from).collect();
    typed
        .write_batch(&data, Some(&def_levels), None)
        .map_err(|e| DbError::Corruption(e.to_string()))?;
    col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
    Ok(())
}

fn write_i64_col(rg: &mut RowGroupWriter<'_, '_>, values: Vec<Option<i64>>) -> Result<()> {
    write_i64_opt_col(rg, values)
}

fn write_i64_opt_col(rg: &mut RowGroupWriter<'_, '_>, values: Vec<Option<i64>>) -> Result<()> {
    let mut col = rg
        .next_column()
        .map_err(|e| DbError::Corruption(e.to_string()))?
        .ok_or_else(|| DbError::Corruption("missing expected column".into()))?;
    let typed = col.typed::<parquet::data_type::Int64Type>();
    let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
    let data: Vec<i64> = values.into_iter().flatten().collect();
    typed
        .write_batch(&data, Some(&def_levels), None)
        .map_err(|e| DbError::Corruption(e.to_string()))?;
    col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
    Ok(())
}

fn write_shredded_column(
    rg: &mut RowGroupWriter<'_, '_>,
    rows: &[Row],
    field: &str,
    variant_type: VariantType,
) -> Result<()> {
    let values: Vec<Option<&Value>> = rows.iter().map(|r| r.fields.get(field)).collect();
    match variant_type {
        VariantType::Int32 => {
            let mut col = rg
                .next_column()
                .map_err(|e| DbError::Corruption(e.to_string()))?
                .ok_or_else(|| DbError::Corruption("missing shredded column".into()))?;
            let typed = col.typed::<parquet::data_type::Int32Type>();
            let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
            let data: Vec<i32> = values.into_iter().flatten().filter_map(Value::as_i64).map(|v| v as i32).collect();
            typed
                .write_batch(&data, Some(&def_levels), None)
                .map_err(|e| DbError::Corruption(e.to_string()))?;
            col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
        }
        VariantType::Int64 | VariantType::TimestampMillis => {
            let mut col = rg
                .next_column()
                .map_err(|e| DbError::Corruption(e.to_string()))?
                .ok_or_else(|| DbError::Corruption("missing shredded column".into()))?;
            let typed = col.typed::<parquet::data_type::Int64Type>();
            let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
            let data: Vec<i64> = values.into_iter().flatten().filter_map(Value::as_i64).collect();
            typed
                .write_batch(&data, Some(&def_levels), None)
                .map_err(|e| DbError::Corruption(e.to_string()))?;
            col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
        }
        VariantType::Double => {
            let mut col = rg
                .next_column()
                .map_err(|e| DbError::Corruption(e.to_string()))?
                .ok_or_else(|| DbError::Corruption("missing shredded column".into()))?;
            let typed = col.typed::<parquet::data_type::DoubleType>();
            let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
            let data: Vec<f64> = values.into_iter().flatten().filter_map(Value::as_f64).collect();
            typed
                .write_batch(&data, Some(&def_levels), None)
                .map_err(|e| DbError::Corruption(e.to_string()))?;
            col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
        }
        VariantType::Boolean => {
            let mut col = rg
                .next_column()
                .map_err(|e| DbError::Corruption(e.to_string()))?
                .ok_or_else(|| DbError::Corruption("missing shredded column".into()))?;
            let typed = col.typed::<parquet::data_type::BoolType>();
            let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
            let data: Vec<bool> = values.into_iter().flatten().filter_map(Value::as_bool).collect();
            typed
                .write_batch(&data, Some(&def_levels), None)
                .map_err(|e| DbError::Corruption(e.to_string()))?;
            col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
        }
        VariantType::Utf8 | VariantType::Json => {
            let mut col = rg
                .next_column()
                .map_err(|e| DbError::Corruption(e.to_string()))?
                .ok_or_else(|| DbError::Corruption("missing shredded column".into()))?;
            let typed = col.typed::<parquet::data_type::ByteArrayType>();
            let def_levels: Vec<i16> = values.iter().map(|v| if v.is_some() { 1 } else { 0 }).collect();
            let data: Vec<ByteArray> = values
                .into_iter()
                .flatten()
                .map(|v| match v {
                    Value::String(s) => s.clone().into_bytes(),
                    other => other.to_string().into_bytes(),
                })
                .map(ByteArray::from)
                .collect();
            typed
                .write_batch(&data, Some(&def_levels), None)
                .map_err(|e| DbError::Corruption(e.to_string()))?;
            col.close().map_err(|e| DbError::Corruption(e.to_string()))?;
        }
    }
    Ok(())
}
