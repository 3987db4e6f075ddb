//! Collection type definitions, shredding-field selection, and Parquet
//! schema generation. Each collection's type definition produces both the
//! `ShreddingPlan` (which fields become typed columns) and the `parquet`
//! message schema that lays them out.

use crate::variant::VariantType;
use parquet::basic::{LogicalType, Repetition, Type as PhysicalType};
use parquet::schema::types::Type as SchemaType;
use std::sync::Arc;

/// A field's declared primitive, independent of its eventual Parquet
/// physical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Json,
    Binary,
}

impl Primitive {
    /// Parse one of the declared type-definition primitive names.
    pub fn from_name(name: &str) -> Primitive {
        match name {
            "string" | "text" | "markdown" | "email" | "url" | "uuid" | "varchar" | "char"
            | "enum" => Primitive::String,
            "int" | "integer" => Primitive::Int,
            "float" | "double" | "number" | "decimal" => Primitive::Float,
            "bool" | "boolean" => Primitive::Bool,
            "date" => Primitive::Date,
            "datetime" | "timestamp" => Primitive::DateTime,
            "binary" | "vector" => Primitive::Binary,
            _ => Primitive::Json,
        }
    }

    fn physical_type(self) -> (PhysicalType, Option<LogicalType>) {
        match self {
            Primitive::String | Primitive::Date => (PhysicalType::BYTE_ARRAY, Some(LogicalType::String)),
            Primitive::Int => (PhysicalType::INT32, None),
            Primitive::Float => (PhysicalType::DOUBLE, None),
            Primitive::Bool => (PhysicalType::BOOLEAN, None),
            Primitive::DateTime => (
                PhysicalType::INT64,
                Some(LogicalType::Timestamp {
                    is_adjusted_to_u_t_c: true,
                    unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
                }),
            ),
            Primitive::Json | Primitive::Binary => (PhysicalType::BYTE_ARRAY, None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub primitive: Primitive,
    pub indexed: bool,
}

#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// Shredding policy: which fields get promoted into typed columns.
#[derive(Debug, Clone)]
pub struct ShredConfig {
    pub always: Vec<String>,
    pub auto: bool,
    pub shred_types: Vec<Primitive>,
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            always: Vec::new(),
            auto: true,
            shred_types: vec![
                Primitive::Bool,
                Primitive::Date,
                Primitive::DateTime,
                Primitive::Int,
                Primitive::Float,
            ],
        }
    }
}

/// The result of running a `ShredConfig` against a `TypeDefinition`: the
/// ordered list of fields to promote, each with its detected/overridden
/// typed-column type.
#[derive(Debug, Clone)]
pub struct ShreddingPlan {
    pub fields: Vec<(String, VariantType)>,
}

impl ShreddingPlan {
    pub fn is_shredded(&self, field: &str) -> bool {
        self.fields.iter().any(|(f, _)| f == field)
    }

    /// Statistics path for a shredded field on a given VARIANT root column.
    pub fn stats_path(root: &str, field: &str) -> String {
        format!("{root}.typed_value.{field}.typed_value")
    }
}

pub struct ShreddingPlanner;

impl ShreddingPlanner {
    /// A field is selected for shredding when it is named in `always`, is
    /// declared indexed, or its primitive belongs to `shred_types` with
    /// `auto` enabled. Fields beginning with `$` are metadata and never
    /// shredded.
    pub fn plan(type_def: &TypeDefinition, config: &ShredConfig) -> ShreddingPlan {
        let mut fields = Vec::new();
        for field in &type_def.fields {
            if field.name.starts_with('$') {
                continue;
            }
            let always = config.always.iter().any(|f| f == &field.name);
            let auto_eligible = config.auto && config.shred_types.contains(&field.primitive);
            if always || field.indexed || auto_eligible {
                let variant_type = match field.primitive {
                    Primitive::Int => VariantType::Int32,
                    Primitive::Float => VariantType::Double,
                    Primitive::Bool => VariantType::Boolean,
                    Primitive::Date | Primitive::DateTime => VariantType::TimestampMillis,
                    Primitive::String => VariantType::Utf8,
                    Primitive::Json | Primitive::Binary => VariantType::Json,
                };
                fields.push((field.name.clone(), variant_type));
            }
        }
        ShreddingPlan { fields }
    }
}

/// Build the `parquet` message schema for a collection: system columns,
/// audit columns, soft-delete columns, and a VARIANT root per shredded
/// field.
pub fn build_message_schema(collection: &str, plan: &ShreddingPlan) -> SchemaType {
    let mut fields = Vec::new();

    fields.push(required_primitive("$id", PhysicalType::BYTE_ARRAY, Some(LogicalType::String)));
    fields.push(required_primitive("$type", PhysicalType::BYTE_ARRAY, Some(LogicalType::String)));
    fields.push(optional_primitive("$data", PhysicalType::BYTE_ARRAY, Some(LogicalType::Json)));

    for name in ["createdAt", "updatedAt"] {
        fields.push(required_primitive(
            name,
            PhysicalType::INT64,
            Some(LogicalType::Timestamp {
                is_adjusted_to_u_t_c: true,
                unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
            }),
        ));
    }
    fields.push(required_primitive("createdBy", PhysicalType::BYTE_ARRAY, Some(LogicalType::String)));
    fields.push(required_primitive("updatedBy", PhysicalType::BYTE_ARRAY, Some(LogicalType::String)));
    fields.push(required_primitive("version", PhysicalType::INT64, None));
    fields.push(optional_primitive(
        "deletedAt",
        PhysicalType::INT64,
        Some(LogicalType::Timestamp {
            is_adjusted_to_u_t_c: true,
            unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
        }),
    ));
    fields.push(optional_primitive("deletedBy", PhysicalType::BYTE_ARRAY, Some(LogicalType::String)));

    for (name, variant_type) in &plan.fields {
        fields.push(Arc::new(shredded_root(name, *variant_type)));
    }

    SchemaType::group_type_builder(collection)
        .with_fields(fields)
        .build()
        .expect("static field list always builds")
}

fn shredded_root(name: &str, variant_type: VariantType) -> SchemaType {
    let typed_value_leaf = match variant_type {
        VariantType::Int32 => optional_primitive("typed_value", PhysicalType::INT32, None),
        VariantType::Int64 => optional_primitive("typed_value", PhysicalType::INT64, None),
        VariantType::Double => optional_primitive("typed_value", PhysicalType::DOUBLE, None),
        VariantType::Boolean => optional_primitive("typed_value", PhysicalType::BOOLEAN, None),
        VariantType::TimestampMillis => optional_primitive(
            "typed_value",
            PhysicalType::INT64,
            Some(LogicalType::Timestamp {
                is_adjusted_to_u_t_c: true,
                unit: parquet::basic::TimeUnit::MILLIS(Default::default()),
            }),
        ),
        VariantType::Utf8 | VariantType::Json => {
            optional_primitive("typed_value", PhysicalType::BYTE_ARRAY, Some(LogicalType::String))
        }
    };

    let field_group = SchemaType::group_type_builder(name)
        .with_repetition(Repetition::OPTIONAL)
        .with_fields(vec![
            optional_primitive("value", PhysicalType::BYTE_ARRAY, None),
            typed_value_leaf,
        ])
        .build()
        .expect("static field group always builds");

    let typed_value_group = SchemaType::group_type_builder("typed_value")
        .with_repetition(Repetition::OPTIONAL)
        .with_fields(vec![Arc::new(field_group)])
        .build()
        .expect("static typed_value group always builds");

    SchemaType::group_type_builder(name)
        .with_repetition(Repetition::OPTIONAL)
        .with_fields(vec![
            required_primitive("metadata", PhysicalType::BYTE_ARRAY, None),
            optional_primitive("value", PhysicalType::BYTE_ARRAY, None),
            Arc::new(typed_value_group),
        ])
        .build()
        .expect("static shredded root always builds")
}

fn required_primitive(name: &str, physical: PhysicalType, logical: Option<LogicalType>) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, physical)
            .with_repetition(Repetition::REQUIRED)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}

fn optional_primitive(name: &str, physical: PhysicalType, logical: Option<LogicalType>) -> Arc<SchemaType> {
    Arc::new(
        SchemaType::primitive_type_builder(name, physical)
            .with_repetition(Repetition::OPTIONAL)
            .with_logical_type(logical)
            .build()
            .expect("static primitive always builds"),
    )
}
