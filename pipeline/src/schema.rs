use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use lazy_static::lazy_static;
use std::sync::Arc;

pub const ID: &str = "id";
pub const VALUE: &str = "value";
pub const GROUP: &str = "group";
pub const RANDOM: &str = "random";
pub const COMPLEX_CALC: &str = "complex_calc";
pub const ROW_NUMBER: &str = "row_number";
pub const RANK: &str = "rank";
pub const DENSE_RANK: &str = "dense_rank";

// Schema of the generated ids before any derived column is added
pub fn id_schema() -> Schema {
    Schema::new(vec![Field::new(ID, DataType::Int64, false)])
}

// Declared schema of `raw_data`, used on every reload instead of inference
pub fn raw_data_schema() -> Schema {
    Schema::new(vec![
        Field::new(ID, DataType::Int64, false),
        Field::new(VALUE, DataType::Float64, false),
        Field::new(GROUP, DataType::Int64, false),
    ])
}

pub fn raw_data_schema_ref() -> SchemaRef {
    RAW_DATA_SCHEMA.clone()
}

// Lazy-loaded static schemas
lazy_static! {
    static ref RAW_DATA_SCHEMA: SchemaRef = Arc::new(raw_data_schema());
}
