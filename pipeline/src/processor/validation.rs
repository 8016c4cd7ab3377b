use arrow::datatypes::{Schema, SchemaRef};
use common::{Error, Result};
use datafusion::datasource::TableProvider;
use datafusion::datasource::file_format::parquet::ParquetFormat;
use datafusion::datasource::listing::{ListingOptions, ListingTable, ListingTableConfig, ListingTableUrl};
use datafusion::execution::context::SessionContext;
use std::sync::Arc;
use tracing::warn;

/// Fails with a data-integrity error when a reload produced no rows.
pub fn ensure_rows(count: usize, uri: &str) -> Result<()> {
    if count == 0 {
        return Err(Error::DataIntegrity(format!(
            "No data was read from {}. Check the storage location.",
            uri
        )));
    }
    Ok(())
}

pub async fn infer_schema(ctx: &SessionContext, uri: &str) -> Result<SchemaRef> {
    let table_url = ListingTableUrl::parse(uri)?;

    let listing_options = ListingOptions::new(Arc::new(ParquetFormat::default()))
        .with_file_extension(".parquet");

    let config = ListingTableConfig::new(table_url)
        .with_listing_options(listing_options)
        .infer_schema(&ctx.state())
        .await?;

    let table = ListingTable::try_new(config)?;
    Ok(table.schema())
}

/// Compares the schema of the files under `uri` with `expected`. Names and
/// types must match in order; nullability differences are only reported.
pub async fn validate_schema(ctx: &SessionContext, uri: &str, expected: &Schema) -> Result<()> {
    let inferred = infer_schema(ctx, uri).await?;
    compare_schemas(expected, &inferred)
}

pub fn compare_schemas(expected: &Schema, found: &Schema) -> Result<()> {
    if expected.fields().len() != found.fields().len() {
        return Err(Error::SchemaMismatch(format!(
            "Expected {} fields, found {}",
            expected.fields().len(),
            found.fields().len()
        )));
    }

    for (expected_field, found_field) in expected.fields().iter().zip(found.fields().iter()) {
        if expected_field.name() != found_field.name() {
            return Err(Error::SchemaMismatch(format!(
                "Field name mismatch. Expected: {}, Found: {}",
                expected_field.name(),
                found_field.name()
            )));
        }

        if expected_field.data_type() != found_field.data_type() {
            return Err(Error::SchemaMismatch(format!(
                "Type mismatch for field {}. Expected: {:?}, Found: {:?}",
                expected_field.name(),
                expected_field.data_type(),
                found_field.data_type()
            )));
        }

        if expected_field.is_nullable() != found_field.is_nullable() {
            warn!(
                field = expected_field.name().as_str(),
                expected = expected_field.is_nullable(),
                found = found_field.is_nullable(),
                "Nullability mismatch"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::raw_data_schema;
    use arrow::datatypes::{DataType, Field};

    #[test]
    fn test_ensure_rows() {
        assert!(ensure_rows(1, "s3://bucket/in/raw_data/").is_ok());
        let err = ensure_rows(0, "s3://bucket/in/raw_data/").unwrap_err();
        assert!(err.is_data_integrity());
        assert!(err.to_string().contains("s3://bucket/in/raw_data/"));
    }

    #[test]
    fn test_nullability_is_tolerated() {
        let found = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("value", DataType::Float64, true),
            Field::new("group", DataType::Int64, true),
        ]);
        assert!(compare_schemas(&raw_data_schema(), &found).is_ok());
    }

    #[test]
    fn test_type_and_name_mismatches() {
        let wrong_type = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("value", DataType::Float32, false),
            Field::new("group", DataType::Int64, false),
        ]);
        let err = compare_schemas(&raw_data_schema(), &wrong_type).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));

        let wrong_name = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("val", DataType::Float64, false),
            Field::new("group", DataType::Int64, false),
        ]);
        assert!(compare_schemas(&raw_data_schema(), &wrong_name).is_err());

        let short = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        assert!(compare_schemas(&raw_data_schema(), &short).is_err());
    }
}
