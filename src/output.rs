// Serialization of result tables to csv, gzipped csv, or parquet.

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::csv;
use arrow::datatypes::{DataType, Field, Schema};
use clap::ValueEnum;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression::ZSTD, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AnalysisError, Result};
use crate::params::AnalysisParams;
use crate::table::{ResultTable, Value};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    Infer,
    Csv,
    CsvGz,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::CsvGz => "csv.gz",
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv | OutputFormat::Infer => "csv",
        }
    }
}

pub fn determine_format(filename: &str, fmt: OutputFormat) -> Result<OutputFormat> {
    if fmt != OutputFormat::Infer {
        return Ok(fmt);
    }

    if filename.ends_with(".csv.gz") {
        Ok(OutputFormat::CsvGz)
    } else if filename.ends_with(".csv") {
        Ok(OutputFormat::Csv)
    } else if filename.ends_with(".parquet") {
        Ok(OutputFormat::Parquet)
    } else {
        Err(AnalysisError::UnknownFormat(filename.to_string()))
    }
}

// `<dir>/<stem>_<suffix>.<ext>`
pub fn output_path(dir: &Path, stem: &str, suffix: &str, fmt: OutputFormat) -> PathBuf {
    dir.join(format!("{}_{}.{}", stem, suffix, fmt.extension()))
}

fn column_type<'a>(values: impl Iterator<Item = Option<&'a Value>>) -> DataType {
    let mut all_int = true;
    for value in values.flatten() {
        match value {
            Value::Text(_) => return DataType::Utf8,
            Value::Float(_) => all_int = false,
            Value::Int(_) => {}
        }
    }
    if all_int {
        DataType::Int64
    } else {
        DataType::Float64
    }
}

// One arrow column per table column. A column holding any text is Utf8,
// integers only is Int64, anything else Float64. Rows without a value for a
// column get a null.
pub fn table_to_record_batch(table: &ResultTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for name in table.columns() {
        let values = table.column(name);
        let data_type = column_type(values.iter().copied());
        let array: ArrayRef = match data_type {
            DataType::Utf8 => Arc::new(
                values
                    .iter()
                    .map(|v| v.map(|v| v.to_string()))
                    .collect::<StringArray>(),
            ),
            DataType::Int64 => Arc::new(
                values
                    .iter()
                    .map(|v| match v {
                        Some(Value::Int(i)) => Some(*i),
                        _ => None,
                    })
                    .collect::<Int64Array>(),
            ),
            _ => Arc::new(
                values
                    .iter()
                    .map(|v| v.and_then(|v| v.as_f64()))
                    .collect::<Float64Array>(),
            ),
        };
        fields.push(Field::new(name, data_type, true));
        columns.push(array);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

pub fn write_table(filename: &Path, fmt: OutputFormat, table: &ResultTable) -> Result<()> {
    if table.is_empty() {
        warn!("No rows to write to {}", filename.display());
        return Ok(());
    }

    let fmt = determine_format(&filename.to_string_lossy(), fmt)?;
    let batch = table_to_record_batch(table)?;
    let file = File::create(filename)?;

    match fmt {
        OutputFormat::Csv | OutputFormat::Infer => {
            write_table_csv(file, &batch)?;
        }
        OutputFormat::CsvGz => {
            let encoder = GzEncoder::new(file, Compression::default());
            let encoder = write_table_csv(encoder, &batch)?;
            encoder.finish()?;
        }
        OutputFormat::Parquet => {
            write_table_parquet(file, &batch)?;
        }
    }

    info!("Wrote {} rows to {}", table.len(), filename.display());
    Ok(())
}

fn write_table_csv<W: Write>(output: W, batch: &RecordBatch) -> Result<W> {
    let mut writer = csv::WriterBuilder::new().with_header(true).build(output);
    writer.write(batch)?;
    Ok(writer.into_inner())
}

fn write_table_parquet(output: File, batch: &RecordBatch) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(ZSTD(ZstdLevel::try_new(3)?))
        .build();

    let mut writer = ArrowWriter::try_new(output, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

pub fn write_parameters(filename: &Path, params: &AnalysisParams) -> Result<()> {
    let file = File::create(filename)?;
    serde_json::to_writer_pretty(file, &params.to_json()).map_err(std::io::Error::from)?;
    Ok(())
}
