//! Tab-delimited text dumps in the PyNN 0.7 layout
//!
//! Files open with `#` header lines describing the population, followed by
//! one sample per row. Spike rows are `time id`, voltage rows `v id` and
//! conductance rows `exc inh id`.

use crate::error::*;
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column separator of the legacy dumps
const DELIMITER: u8 = b'\t';

fn write_header(out: &mut impl Write, n_neurons: usize, dt: f64) -> std::io::Result<()> {
    writeln!(out, "# first_id = 0")?;
    writeln!(out, "# n = {}", n_neurons)?;
    writeln!(out, "# dt = {}", dt)?;
    writeln!(out, "# dimensions = [{}]", n_neurons)?;
    writeln!(out, "# last_id = {}", n_neurons.saturating_sub(1))
}

fn check_columns(rows: &Array2<f64>, expected: usize, what: &str) -> Result<()> {
    if rows.nrows() > 0 && rows.ncols() != expected {
        return Err(RecordError::shape_mismatch(format!(
            "{} rows need {} columns, got {}",
            what,
            expected,
            rows.ncols()
        )));
    }
    Ok(())
}

fn csv_error(err: csv::Error) -> RecordError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => RecordError::Io { source },
        _ => RecordError::invalid_format(message),
    }
}

/// Write the header, then one tab-separated record per row built by `fields`
fn write_dump<F>(path: &Path, rows: &Array2<f64>, n_neurons: usize, dt: f64, fields: F) -> Result<()>
where
    F: Fn(ndarray::ArrayView1<'_, f64>) -> Vec<String>,
{
    let mut out = BufWriter::new(File::create(path)?);
    write_header(&mut out, n_neurons, dt)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_writer(out);
    for row in rows.outer_iter() {
        writer.write_record(fields(row)).map_err(csv_error)?;
    }
    writer.flush()?;
    log::debug!("Wrote {} rows to {}", rows.nrows(), path.display());
    Ok(())
}

/// Write flattened `(id, time)` spike rows as `time\tid`
pub fn write_spikes(path: impl AsRef<Path>, spikes: &Array2<f64>, n_neurons: usize, dt: f64) -> Result<()> {
    check_columns(spikes, 2, "spike")?;
    write_dump(path.as_ref(), spikes, n_neurons, dt, |row| {
        vec![row[1].to_string(), (row[0] as u32).to_string()]
    })
}

/// Write flattened `(id, time, v)` rows as `v\tid`
pub fn write_v(path: impl AsRef<Path>, v: &Array2<f64>, n_neurons: usize, dt: f64) -> Result<()> {
    check_columns(v, 3, "voltage")?;
    write_dump(path.as_ref(), v, n_neurons, dt, |row| {
        vec![row[2].to_string(), (row[0] as u32).to_string()]
    })
}

/// Write merged `(id, time, exc, inh)` rows as `exc\tinh\tid`
pub fn write_gsyn(path: impl AsRef<Path>, gsyn: &Array2<f64>, n_neurons: usize, dt: f64) -> Result<()> {
    check_columns(gsyn, 4, "gsyn")?;
    write_dump(path.as_ref(), gsyn, n_neurons, dt, |row| {
        vec![row[2].to_string(), row[3].to_string(), (row[0] as u32).to_string()]
    })
}

/// Read every numeric row of a dump, skipping `#` comments
///
/// All rows must have as many columns as the first one.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(false)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(csv_error)?;

    let mut flat = Vec::new();
    let mut columns = 0usize;
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let line = record.position().map_or(0, |p| p.line());
        for field in record.iter() {
            let value = field.parse::<f64>().map_err(|e| {
                RecordError::invalid_format(format!("line {}: {:?}: {}", line, field, e))
            })?;
            flat.push(value);
        }
        columns = record.len();
        rows += 1;
    }

    Array2::from_shape_vec((rows, columns), flat)
        .map_err(|e| RecordError::invalid_format(e.to_string()))
}

/// Read a spike dump back into `(id, time)` rows
pub fn read_spikes(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let rows = read_rows(path)?;
    if rows.nrows() == 0 {
        return Ok(Array2::zeros((0, 2)));
    }
    check_columns(&rows, 2, "spike")?;
    let mut swapped = Array2::zeros((rows.nrows(), 2));
    for (i, row) in rows.outer_iter().enumerate() {
        swapped[[i, 0]] = row[1];
        swapped[[i, 1]] = row[0];
    }
    Ok(swapped)
}
