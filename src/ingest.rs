use std::path::Path;

use crate::{offset::OffsetRecord, Error, Sample};

// Column aliases seen across firmware revisions of the measurement logger.
// Matching is case-insensitive, exact name first, then substring.
const TIME_NAMES: &[&str] = &["time", "time_s", "timestamp", "elapsed"];
const TARGET_NAMES: &[&str] = &["target", "target_temp", "setpoint", "sp"];
const HOLDER_NAMES: &[&str] = &["holder", "holder_temp", "block", "plate"];
const LIQUID_NAMES: &[&str] = &["liquid", "liquid_temp", "sample_temp", "probe"];
const DESIRED_NAMES: &[&str] = &["desired", "desired_temp", "requested"];
const AMBIENT_NAMES: &[&str] = &["ambient", "ambient_temp", "room", "env"];
const POWER_NAMES: &[&str] = &["power", "power_w", "tec_power", "output"];

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    for name in names {
        if let Some(i) = lower.iter().position(|h| h == name) {
            return Some(i);
        }
    }
    for name in names {
        if let Some(i) = lower.iter().position(|h| h.contains(name)) {
            return Some(i);
        }
    }
    None
}

fn parse_opt(record: &csv::StringRecord, column: Option<usize>) -> Option<f64> {
    column
        .and_then(|i| record.get(i))
        .and_then(|field| field.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Read a measurement log. Time, target and holder columns are required;
/// liquid, desired, ambient and power are picked up when present. Rows with
/// unparsable required fields are skipped and counted, non-monotonic time is
/// rejected outright.
pub fn read_measurement_csv(path: &Path) -> Result<Vec<Sample>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::InputData(format!("failed to open {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::InputData(format!("failed to read headers: {e}")))?
        .clone();

    let time_col = find_column(&headers, TIME_NAMES)
        .ok_or_else(|| Error::InputData("no time column in the log".into()))?;
    let target_col = find_column(&headers, TARGET_NAMES)
        .ok_or_else(|| Error::InputData("no target temperature column in the log".into()))?;
    let holder_col = find_column(&headers, HOLDER_NAMES)
        .ok_or_else(|| Error::InputData("no holder temperature column in the log".into()))?;
    let liquid_col = find_column(&headers, LIQUID_NAMES);
    let desired_col = find_column(&headers, DESIRED_NAMES);
    let ambient_col = find_column(&headers, AMBIENT_NAMES);
    let power_col = find_column(&headers, POWER_NAMES);

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::InputData(format!("failed to read a log row: {e}")))?;

        let required = (
            parse_opt(&record, Some(time_col)),
            parse_opt(&record, Some(target_col)),
            parse_opt(&record, Some(holder_col)),
        );
        let (Some(time), Some(target), Some(holder)) = required else {
            skipped += 1;
            continue;
        };

        let mut sample = Sample::new(time, target, holder);
        sample.liquid_temp = parse_opt(&record, liquid_col);
        sample.desired_temp = parse_opt(&record, desired_col);
        sample.ambient_temp = parse_opt(&record, ambient_col);
        sample.power = parse_opt(&record, power_col);
        samples.push(sample);
    }

    if skipped > 0 {
        tracing::warn!("skipped {skipped} unparsable rows in {}", path.display());
    }

    if samples
        .windows(2)
        .any(|pair| pair[1].time < pair[0].time)
    {
        return Err(Error::InputData(format!(
            "time column of {} is not monotonic",
            path.display()
        )));
    }

    tracing::info!("read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Export offset records so the calibration can be inspected in a
/// spreadsheet. Columns mirror [`OffsetRecord`].
pub fn write_offsets_csv(path: &Path, records: &[OffsetRecord]) -> Result<(), Error> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| Error::InputData(format!("failed to create {}: {e}", path.display())))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| Error::InputData(format!("failed to write an offset row: {e}")))?;
    }
    writer
        .flush()
        .map_err(Error::ConfigPersistence)?;
    tracing::info!("{} offset records written to {}", records.len(), path.display());
    Ok(())
}
