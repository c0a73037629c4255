//! Structured analyzer output.
//!
//! The analyzer answers with a JSON object carrying `feedback` (string) and
//! one or more named arrays of `{ "time": <label>, "<metric>": <number> }`
//! records, e.g. `wpm_data`, `pitch_data`, `volume_data`. Each record has
//! exactly one metric field, and every array of one result shares the same
//! ordered time labels (one per fixed-duration window). Violations are
//! rejected at parse time so downstream code never sees a skewed result.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One point of a named time series: window label plus metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub time: String,
    pub value: f64,
}

/// Feedback text plus aligned, named time-series metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    feedback: String,
    series: BTreeMap<String, Vec<MetricPoint>>,
}

impl AnalysisResult {
    /// Parse and validate the analyzer wire format.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "analyzer response is not a JSON object".to_string())?;

        let feedback = object
            .get("feedback")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing or non-string 'feedback' field".to_string())?
            .to_string();

        let mut series = BTreeMap::new();
        for (name, entry) in object {
            if name == "feedback" {
                continue;
            }
            let records = entry
                .as_array()
                .ok_or_else(|| format!("field '{}' is not an array of records", name))?;
            series.insert(name.clone(), parse_series(name, records)?);
        }

        if series.is_empty() {
            return Err("analyzer response carries no time series".to_string());
        }

        let result = Self { feedback, series };
        result.check_alignment()?;
        Ok(result)
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn series(&self) -> &BTreeMap<String, Vec<MetricPoint>> {
        &self.series
    }

    pub fn series_named(&self, name: &str) -> Option<&[MetricPoint]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// The shared window labels, in order.
    pub fn time_labels(&self) -> Vec<&str> {
        self.series
            .values()
            .next()
            .map(|points| points.iter().map(|p| p.time.as_str()).collect())
            .unwrap_or_default()
    }

    fn check_alignment(&self) -> Result<(), String> {
        let mut iter = self.series.iter();
        let Some((first_name, first)) = iter.next() else {
            return Ok(());
        };
        let reference: Vec<&str> = first.iter().map(|p| p.time.as_str()).collect();

        for (name, points) in iter {
            let labels: Vec<&str> = points.iter().map(|p| p.time.as_str()).collect();
            if labels != reference {
                return Err(format!(
                    "series '{}' and '{}' disagree on time labels",
                    first_name, name
                ));
            }
        }
        Ok(())
    }
}

fn parse_series(name: &str, records: &[Value]) -> Result<Vec<MetricPoint>, String> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| parse_record(record).map_err(|e| format!("{}[{}]: {}", name, index, e)))
        .collect()
}

fn parse_record(record: &Value) -> Result<MetricPoint, String> {
    let object = record
        .as_object()
        .ok_or_else(|| "record is not an object".to_string())?;

    let time = object
        .get("time")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing or non-string 'time' label".to_string())?
        .to_string();

    let mut metrics = object.iter().filter(|(key, _)| key.as_str() != "time");
    let (metric_name, metric_value) = metrics
        .next()
        .ok_or_else(|| "record carries no metric field".to_string())?;
    if let Some((extra, _)) = metrics.next() {
        return Err(format!(
            "record carries more than one metric field ('{}' and '{}')",
            metric_name, extra
        ));
    }

    let value = metric_value
        .as_f64()
        .ok_or_else(|| format!("metric field '{}' is not a number", metric_name))?;

    Ok(MetricPoint { time, value })
}

impl<'de> Deserialize<'de> for AnalysisResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}
