//! Memory utilization sampling for the load shedder.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} missing from meminfo")]
    MissingField(&'static str),

    #[error("unparsable {field} value '{value}'")]
    Parse { field: &'static str, value: String },
}

/// Source of memory utilization readings, as a percentage in `[0, 100]`.
pub trait MemorySampler: Send + 'static {
    fn sample(&mut self) -> Result<f64, SamplerError>;
}

impl<F> MemorySampler for F
where
    F: FnMut() -> Result<f64, SamplerError> + Send + 'static,
{
    fn sample(&mut self) -> Result<f64, SamplerError> {
        self()
    }
}

/// Host memory utilization from `/proc/meminfo`: `(MemTotal - MemAvailable) / MemTotal`.
#[derive(Debug, Clone)]
pub struct ProcMeminfoSampler {
    path: PathBuf,
}

impl ProcMeminfoSampler {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/meminfo"),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMeminfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcMeminfoSampler {
    fn sample(&mut self) -> Result<f64, SamplerError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| SamplerError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_meminfo(&contents)
    }
}

fn parse_meminfo(contents: &str) -> Result<f64, SamplerError> {
    let mut total = None;
    let mut available = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        match key {
            "MemTotal:" => total = Some(parse_kib("MemTotal", value)?),
            "MemAvailable:" => available = Some(parse_kib("MemAvailable", value)?),
            _ => {}
        }
    }

    let total = total.ok_or(SamplerError::MissingField("MemTotal"))?;
    let available = available.ok_or(SamplerError::MissingField("MemAvailable"))?;
    if total == 0 {
        return Err(SamplerError::Parse {
            field: "MemTotal",
            value: "0".to_string(),
        });
    }

    let used = total.saturating_sub(available) as f64;
    Ok((used / total as f64 * 100.0).clamp(0.0, 100.0))
}

fn parse_kib(field: &'static str, value: &str) -> Result<u64, SamplerError> {
    value.parse().map_err(|_| SamplerError::Parse {
        field,
        value: value.to_string(),
    })
}
