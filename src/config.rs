use crate::common;
use crate::graph::Network;
use crate::ubodt::{ExecutionMode, OutputFormat};
use pyo3::exceptions;
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_binary() -> bool {
    true
}

fn default_log_level() -> u8 {
    2
}

/// Settings for one UBODT generation run.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UbodtGenConfig {
    #[pyo3(get, set)]
    pub network_file: String,
    #[pyo3(get, set)]
    pub result_file: String,
    #[pyo3(get, set)]
    pub delta: f64,
    #[pyo3(get, set)]
    #[serde(default = "default_binary")]
    pub binary: bool,
    #[pyo3(get, set)]
    #[serde(default)]
    pub use_omp: bool,
    #[pyo3(get, set)]
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// 0-trace, 1-debug, 2-info, 3-warn, 4-err, 5-critical, 6-off
    #[pyo3(get, set)]
    #[serde(default = "default_log_level")]
    pub log_level: u8,
}

#[pymethods]
impl UbodtGenConfig {
    #[new]
    #[pyo3(signature = (network_file, result_file, delta, binary=true, use_omp=false, num_threads=None, log_level=2))]
    pub fn new(
        network_file: String,
        result_file: String,
        delta: f64,
        binary: bool,
        use_omp: bool,
        num_threads: Option<usize>,
        log_level: u8,
    ) -> Self {
        Self {
            network_file,
            result_file,
            delta,
            binary,
            use_omp,
            num_threads,
            log_level,
        }
    }

    #[staticmethod]
    pub fn loads(json: &str) -> PyResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| exceptions::PyValueError::new_err(format!("Invalid config JSON: {}", e)))
    }

    pub fn dumps(&self) -> PyResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| exceptions::PyValueError::new_err(e.to_string()))
    }

    #[staticmethod]
    pub fn load(path: &str) -> PyResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::loads(&json)
    }

    pub fn dump(&self, path: &str) -> PyResult<()> {
        fs::write(path, self.dumps()?)?;
        Ok(())
    }

    pub fn is_binary_output(&self) -> bool {
        self.output_format() == OutputFormat::Binary
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_path(&self.result_file, self.binary)
    }

    /// Checks the run can start. Problems are logged and reported as `false`.
    pub fn validate(&self) -> bool {
        if self.result_file.is_empty() {
            log::error!("Result file not specified");
            return false;
        }
        let result_path = Path::new(&self.result_file);
        if let Some(parent) = result_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                log::error!("Output folder {} not exists", parent.display());
                return false;
            }
        }
        if result_path.exists() {
            log::warn!("Overwrite existing result file {}", self.result_file);
        }
        if !Path::new(&self.network_file).is_file() {
            log::error!("Network file not found {}", self.network_file);
            return false;
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            log::error!("Delta must be a non-negative number. Found {}.", self.delta);
            return false;
        }
        true
    }

    fn __repr__(&self) -> String {
        format!(
            "UbodtGenConfig(network_file={}, result_file={}, delta={}, format={}, use_omp={})",
            self.network_file,
            self.result_file,
            self.delta,
            self.output_format().name(),
            self.use_omp
        )
    }
}

impl UbodtGenConfig {
    pub fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::from_flags(self.use_omp, self.num_threads)
    }

    /// Loads the network and writes the table, returning the status summary.
    pub fn run(&self) -> PyResult<String> {
        if !self.validate() {
            return Err(exceptions::PyValueError::new_err(
                "Invalid UBODT generation configuration.",
            ));
        }
        log::info!("Read network from file {}", self.network_file);
        let mut network = Network::new(true);
        network.load(&self.network_file)?;
        network.generate_ubodt_with(
            &self.result_file,
            self.delta,
            self.output_format(),
            self.execution_mode(),
        )
    }
}

/// Runs a full generation from a config: logging, network load and output.
#[pyfunction]
pub fn run_ubodt_gen(config: &UbodtGenConfig, py: Python) -> PyResult<String> {
    common::init_logging(config.log_level)?;
    log::info!("UBODT generation configuration {}", config.__repr__());
    py.allow_threads(|| config.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::abc_network;
    use crate::ubodt;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_from_json() {
        let config = UbodtGenConfig::loads(
            r#"{"network_file": "net.json", "result_file": "ubodt.bin", "delta": 3000.0}"#,
        )
        .unwrap();
        assert!(config.binary);
        assert!(!config.use_omp);
        assert_eq!(config.num_threads, None);
        assert_eq!(config.log_level, 2);
        assert!(config.is_binary_output());
        assert_eq!(config.execution_mode(), ExecutionMode::Sequential);
        let json_out = UbodtGenConfig::new(
            "net.json".into(),
            "ubodt.json".into(),
            1.0,
            true,
            true,
            Some(2),
            2,
        );
        assert_eq!(json_out.output_format(), OutputFormat::Json);
        assert!(!json_out.is_binary_output());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path = path.to_str().unwrap();
        let config = UbodtGenConfig::new(
            "net.json".into(),
            "ubodt.txt".into(),
            250.0,
            false,
            true,
            Some(4),
            3,
        );
        config.dump(path).unwrap();
        assert_eq!(UbodtGenConfig::load(path).unwrap(), config);
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        let network_file = dir.path().join("network.json");
        abc_network()
            .dump(network_file.to_str().unwrap())
            .unwrap();
        let result_file = dir.path().join("ubodt.txt");
        let mut config = UbodtGenConfig::new(
            network_file.to_str().unwrap().into(),
            result_file.to_str().unwrap().into(),
            2.0,
            false,
            false,
            None,
            2,
        );
        assert!(config.validate());

        config.delta = -1.0;
        assert!(!config.validate());
        config.delta = f64::INFINITY;
        assert!(!config.validate());
        config.delta = 2.0;

        config.result_file = String::new();
        assert!(!config.validate());
        config.result_file = dir
            .path()
            .join("missing")
            .join("ubodt.txt")
            .to_str()
            .unwrap()
            .into();
        assert!(!config.validate());
        config.result_file = result_file.to_str().unwrap().into();

        config.network_file = dir.path().join("absent.json").to_str().unwrap().into();
        assert!(!config.validate());
    }

    #[test]
    fn test_run() {
        pyo3::prepare_freethreaded_python();
        let dir = tempdir().unwrap();
        let network_file = dir.path().join("network.json");
        abc_network()
            .dump(network_file.to_str().unwrap())
            .unwrap();
        let result_file = dir.path().join("ubodt.txt");
        let config = UbodtGenConfig::new(
            network_file.to_str().unwrap().into(),
            result_file.to_str().unwrap().into(),
            2.0,
            false,
            true,
            Some(2),
            2,
        );
        let status = config.run().unwrap();
        assert!(status.starts_with("Status: success"));
        let records =
            ubodt::read_records(result_file.to_str().unwrap(), OutputFormat::Csv).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.cost <= 2.0));

        let mut broken = config.clone();
        broken.delta = -2.0;
        assert!(broken.run().is_err());
    }
}
