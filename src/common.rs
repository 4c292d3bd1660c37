use log::LevelFilter;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Sources between progress log lines never drop below this.
pub static MIN_PROGRESS_STEP: usize = 10;

/// Progress is logged roughly every tenth of the sources.
#[inline]
pub fn progress_step(num_vertices: usize) -> usize {
    usize::max(num_vertices / 10, MIN_PROGRESS_STEP)
}

/// Summary returned by a successful generation run.
pub fn status_summary(seconds: f64) -> String {
    format!("Status: success\nTime takes {} seconds\n", seconds)
}

/// Validates a search bound.
pub fn check_delta(delta: f64) -> PyResult<()> {
    if delta.is_nan() || delta < 0.0 {
        return Err(PyValueError::new_err(format!(
            "Delta must be a non-negative number. Found {}.",
            delta
        )));
    }
    Ok(())
}

/// Maps 0-trace, 1-debug, 2-info, 3-warn, 4-err, 5-critical, 6-off onto `log` levels.
pub fn level_filter(log_level: u8) -> LevelFilter {
    match log_level {
        0 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        4 | 5 => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

/// Installs the `env_logger` backend. Later calls keep the first logger.
#[pyfunction]
#[pyo3(signature = (log_level=2))]
pub fn init_logging(log_level: u8) -> PyResult<()> {
    let filter = level_filter(log_level);
    if env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialised; keeping the existing one.");
    }
    log::set_max_level(filter);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_step() {
        assert_eq!(progress_step(0), 10);
        assert_eq!(progress_step(99), 10);
        assert_eq!(progress_step(1000), 100);
    }

    #[test]
    fn test_status_summary() {
        assert_eq!(
            status_summary(1.5),
            "Status: success\nTime takes 1.5 seconds\n"
        );
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(0), LevelFilter::Trace);
        assert_eq!(level_filter(2), LevelFilter::Info);
        assert_eq!(level_filter(5), LevelFilter::Error);
        assert_eq!(level_filter(6), LevelFilter::Off);
        init_logging(3).unwrap();
        init_logging(2).unwrap();
    }

    #[test]
    fn test_check_delta() {
        pyo3::prepare_freethreaded_python();
        assert!(check_delta(0.0).is_ok());
        assert!(check_delta(-0.5).is_err());
        assert!(check_delta(f64::NAN).is_err());
    }
}
