//! tiny_fmm Rust module: road network storage and UBODT precomputation for Python via PyO3.

use pyo3::prelude::*;

mod common;
mod config;
mod geometry;
mod graph;
mod routing;
mod ubodt;

pub use config::UbodtGenConfig;
pub use graph::Network;
pub use routing::Record;
pub use ubodt::{ExecutionMode, OutputFormat};

/// Map matching building blocks implemented in Rust.
/// Exposes the road network, bounded routing and UBODT generation to Python.
#[pymodule]
fn tiny_fmm(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    py_module.add_function(wrap_pyfunction!(common::init_logging, py_module)?)?;
    py_module.add_function(wrap_pyfunction!(config::run_ubodt_gen, py_module)?)?;

    register_geometry_module(py_module)?;
    register_graph_module(py_module)?;
    register_ubodt_module(py_module)?;
    register_config_module(py_module)?;

    py_module.add(
        "__doc__",
        "Network storage and upper-bounded origin destination tables implemented in Rust.",
    )?;

    Ok(())
}

/// Registers point and polyline types.
fn register_geometry_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "geometry")?;
    submodule.add("__doc__", "Geometry primitives for road networks.")?;
    submodule.add_class::<geometry::Point3>()?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

/// Registers the network, its payloads and the bounded search results.
fn register_graph_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "graph")?;
    submodule.add(
        "__doc__",
        "Directed road network with id mapping, persistence and bounded routing.",
    )?;
    submodule.add_class::<graph::NodePayload>()?;
    submodule.add_class::<graph::Edge>()?;
    submodule.add_class::<graph::Candidate>()?;
    submodule.add_class::<graph::Network>()?;
    submodule.add_class::<routing::NodeVisit>()?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

/// Registers UBODT records, output formats and the reader.
fn register_ubodt_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "ubodt")?;
    submodule.add(
        "__doc__",
        "Upper-bounded origin destination table generation and loading.",
    )?;
    submodule.add_class::<routing::Record>()?;
    submodule.add_class::<ubodt::OutputFormat>()?;
    submodule.add_function(wrap_pyfunction!(ubodt::read_ubodt, &submodule)?)?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}

/// Registers the generation config.
fn register_config_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "config")?;
    submodule.add("__doc__", "Configuration for UBODT generation runs.")?;
    submodule.add_class::<config::UbodtGenConfig>()?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}
