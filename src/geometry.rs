use geo::algorithm::Euclidean;
use geo::geometry::{Coord, LineString, Point};
use geo::{Distance, Haversine};
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions;
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// A 3D point. `z` is elevation, in the same unit as planar `x`/`y` or in metres for lon/lat.
#[pyclass]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    #[pyo3(get)]
    pub x: f64,
    #[pyo3(get)]
    pub y: f64,
    #[pyo3(get)]
    pub z: f64,
}

#[pymethods]
impl Point3 {
    #[new]
    #[pyo3(signature = (x, y, z=0.0))]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xyz(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    fn __repr__(&self) -> String {
        format!("Point3({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Point3 {
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    #[inline]
    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Ordered sequence of points, first = start, last = end.
pub type Polyline = Vec<Point3>;

/// Builds a point from an `[x, y, (z)]` row; `z` defaults to 0.
pub fn point_from_slice(xyz: &[f64]) -> PyResult<Point3> {
    match xyz {
        [x, y] => Ok(Point3::new(*x, *y, 0.0)),
        [x, y, z, ..] => Ok(Point3::new(*x, *y, *z)),
        _ => Err(exceptions::PyValueError::new_err(format!(
            "Coordinates require at least 2 values. Found {}.",
            xyz.len()
        ))),
    }
}

pub fn polyline_from_rows(rows: &[Vec<f64>]) -> PyResult<Polyline> {
    rows.iter().map(|row| point_from_slice(row)).collect()
}

/// Reads an `N x 2` or `N x 3` float array into a polyline.
pub fn polyline_from_array(array: PyReadonlyArray2<'_, f64>) -> PyResult<Polyline> {
    let view = array.as_array();
    let (_, ncols) = view.dim();
    if ncols < 2 {
        return Err(exceptions::PyValueError::new_err(format!(
            "Polyline array must have 2 or 3 columns. Found {}.",
            ncols
        )));
    }
    Ok(view
        .rows()
        .into_iter()
        .map(|row| Point3::new(row[0], row[1], if ncols > 2 { row[2] } else { 0.0 }))
        .collect())
}

/// Packs points into an `N x 3` numpy array.
pub fn polyline_to_array(py: Python<'_>, points: &[Point3]) -> PyResult<Py<PyArray2<f64>>> {
    let flat: Vec<f64> = points.iter().flat_map(|p| p.to_array()).collect();
    let array = Array2::from_shape_vec((points.len(), 3), flat)
        .map_err(|e| exceptions::PyValueError::new_err(e.to_string()))?;
    Ok(array.into_pyarray(py).unbind())
}

/// Projects the polyline onto the xy plane.
pub fn to_line_string(points: &[Point3]) -> LineString<f64> {
    LineString::new(points.iter().map(|p| p.coord()).collect())
}

/// 3D length of one segment. Lon/lat input uses haversine metres for the horizontal part.
#[inline]
pub fn segment_length(a: &Point3, b: &Point3, is_wgs84: bool) -> f64 {
    let (pa, pb) = (Point::from(a.coord()), Point::from(b.coord()));
    let horizontal = if is_wgs84 {
        Haversine.distance(pa, pb)
    } else {
        Euclidean.distance(pa, pb)
    };
    horizontal.hypot(b.z - a.z)
}

/// Arc length of a polyline, summed over its 3D segments.
pub fn polyline_length(points: &[Point3], is_wgs84: bool) -> f64 {
    points
        .windows(2)
        .map(|seg| segment_length(&seg[0], &seg[1], is_wgs84))
        .sum()
}

/// Appends `segs[offset..]` to `line`.
#[inline]
pub fn append_segs(line: &mut Polyline, segs: &[Point3], offset: usize) {
    line.extend(segs.iter().skip(offset).copied());
}
