//! Plain-text XYZ point clouds.
//!
//! One point per line, whitespace separated: `x y z` or `x y z nx ny nz`.
//! Blank lines and lines starting with `#` are skipped. All point lines
//! must have the same number of columns.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::cloud::PointCloud;
use crate::error::{Result, WlopError};

use super::check_normals;

/// Load a point cloud from an XYZ file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let load_error = |line: usize, message: String| WlopError::LoadError {
        path: path.to_path_buf(),
        message: format!("line {}: {}", line, message),
    };

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut columns = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| load_error(i + 1, format!("invalid number '{}'", token)))
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() != 3 && values.len() != 6 {
            return Err(load_error(
                i + 1,
                format!("expected 3 or 6 values, found {}", values.len()),
            ));
        }
        match columns {
            None => columns = Some(values.len()),
            Some(n) if n != values.len() => {
                return Err(load_error(
                    i + 1,
                    format!("expected {} values like the first point, found {}", n, values.len()),
                ));
            }
            Some(_) => {}
        }

        positions.push(Point3::new(values[0], values[1], values[2]));
        if values.len() == 6 {
            normals.push(Vector3::new(values[3], values[4], values[5]));
        }
    }

    Ok(if columns == Some(6) {
        PointCloud::with_normals(positions, normals)
    } else {
        PointCloud::new(positions)
    })
}

/// Save a point cloud to an XYZ file, with normals when present.
pub fn save<P: AsRef<Path>>(cloud: &PointCloud, path: P) -> Result<()> {
    let path = path.as_ref();
    check_normals(cloud, path)?;
    let mut writer = BufWriter::new(File::create(path)?);

    match &cloud.normals {
        Some(normals) => {
            for (p, n) in cloud.positions.iter().zip(normals) {
                writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z)?;
            }
        }
        None => {
            for p in &cloud.positions {
                writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}
