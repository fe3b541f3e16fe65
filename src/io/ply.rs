//! PLY (Stanford polygon) point-cloud support.
//!
//! Only the `vertex` element is read: `x`, `y`, `z` and, when all three are
//! present, `nx`, `ny`, `nz`. Faces and other elements are ignored.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::cloud::PointCloud;
use crate::error::{Result, WlopError};

use super::check_normals;

/// Load a point cloud from a PLY file.
///
/// # Example
///
/// ```no_run
/// use wlop::io::ply;
///
/// let cloud = ply::load("scan.ply").unwrap();
/// println!("{} points", cloud.len());
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let load_error = |message: String| WlopError::LoadError {
        path: path.to_path_buf(),
        message,
    };

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| load_error(e.to_string()))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| load_error("PLY file has no vertex element".to_string()))?;

    let mut positions = Vec::with_capacity(vertex_element.len());
    let mut normals = Vec::with_capacity(vertex_element.len());
    let mut has_normals = true;

    for (i, vertex) in vertex_element.iter().enumerate() {
        let coord = |name: &str| {
            get_float_property(vertex, name)
                .ok_or_else(|| load_error(format!("vertex {} missing {} coordinate", i, name)))
        };
        positions.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        if has_normals {
            match (
                get_float_property(vertex, "nx"),
                get_float_property(vertex, "ny"),
                get_float_property(vertex, "nz"),
            ) {
                (Some(nx), Some(ny), Some(nz)) => normals.push(Vector3::new(nx, ny, nz)),
                _ => has_normals = false,
            }
        }
    }

    Ok(if has_normals && !positions.is_empty() {
        PointCloud::with_normals(positions, normals)
    } else {
        PointCloud::new(positions)
    })
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

/// Save a point cloud to a PLY file (ASCII format, double precision).
pub fn save<P: AsRef<Path>>(cloud: &PointCloud, path: P) -> Result<()> {
    let path = path.as_ref();
    check_normals(cloud, path)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment Generated by wlop")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    for name in ["x", "y", "z"] {
        writeln!(writer, "property double {}", name)?;
    }
    if cloud.has_normals() {
        for name in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {}", name)?;
        }
    }
    writeln!(writer, "end_header")?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("wlop_ply_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_save_and_load_with_normals() {
        let cloud = PointCloud::with_normals(
            vec![Point3::new(0.5, -1.25, 3.0), Point3::new(1e-3, 2.0, -0.75)],
            vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0)],
        );
        let path = temp_path("normals.ply");
        save(&cloud, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_load_ignores_faces_and_float_properties() {
        let path = temp_path("mesh.ply");
        std::fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
             property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
             end_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n",
        )
        .unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 3);
        assert!(!loaded.has_normals());
        assert_eq!(loaded.positions[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_load_without_vertices_fails() {
        let path = temp_path("empty.ply");
        std::fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement face 0\nproperty list uchar int vertex_indices\nend_header\n",
        )
        .unwrap();
        let err = load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, WlopError::LoadError { .. }));
    }
}
