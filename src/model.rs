use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra_glm as glm;
use thiserror::Error;

use crate::config::MAX_MATERIALS;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("could not read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed `{directive}` directive at {}:{line}", .path.display())]
    Malformed {
        directive: &'static str,
        path: PathBuf,
        line: usize,
    },
    #[error("unknown material `{name}` at {}:{line}", .path.display())]
    UnknownMaterial {
        name: String,
        path: PathBuf,
        line: usize,
    },
    #[error("face with {count} vertices at {}:{line}, only triangles and quads are supported", .path.display())]
    UnsupportedFace {
        count: usize,
        path: PathBuf,
        line: usize,
    },
    #[error("vertex index {index} out of range at {}:{line}", .path.display())]
    IndexOutOfRange {
        index: i64,
        path: PathBuf,
        line: usize,
    },
    #[error("{count} materials in `{}`, at most {} fit the uniform block", .path.display(), MAX_MATERIALS)]
    TooManyMaterials { count: usize, path: PathBuf },
    #[error("`{}` holds more vertices than a 16-bit index buffer can address", .path.display())]
    TooManyVertices { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub ambient: glm::Vec3,
    pub diffuse: glm::Vec3,
}

/// Flat-shaded triangle soup: every face contributes its own three vertices,
/// so the parallel arrays stay index-aligned and the per-face normal never
/// gets smoothed across faces.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub positions: Vec<glm::Vec3>,
    pub normals: Vec<glm::Vec3>,
    pub material_indices: Vec<u32>,
    pub indices: Vec<u16>,
    pub materials: Vec<Material>,
}

impl Mesh {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| MeshError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut mesh = Mesh::default();
        let mut declared = Vec::new();
        let mut name_to_index = HashMap::new();
        let mut current_material = 0u32;

        for (line_index, line) in text.lines().enumerate() {
            let line_no = line_index + 1;
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }
                match token {
                    "mtllib" => {
                        let name = tokens.next().ok_or(MeshError::Malformed {
                            directive: "mtllib",
                            path: path.to_path_buf(),
                            line: line_no,
                        })?;
                        // Material libraries resolve next to the geometry file.
                        let mtl_path = match path.parent() {
                            Some(parent) => parent.join(name),
                            None => PathBuf::from(name),
                        };
                        mesh.materials = load_material_file(&mtl_path, &mut name_to_index)?;
                        if mesh.materials.len() > MAX_MATERIALS {
                            return Err(MeshError::TooManyMaterials {
                                count: mesh.materials.len(),
                                path: mtl_path,
                            });
                        }
                    }
                    "usemtl" => {
                        let name = tokens.next().ok_or(MeshError::Malformed {
                            directive: "usemtl",
                            path: path.to_path_buf(),
                            line: line_no,
                        })?;
                        current_material =
                            *name_to_index.get(name).ok_or(MeshError::UnknownMaterial {
                                name: name.to_string(),
                                path: path.to_path_buf(),
                                line: line_no,
                            })?;
                    }
                    "v" => {
                        let position = parse_vec3(&mut tokens).ok_or(MeshError::Malformed {
                            directive: "v",
                            path: path.to_path_buf(),
                            line: line_no,
                        })?;
                        declared.push(position);
                    }
                    "f" => {
                        let mut face = Vec::new();
                        for raw in tokens.by_ref() {
                            match raw.parse::<i64>() {
                                Ok(index) => face.push(index),
                                Err(_) => break,
                            }
                        }
                        emit_face(&mut mesh, &declared, &face, current_material, path, line_no)?;
                    }
                    _ => break,
                }
            }
        }

        Ok(mesh)
    }
}

fn parse_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<glm::Vec3> {
    let x = tokens.next()?.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    let z = tokens.next()?.parse().ok()?;
    Some(glm::vec3(x, y, z))
}

/// 1-based indices; negative values count back from the most recently
/// declared vertex.
fn resolve_index(index: i64, declared: usize) -> Option<usize> {
    let resolved = if index < 0 {
        declared as i64 + index
    } else {
        index - 1
    };
    if (0..declared as i64).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

fn emit_face(
    mesh: &mut Mesh,
    declared: &[glm::Vec3],
    face: &[i64],
    material: u32,
    path: &Path,
    line: usize,
) -> Result<(), MeshError> {
    let mut resolved = Vec::with_capacity(face.len());
    for index in face {
        resolved.push(resolve_index(*index, declared.len()).ok_or(
            MeshError::IndexOutOfRange {
                index: *index,
                path: path.to_path_buf(),
                line,
            },
        )?);
    }

    match resolved.len() {
        3 => emit_triangle(mesh, declared, [resolved[0], resolved[1], resolved[2]], material, path)?,
        4 => {
            // Quads split on the (1,3) diagonal.
            emit_triangle(mesh, declared, [resolved[0], resolved[1], resolved[2]], material, path)?;
            emit_triangle(mesh, declared, [resolved[0], resolved[2], resolved[3]], material, path)?;
        }
        count => {
            return Err(MeshError::UnsupportedFace {
                count,
                path: path.to_path_buf(),
                line,
            })
        }
    }
    Ok(())
}

fn emit_triangle(
    mesh: &mut Mesh,
    declared: &[glm::Vec3],
    corners: [usize; 3],
    material: u32,
    path: &Path,
) -> Result<(), MeshError> {
    let base = mesh.positions.len();
    if base + 3 > u16::MAX as usize + 1 {
        return Err(MeshError::TooManyVertices {
            path: path.to_path_buf(),
        });
    }

    let [a, b, c] = [declared[corners[0]], declared[corners[1]], declared[corners[2]]];
    let normal = glm::normalize(&glm::cross(&(b - a), &(c - a)));

    for position in [a, b, c] {
        mesh.positions.push(position);
        mesh.normals.push(normal);
        mesh.material_indices.push(material);
    }
    for offset in 0..3u16 {
        mesh.indices.push(base as u16 + offset);
    }
    Ok(())
}

fn load_material_file(
    path: &Path,
    name_to_index: &mut HashMap<String, u32>,
) -> Result<Vec<Material>, MeshError> {
    let text = fs::read_to_string(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut materials: Vec<Material> = Vec::new();
    name_to_index.clear();

    for (line_index, line) in text.lines().enumerate() {
        let line_no = line_index + 1;
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.starts_with('#') {
                break;
            }
            match token {
                "newmtl" => {
                    let name = tokens.next().ok_or(MeshError::Malformed {
                        directive: "newmtl",
                        path: path.to_path_buf(),
                        line: line_no,
                    })?;
                    name_to_index.insert(name.to_string(), materials.len() as u32);
                    materials.push(Material {
                        ambient: glm::vec3(0.0, 0.0, 0.0),
                        diffuse: glm::vec3(0.0, 0.0, 0.0),
                    });
                }
                "Ka" => {
                    let color = parse_vec3(&mut tokens).ok_or(MeshError::Malformed {
                        directive: "Ka",
                        path: path.to_path_buf(),
                        line: line_no,
                    })?;
                    if let Some(material) = materials.last_mut() {
                        material.ambient = color;
                    }
                }
                "Kd" => {
                    let color = parse_vec3(&mut tokens).ok_or(MeshError::Malformed {
                        directive: "Kd",
                        path: path.to_path_buf(),
                        line: line_no,
                    })?;
                    if let Some(material) = materials.last_mut() {
                        material.diffuse = color;
                    }
                }
                _ => break,
            }
        }
    }

    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("shadowbox-{}-{}", name, std::process::id()));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.0.join(name);
            let mut file = File::create(&path).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
            path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn triangles_unroll_into_per_face_vertices() {
        let dir = TempDir::new("triangles");
        let path = dir.write(
            "two.obj",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\nf 1 3 4\n",
        );
        let mesh = Mesh::load(path).unwrap();

        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.normals.len(), 6);
        assert_eq!(mesh.material_indices.len(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(mesh.indices.iter().all(|i| (*i as usize) < mesh.positions.len()));
    }

    #[test]
    fn quads_split_on_the_first_third_diagonal() {
        let dir = TempDir::new("quads");
        let path = dir.write(
            "quad.obj",
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        );
        let mesh = Mesh::load(path).unwrap();

        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        let expected = [
            glm::vec3(0.0, 0.0, 0.0),
            glm::vec3(1.0, 0.0, 0.0),
            glm::vec3(1.0, 1.0, 0.0),
            glm::vec3(0.0, 0.0, 0.0),
            glm::vec3(1.0, 1.0, 0.0),
            glm::vec3(0.0, 1.0, 0.0),
        ];
        assert_eq!(mesh.positions, expected);
    }

    #[test]
    fn negative_indices_count_back_from_the_last_vertex() {
        let dir = TempDir::new("negative");
        let path = dir.write(
            "neg.obj",
            "v 1 0 0\nv 2 0 0\nv 3 0 0\nv 4 0 0\nv 5 0 0\nf -1 -2 -3\n",
        );
        let mesh = Mesh::load(path).unwrap();

        assert_eq!(mesh.positions[0], glm::vec3(5.0, 0.0, 0.0));
        assert_eq!(mesh.positions[1], glm::vec3(4.0, 0.0, 0.0));
        assert_eq!(mesh.positions[2], glm::vec3(3.0, 0.0, 0.0));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let dir = TempDir::new("range");
        let path = dir.write("bad.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n");
        assert!(matches!(
            Mesh::load(path),
            Err(MeshError::IndexOutOfRange { index: 4, .. })
        ));

        let path = dir.write("zero.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n");
        assert!(matches!(
            Mesh::load(path),
            Err(MeshError::IndexOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn normals_are_flat_per_face() {
        let dir = TempDir::new("normals");
        let path = dir.write("tri.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        let mesh = Mesh::load(path).unwrap();

        for normal in &mesh.normals {
            assert_eq!(*normal, glm::vec3(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn faces_beyond_quads_are_rejected() {
        let dir = TempDir::new("pentagon");
        let path = dir.write(
            "pent.obj",
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0.5 1.5 0\nv 0 1 0\nf 1 2 3 4 5\n",
        );
        assert!(matches!(
            Mesh::load(path),
            Err(MeshError::UnsupportedFace { count: 5, .. })
        ));
    }

    #[test]
    fn materials_route_through_usemtl() {
        let dir = TempDir::new("materials");
        dir.write(
            "box.mtl",
            "newmtl red\nKa 0.1 0 0\nKd 1 0 0\nnewmtl green\nKa 0 0.1 0\nKd 0 1 0\n",
        );
        let path = dir.write(
            "box.obj",
            "mtllib box.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl green\nf 1 2 3\nusemtl red\nf 1 2 3\n",
        );
        let mesh = Mesh::load(path).unwrap();

        assert_eq!(mesh.materials.len(), 2);
        assert_eq!(mesh.materials[0].diffuse, glm::vec3(1.0, 0.0, 0.0));
        assert_eq!(mesh.materials[1].ambient, glm::vec3(0.0, 0.1, 0.0));
        assert_eq!(&mesh.material_indices[..3], &[1, 1, 1]);
        assert_eq!(&mesh.material_indices[3..], &[0, 0, 0]);
    }

    #[test]
    fn unknown_material_references_fail() {
        let dir = TempDir::new("unknown-material");
        dir.write("box.mtl", "newmtl red\nKd 1 0 0\n");
        let path = dir.write(
            "box.obj",
            "mtllib box.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl blue\nf 1 2 3\n",
        );
        assert!(matches!(
            Mesh::load(path),
            Err(MeshError::UnknownMaterial { .. })
        ));
    }

    #[test]
    fn material_ceiling_is_enforced_at_load_time() {
        let dir = TempDir::new("material-ceiling");

        let full: String = (0..MAX_MATERIALS)
            .map(|i| format!("newmtl m{}\nKd 1 1 1\n", i))
            .collect();
        dir.write("full.mtl", &full);
        let path = dir.write("full.obj", "mtllib full.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        let mesh = Mesh::load(path).unwrap();
        assert_eq!(mesh.materials.len(), MAX_MATERIALS);

        let overflowing: String = (0..MAX_MATERIALS + 1)
            .map(|i| format!("newmtl m{}\nKd 1 1 1\n", i))
            .collect();
        dir.write("over.mtl", &overflowing);
        let path = dir.write("over.obj", "mtllib over.mtl\nv 0 0 0\n");
        assert!(matches!(
            Mesh::load(path),
            Err(MeshError::TooManyMaterials { count, .. }) if count == MAX_MATERIALS + 1
        ));
    }

    #[test]
    fn comments_end_the_line() {
        let dir = TempDir::new("comments");
        let path = dir.write(
            "c.obj",
            "# a cornell box\nv 0 0 0 # origin\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        );
        let mesh = Mesh::load(path).unwrap();
        assert_eq!(mesh.positions.len(), 3);
    }

    #[test]
    fn missing_file_reports_io_error() {
        assert!(matches!(
            Mesh::load("does-not-exist.obj"),
            Err(MeshError::Io { .. })
        ));
    }
}
