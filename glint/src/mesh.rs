// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wavefront OBJ loading.
//!
//! The loader flattens the indexed file into per-corner attribute streams:
//! one homogeneous position and one normal per face corner, faces
//! triangulated fan-wise. That is the layout the vertex stage consumes: a
//! triangle list with no index buffer.

use std::path::Path;

use crate::math::{Vec3, Vec4};
use crate::{Error, Result};

/// A triangle mesh as flattened attribute streams of equal length.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub attr_vertex: Vec<Vec4>,
    pub attr_normal: Vec<Vec3>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.attr_vertex.len()
    }

    /// The smallest axis-aligned bound on `|x|, |y|, |z|` over all vertices.
    pub fn max_extent(&self) -> f32 {
        let mut max = 0.0f32;
        for v in &self.attr_vertex {
            let v = v.dehomogenized();
            for i in 0..3 {
                max = max.max(v[i].abs());
            }
        }
        max
    }
}

pub fn load_obj(path: impl AsRef<Path>) -> Result<Mesh> {
    let src = std::fs::read_to_string(path).map_err(|e| Error::MeshParse {
        line: 0,
        msg: e.to_string(),
    })?;
    parse_obj(&src)
}

pub fn parse_obj(src: &str) -> Result<Mesh> {
    let mut positions: Vec<Vec4> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut mesh = Mesh::default();

    for (line_index, line) in src.lines().enumerate() {
        let line_no = line_index + 1;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let c = parse_floats(&mut fields, line_no)?;
                if c.len() < 3 {
                    return Err(malformed(line_no, "vertex needs at least 3 coordinates"));
                }
                let w = c.get(3).copied().unwrap_or(1.0);
                positions.push(Vec4::new(c[0], c[1], c[2], w));
            }
            Some("vn") => {
                let c = parse_floats(&mut fields, line_no)?;
                if c.len() < 3 {
                    return Err(malformed(line_no, "normal needs 3 coordinates"));
                }
                normals.push(Vec3::new(c[0], c[1], c[2]));
            }
            Some("f") => {
                let corners = fields
                    .map(|f| parse_corner(f, positions.len(), normals.len(), line_no))
                    .collect::<Result<Vec<_>>>()?;
                if corners.len() < 3 {
                    return Err(malformed(line_no, "face needs at least 3 corners"));
                }
                for i in 1..corners.len() - 1 {
                    let tri = [corners[0], corners[i], corners[i + 1]];
                    let face_normal = face_normal(&positions, &tri);
                    for (vi, ni) in tri {
                        mesh.attr_vertex.push(positions[vi]);
                        mesh.attr_normal.push(match ni {
                            Some(n) => normals[n],
                            None => face_normal,
                        });
                    }
                }
            }
            // Groups, materials, uvs and comments are irrelevant here.
            _ => {}
        }
    }
    Ok(mesh)
}

fn malformed(line: usize, msg: &str) -> Error {
    Error::MeshParse {
        line,
        msg: msg.to_string(),
    }
}

fn parse_floats<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Vec<f32>> {
    fields
        .map(|f| {
            f.parse::<f32>()
                .map_err(|_| malformed(line, "malformed number"))
        })
        .collect()
}

/// Parses `v`, `v/vt`, `v//vn` or `v/vt/vn`; indices are 1-based, negative
/// counts from the end.
fn parse_corner(
    field: &str,
    n_positions: usize,
    n_normals: usize,
    line: usize,
) -> Result<(usize, Option<usize>)> {
    let mut parts = field.split('/');
    let v = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| malformed(line, "face corner lacks a vertex index"))?;
    let _vt = parts.next();
    let vn = parts.next().filter(|p| !p.is_empty());

    let vi = resolve_index(v, n_positions, line)?;
    let ni = match vn {
        Some(vn) => Some(resolve_index(vn, n_normals, line)?),
        None => None,
    };
    Ok((vi, ni))
}

fn resolve_index(field: &str, len: usize, line: usize) -> Result<usize> {
    let raw = field
        .parse::<i64>()
        .map_err(|_| malformed(line, "malformed index"))?;
    let index = if raw < 0 {
        len as i64 + raw
    } else {
        raw - 1
    };
    if index < 0 || index as usize >= len {
        return Err(malformed(line, "index out of range"));
    }
    Ok(index as usize)
}

fn face_normal(positions: &[Vec4], tri: &[(usize, Option<usize>)]) -> Vec3 {
    let a = positions[tri[0].0].dehomogenized().xyz();
    let b = positions[tri[1].0].dehomogenized().xyz();
    let c = positions[tri[2].0].dehomogenized().xyz();
    let u = b - a;
    let v = c - a;
    let n = Vec3::new(
        u.y * v.z - u.z * v.y,
        u.z * v.x - u.x * v.z,
        u.x * v.y - u.y * v.x,
    );
    if n.length() > 0.0 {
        n.normalized()
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# a unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn quad_fans_into_two_triangles() {
        let mesh = parse_obj(QUAD).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.attr_normal.len(), 6);
        assert_eq!(mesh.attr_vertex[0], Vec4::point(0.0, 0.0, 0.0));
        assert_eq!(mesh.attr_vertex[3], Vec4::point(0.0, 0.0, 0.0));
        assert_eq!(mesh.attr_vertex[5], Vec4::point(0.0, 1.0, 0.0));
        for n in &mesh.attr_normal {
            assert_eq!(*n, Vec3::new(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn missing_normals_fall_back_to_face_normal() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.attr_normal[0], Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.attr_vertex[2], Vec4::point(0.0, 1.0, 0.0));
    }

    #[test]
    fn bad_index_is_reported_with_its_line() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        match err {
            crate::Error::MeshParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
