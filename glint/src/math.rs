// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small fixed-function linear algebra: column vectors and row-major 4×4
//! matrices, plus the transform constructors consumed by the rasterizer
//! demos. Composition is left-to-right multiplication: the outermost
//! transform is the leftmost factor.

use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub};

/// A 3-component column vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A 4-component homogeneous column vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalized(self) -> Self {
        self / self.length()
    }
}

impl Vec4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// A point at `(x, y, z)` with `w = 1`.
    pub const fn point(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, w: 1.0 }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    pub fn xyz(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Perspective divide; the result has `w = 1`.
    pub fn dehomogenized(self) -> Vec4 {
        Vec4::new(self.x / self.w, self.y / self.w, self.z / self.w, 1.0)
    }
}

macro_rules! vec_ops {
    ($ty:ident { $($f:ident),+ }) => {
        impl Add for $ty {
            type Output = $ty;
            fn add(self, rhs: $ty) -> $ty {
                $ty { $($f: self.$f + rhs.$f),+ }
            }
        }
        impl Sub for $ty {
            type Output = $ty;
            fn sub(self, rhs: $ty) -> $ty {
                $ty { $($f: self.$f - rhs.$f),+ }
            }
        }
        impl Neg for $ty {
            type Output = $ty;
            fn neg(self) -> $ty {
                $ty { $($f: -self.$f),+ }
            }
        }
        impl Mul<f32> for $ty {
            type Output = $ty;
            fn mul(self, rhs: f32) -> $ty {
                $ty { $($f: self.$f * rhs),+ }
            }
        }
        impl Div<f32> for $ty {
            type Output = $ty;
            fn div(self, rhs: f32) -> $ty {
                $ty { $($f: self.$f / rhs),+ }
            }
        }
        impl AddAssign for $ty {
            fn add_assign(&mut self, rhs: $ty) {
                *self = *self + rhs;
            }
        }
        impl MulAssign<f32> for $ty {
            fn mul_assign(&mut self, rhs: f32) {
                *self = *self * rhs;
            }
        }
        impl DivAssign<f32> for $ty {
            fn div_assign(&mut self, rhs: f32) {
                *self = *self / rhs;
            }
        }
    };
}

vec_ops!(Vec3 { x, y, z });
vec_ops!(Vec4 { x, y, z, w });

impl Index<usize> for Vec3 {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("component index {i} out of range for Vec3"),
        }
    }
}

impl Index<usize> for Vec4 {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.w,
            _ => panic!("component index {i} out of range for Vec4"),
        }
    }
}

impl IndexMut<usize> for Vec4 {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.w,
            _ => panic!("component index {i} out of range for Vec4"),
        }
    }
}

/// A row-major 4×4 matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat4 {
    rows: [[f32; 4]; 4],
}

impl Mat4 {
    pub const fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self { rows }
    }

    pub fn row(&self, i: usize) -> Vec4 {
        let r = self.rows[i];
        Vec4::new(r[0], r[1], r[2], r[3])
    }

    pub fn col(&self, j: usize) -> Vec4 {
        Vec4::new(
            self.rows[0][j],
            self.rows[1][j],
            self.rows[2][j],
            self.rows[3][j],
        )
    }
}

impl Index<(usize, usize)> for Mat4 {
    type Output = f32;
    fn index(&self, (i, j): (usize, usize)) -> &f32 {
        &self.rows[i][j]
    }
}

impl IndexMut<(usize, usize)> for Mat4 {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f32 {
        &mut self.rows[i][j]
    }
}

impl Mul for Mat4 {
    type Output = Mat4;
    fn mul(self, rhs: Mat4) -> Mat4 {
        let mut out = Mat4::default();
        for i in 0..4 {
            for j in 0..4 {
                out.rows[i][j] = self.row(i).dot(rhs.col(j));
            }
        }
        out
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;
    fn mul(self, v: Vec4) -> Vec4 {
        Vec4::new(
            self.row(0).dot(v),
            self.row(1).dot(v),
            self.row(2).dot(v),
            self.row(3).dot(v),
        )
    }
}

impl MulAssign for Mat4 {
    fn mul_assign(&mut self, rhs: Mat4) {
        *self = *self * rhs;
    }
}

/// Fixed-function transform constructors.
pub mod transform {
    use super::{Mat4, Vec4};

    /// A principal plane of rotation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Plane {
        /// Rotation within the x-y plane (about the z axis).
        XOY,
        /// Rotation within the y-z plane (about the x axis).
        YOZ,
        /// Rotation within the z-x plane (about the y axis).
        ZOX,
    }

    pub fn diagonal(d: Vec4) -> Mat4 {
        Mat4::from_rows([
            [d.x, 0.0, 0.0, 0.0],
            [0.0, d.y, 0.0, 0.0],
            [0.0, 0.0, d.z, 0.0],
            [0.0, 0.0, 0.0, d.w],
        ])
    }

    pub fn identity() -> Mat4 {
        diagonal(Vec4::new(1.0, 1.0, 1.0, 1.0))
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Mat4 {
        diagonal(Vec4::new(x, y, z, 1.0))
    }

    /// Translation by a homogeneous vector; `t.w` scales uniformly.
    pub fn translate(t: Vec4) -> Mat4 {
        Mat4::from_rows([
            [t.w, 0.0, 0.0, t.x],
            [0.0, t.w, 0.0, t.y],
            [0.0, 0.0, t.w, t.z],
            [0.0, 0.0, 0.0, t.w],
        ])
    }

    pub fn rotate(a: f32, p: Plane) -> Mat4 {
        let (s, c) = a.sin_cos();
        match p {
            Plane::XOY => Mat4::from_rows([
                [c, -s, 0.0, 0.0],
                [s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            Plane::YOZ => Mat4::from_rows([
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            Plane::ZOX => Mat4::from_rows([
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
        }
    }

    /// Perspective projection. `fov` is the half field of view in radians,
    /// `aspect` the width/height ratio.
    pub fn perspective(fov: f32, aspect: f32, znear: f32, zfar: f32) -> Mat4 {
        let f = 1.0 / fov.tan();
        let c = znear - zfar;
        Mat4::from_rows([
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, (znear + zfar) / c, 2.0 * znear * zfar / c],
            [0.0, 0.0, -1.0, 0.0],
        ])
    }

    pub fn orthographic(l: f32, r: f32, t: f32, b: f32, n: f32, f: f32) -> Mat4 {
        let (r_l, t_b, f_n) = (r - l, t - b, f - n);
        Mat4::from_rows([
            [2.0 / r_l, 0.0, 0.0, -(r + l) / r_l],
            [0.0, 2.0 / t_b, 0.0, -(t + b) / t_b],
            [0.0, 0.0, 2.0 / f_n, -(f + n) / f_n],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::transform::{self, Plane};
    use super::*;

    fn assert_vec4_near(a: Vec4, b: Vec4) {
        for i in 0..4 {
            assert!((a[i] - b[i]).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn identity_is_neutral() {
        let v = Vec4::new(1.0, -2.0, 3.5, 1.0);
        assert_vec4_near(transform::identity() * v, v);
    }

    #[test]
    fn translate_moves_points() {
        let m = transform::translate(Vec4::point(1.0, 2.0, 3.0));
        let v = m * Vec4::point(0.0, 0.0, 0.0);
        assert_vec4_near(v, Vec4::point(1.0, 2.0, 3.0));
    }

    #[test]
    fn rotate_quarter_turns() {
        let m = transform::rotate(std::f32::consts::FRAC_PI_2, Plane::XOY);
        let v = m * Vec4::point(0.0, 1.0, 0.0);
        assert_vec4_near(v, Vec4::point(-1.0, 0.0, 0.0));

        let m = transform::rotate(std::f32::consts::FRAC_PI_2, Plane::ZOX);
        let v = m * Vec4::point(1.0, 0.0, 0.0);
        assert_vec4_near(v, Vec4::point(0.0, 0.0, 1.0));
    }

    #[test]
    fn composition_is_left_to_right() {
        let rot = transform::rotate(0.3, Plane::YOZ);
        let trans = transform::translate(Vec4::point(0.0, 0.0, -3.0));
        let v = Vec4::point(0.4, -0.2, 0.9);
        let composed = trans * rot;
        assert_vec4_near(composed * v, trans * (rot * v));
    }

    #[test]
    fn perspective_maps_znear_to_minus_one() {
        let m = transform::perspective(std::f32::consts::FRAC_PI_4, 1.0, 1.0, 10.0);
        let v = (m * Vec4::point(0.0, 0.0, -1.0)).dehomogenized();
        assert!((v.z + 1.0).abs() < 1e-5);
        let v = (m * Vec4::point(0.0, 0.0, -10.0)).dehomogenized();
        assert!((v.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rows_round_trip() {
        let m = transform::perspective(0.7, 1.5, 1.0, 100.0);
        for i in 0..4 {
            let r = m.row(i);
            for j in 0..4 {
                assert_eq!(r[j], m[(i, j)]);
            }
        }
    }
}
