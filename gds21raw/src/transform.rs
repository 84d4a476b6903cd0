//!
//! # Instance Placement Transforms
//!

/// # Matrix-Vector Transformation
///
/// Maps coordinates of an instantiated cell into those of its parent.
/// Composed of a 2x2 matrix `a` (reflection, magnification, rotation) and a translation `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation / Transformation Matrix, in row-major order
    pub a: [[f64; 2]; 2],
    /// X-Y Translation
    pub b: [f64; 2],
}
impl Transform {
    /// The identity transform
    pub fn identity() -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [0., 0.],
        }
    }
    /// Translation by (x,y)
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [x, y],
        }
    }
    /// Transform for a GDSII instance at (x,y).
    ///
    /// GDSII applies reflection about the x-axis first,
    /// then magnification and counter-clockwise rotation by `angle` degrees, then translation.
    pub fn placement(x: f64, y: f64, reflected: bool, angle: f64, mag: f64) -> Self {
        let (sin, cos) = angle.to_radians().sin_cos();
        let rot = [[cos * mag, -sin * mag], [sin * mag, cos * mag]];
        let refl = if reflected {
            [[1., 0.], [0., -1.]]
        } else {
            [[1., 0.], [0., 1.]]
        };
        Self {
            a: matmul(&rot, &refl),
            b: [x, y],
        }
    }
    /// Create a new [Transform] that is the cascade of `parent` and `child`.
    /// Not commutative: `child` is applied first.
    pub fn cascade(parent: &Transform, child: &Transform) -> Transform {
        let mut b = matvec(&parent.a, &child.b);
        b[0] += parent.b[0];
        b[1] += parent.b[1];
        Self {
            a: matmul(&parent.a, &child.a),
            b,
        }
    }
    /// Apply to integer point (x,y), rounding the result to the nearest integer
    pub fn apply(&self, x: i32, y: i32) -> (f64, f64) {
        let (xf, yf) = (f64::from(x), f64::from(y));
        let xt = self.a[0][0] * xf + self.a[0][1] * yf + self.b[0];
        let yt = self.a[1][0] * xf + self.a[1][1] * yf + self.b[1];
        (xt.round(), yt.round())
    }
}
impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Multiply 2x2 matrices
fn matmul(a: &[[f64; 2]; 2], b: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}
/// Multiply a 2x2 matrix by a 2-vector
fn matvec(a: &[[f64; 2]; 2], b: &[f64; 2]) -> [f64; 2] {
    [
        a[0][0] * b[0] + a[0][1] * b[1],
        a[1][0] * b[0] + a[1][1] * b[1],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_translate() {
        assert_eq!(Transform::identity().apply(3, -4), (3., -4.));
        assert_eq!(Transform::translate(10., 20.).apply(3, -4), (13., 16.));
    }
    #[test]
    fn rotations() {
        let r90 = Transform::placement(0., 0., false, 90., 1.);
        assert_eq!(r90.apply(10, 0), (0., 10.));
        let r180 = Transform::placement(0., 0., false, 180., 1.);
        assert_eq!(r180.apply(10, 20), (-10., -20.));
    }
    #[test]
    fn reflect_then_rotate() {
        // Reflect (1,2) to (1,-2), then rotate 90 degrees to (2,1)
        let t = Transform::placement(0., 0., true, 90., 1.);
        assert_eq!(t.apply(1, 2), (2., 1.));
    }
    #[test]
    fn magnify_and_cascade() {
        let parent = Transform::placement(100., 0., false, 90., 1.);
        let child = Transform::placement(10., 0., false, 0., 2.);
        let both = Transform::cascade(&parent, &child);
        // Child maps (1,1) to (12,2); parent rotates to (-2,12) and shifts to (98,12)
        assert_eq!(both.apply(1, 1), (98., 12.));
    }
}
