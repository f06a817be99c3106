//! 2D math types used by the physics surface.

/// 2D Vector - positions, velocities, directions
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2 {
    /// Creates a new Vec2
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Screen-space down (positive Y)
    pub const DOWN: Self = Self::new(0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z of the 3D cross)
    #[must_use]
    pub fn cross(self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Rotates by `angle` radians
    #[must_use]
    pub fn rotated(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Distance from this point to the segment `a..b`
    #[must_use]
    pub fn distance_to_segment(self, a: Self, b: Self) -> f32 {
        let ab = b - a;
        let len_sq = ab.length_squared();
        if len_sq <= f32::EPSILON {
            return (self - a).length();
        }
        let t = ((self - a).dot(ab) / len_sq).clamp(0.0, 1.0);
        (self - (a + ab * t)).length()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Transform - origin + rotation (radians)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform2D {
    /// Translation
    pub origin: Vec2,
    /// Rotation in radians
    pub rotation: f32,
}

impl Transform2D {
    /// Creates a new transform
    #[must_use]
    pub const fn new(origin: Vec2, rotation: f32) -> Self {
        Self { origin, rotation }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec2::ZERO, 0.0);

    /// Pure translation
    #[must_use]
    pub const fn from_origin(origin: Vec2) -> Self {
        Self::new(origin, 0.0)
    }

    /// Local point to parent space
    #[must_use]
    pub fn xform(self, point: Vec2) -> Vec2 {
        point.rotated(self.rotation) + self.origin
    }

    /// Parent point to local space
    #[must_use]
    pub fn inverse_xform(self, point: Vec2) -> Vec2 {
        (point - self.origin).rotated(-self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_vec2_operations() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, 4.0);

        let sum = a + b;
        assert_eq!(sum, Vec2::new(4.0, 6.0));
        assert_eq!(a.dot(b), 11.0); // 1*3 + 2*4
        assert_eq!(a.cross(b), -2.0); // 1*4 - 2*3
        assert_eq!(Vec2::new(3.0, 4.0).length(), 5.0);
    }

    #[test]
    fn test_segment_distance_clamps_to_ends() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(Vec2::new(5.0, 3.0).distance_to_segment(a, b), 3.0);
        assert_eq!(Vec2::new(-4.0, 3.0).distance_to_segment(a, b), 5.0);
        assert_eq!(Vec2::new(2.0, 0.0).distance_to_segment(a, a), 2.0);
    }

    #[test]
    fn test_transform_round_trip() {
        let xf = Transform2D::new(Vec2::new(10.0, -5.0), std::f32::consts::FRAC_PI_2);
        let local = Vec2::new(1.0, 0.0);

        let world = xf.xform(local);
        assert!(close(world, Vec2::new(10.0, -4.0)));
        assert!(close(xf.inverse_xform(world), local));
        assert_eq!(Transform2D::IDENTITY.xform(local), local);
    }
}
