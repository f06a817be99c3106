//! Value types of the physics surface.
//!
//! Everything here is plain data: cheap to copy or move into a command
//! record and safe to send to the server thread.

use crate::math::{Transform2D, Vec2};

// ============================================================================
// SHAPES
// ============================================================================

/// The kind of a collision shape, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Infinite half-plane.
    Line,
    /// Ray cast from the origin along +Y.
    Ray,
    /// Line segment.
    Segment,
    /// Circle around the origin.
    Circle,
    /// Axis-aligned box around the origin.
    Rectangle,
    /// Vertical capsule around the origin.
    Capsule,
    /// Convex polygon.
    ConvexPolygon,
    /// Polygon soup of segments; hollow.
    ConcavePolygon,
}

impl ShapeKind {
    /// Every shape kind, in pool release order.
    pub const ALL: [Self; 8] = [
        Self::Line,
        Self::Ray,
        Self::Segment,
        Self::Circle,
        Self::Rectangle,
        Self::Capsule,
        Self::ConvexPolygon,
        Self::ConcavePolygon,
    ];
}

/// Geometry of a shape.
///
/// A freshly created shape has no geometry until `shape_set_data`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ShapeData {
    /// Not configured yet.
    #[default]
    Empty,
    /// Points with `normal · p <= distance` are inside.
    Line {
        /// Outward normal.
        normal: Vec2,
        /// Offset along the normal.
        distance: f32,
    },
    /// Ray length.
    Ray {
        /// Length along +Y.
        length: f32,
    },
    /// Segment endpoints.
    Segment {
        /// First endpoint.
        a: Vec2,
        /// Second endpoint.
        b: Vec2,
    },
    /// Circle radius.
    Circle {
        /// Radius.
        radius: f32,
    },
    /// Box half extents.
    Rectangle {
        /// Half width and half height.
        half_extents: Vec2,
    },
    /// Capsule radius and distance between cap centers.
    Capsule {
        /// Cap radius.
        radius: f32,
        /// Distance between cap centers.
        height: f32,
    },
    /// Convex polygon vertices, in winding order.
    ConvexPolygon(Vec<Vec2>),
    /// Segment pairs: `[a0, b0, a1, b1, ...]`.
    ConcavePolygon(Vec<Vec2>),
}

impl ShapeData {
    /// The kind this geometry belongs to, `None` when empty.
    #[must_use]
    pub const fn kind(&self) -> Option<ShapeKind> {
        match self {
            Self::Empty => None,
            Self::Line { .. } => Some(ShapeKind::Line),
            Self::Ray { .. } => Some(ShapeKind::Ray),
            Self::Segment { .. } => Some(ShapeKind::Segment),
            Self::Circle { .. } => Some(ShapeKind::Circle),
            Self::Rectangle { .. } => Some(ShapeKind::Rectangle),
            Self::Capsule { .. } => Some(ShapeKind::Capsule),
            Self::ConvexPolygon(_) => Some(ShapeKind::ConvexPolygon),
            Self::ConcavePolygon(_) => Some(ShapeKind::ConcavePolygon),
        }
    }

    /// Returns true if `point` (in shape space) lies inside.
    ///
    /// Rays, segments and concave soups have no interior and never
    /// contain a point.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        match self {
            Self::Empty | Self::Ray { .. } | Self::Segment { .. } | Self::ConcavePolygon(_) => false,
            Self::Line { normal, distance } => normal.dot(point) <= *distance,
            Self::Circle { radius } => point.length_squared() <= radius * radius,
            Self::Rectangle { half_extents } => {
                point.x.abs() <= half_extents.x && point.y.abs() <= half_extents.y
            }
            Self::Capsule { radius, height } => {
                let half = Vec2::new(0.0, height * 0.5);
                point.distance_to_segment(Vec2::ZERO - half, half) <= *radius
            }
            Self::ConvexPolygon(points) => convex_contains(points, point),
        }
    }
}

fn convex_contains(points: &[Vec2], point: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        let side = (b - *a).cross(point - *a);
        if side == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = side.signum();
        } else if side.signum() != sign {
            return false;
        }
    }
    true
}

// ============================================================================
// BODIES
// ============================================================================

/// How a body participates in the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyMode {
    /// Never moves.
    Static,
    /// Moved only by its velocity; ignores gravity.
    Kinematic,
    /// Fully simulated.
    #[default]
    Rigid,
    /// Simulated without rotation.
    Character,
}

/// Selects one piece of body state for `body_get_state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyStateKind {
    /// World transform.
    Transform,
    /// Linear velocity.
    LinearVelocity,
    /// Angular velocity.
    AngularVelocity,
    /// Sleeping flag.
    Sleeping,
    /// Whether the body may fall asleep.
    CanSleep,
}

/// One piece of body state, as written or read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BodyState {
    /// World transform.
    Transform(Transform2D),
    /// Linear velocity, units per second.
    LinearVelocity(Vec2),
    /// Angular velocity, radians per second.
    AngularVelocity(f32),
    /// Sleeping flag.
    Sleeping(bool),
    /// Whether the body may fall asleep.
    CanSleep(bool),
}

impl BodyState {
    /// The selector matching this value.
    #[must_use]
    pub const fn kind(&self) -> BodyStateKind {
        match self {
            Self::Transform(_) => BodyStateKind::Transform,
            Self::LinearVelocity(_) => BodyStateKind::LinearVelocity,
            Self::AngularVelocity(_) => BodyStateKind::AngularVelocity,
            Self::Sleeping(_) => BodyStateKind::Sleeping,
            Self::CanSleep(_) => BodyStateKind::CanSleep,
        }
    }
}

// ============================================================================
// AREAS
// ============================================================================

/// Selects one area parameter for `area_get_param`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AreaParamKind {
    /// Gravity strength.
    Gravity,
    /// Gravity direction.
    GravityVector,
    /// Linear damping.
    LinearDamp,
    /// Angular damping.
    AngularDamp,
}

/// One area parameter, as written or read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AreaParam {
    /// Gravity strength, units per second squared.
    Gravity(f32),
    /// Gravity direction (not normalized by the server).
    GravityVector(Vec2),
    /// Fraction of linear velocity lost per second.
    LinearDamp(f32),
    /// Fraction of angular velocity lost per second.
    AngularDamp(f32),
}

impl AreaParam {
    /// The selector matching this value.
    #[must_use]
    pub const fn kind(&self) -> AreaParamKind {
        match self {
            Self::Gravity(_) => AreaParamKind::Gravity,
            Self::GravityVector(_) => AreaParamKind::GravityVector,
            Self::LinearDamp(_) => AreaParamKind::LinearDamp,
            Self::AngularDamp(_) => AreaParamKind::AngularDamp,
        }
    }
}

// ============================================================================
// POOL CATEGORIES
// ============================================================================

/// Handle pool category: one per creatable resource kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    /// Shapes of one kind.
    Shape(ShapeKind),
    /// Spaces.
    Space,
    /// Areas.
    Area,
    /// Bodies.
    Body,
}

impl ResourceCategory {
    /// Every category in the fixed prefill and release order: shape kinds
    /// first, then spaces, areas and bodies.
    pub const ALL: [Self; 11] = [
        Self::Shape(ShapeKind::Line),
        Self::Shape(ShapeKind::Ray),
        Self::Shape(ShapeKind::Segment),
        Self::Shape(ShapeKind::Circle),
        Self::Shape(ShapeKind::Rectangle),
        Self::Shape(ShapeKind::Capsule),
        Self::Shape(ShapeKind::ConvexPolygon),
        Self::Shape(ShapeKind::ConcavePolygon),
        Self::Space,
        Self::Area,
        Self::Body,
    ];
}
