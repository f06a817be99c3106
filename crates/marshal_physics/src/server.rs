//! The physics server operation surface.

use marshal_core::{Rid, Server};

use crate::math::{Transform2D, Vec2};
use crate::types::{AreaParam, AreaParamKind, BodyMode, BodyState, BodyStateKind, ShapeData, ShapeKind};

/// A single-threaded physics server.
///
/// Resources are addressed by [`Rid`]. Operations on an unknown or stale
/// handle are ignored (getters return a neutral value); they never panic.
///
/// `PhysicsServerProxy` implements this trait as well, so a threaded
/// server can be passed wherever a plain one is expected.
pub trait PhysicsServer: Server {
    // Shapes

    /// Creates a shape of `kind` with no geometry.
    fn shape_create(&mut self, kind: ShapeKind) -> Rid;

    /// Replaces the geometry of `shape`.
    ///
    /// Geometry of a different kind than the shape's is rejected.
    fn shape_set_data(&mut self, shape: Rid, data: ShapeData);

    /// Kind of `shape`.
    fn shape_get_kind(&self, shape: Rid) -> Option<ShapeKind>;

    // Spaces

    /// Creates an inactive space with a default gravity area.
    fn space_create(&mut self) -> Rid;

    /// Activates or deactivates `space`. Inactive spaces are not stepped.
    fn space_set_active(&mut self, space: Rid, active: bool);

    /// Returns true if `space` is active.
    fn space_is_active(&self, space: Rid) -> bool;

    /// Bodies in `space` with a solid shape containing `point`.
    fn space_intersect_point(&self, space: Rid, point: Vec2) -> Vec<Rid>;

    // Areas

    /// Creates an area outside any space.
    fn area_create(&mut self) -> Rid;

    /// Moves `area` into `space`; `Rid::NULL` removes it.
    fn area_set_space(&mut self, area: Rid, space: Rid);

    /// Sets one parameter of `area`.
    ///
    /// A space handle addresses that space's default area.
    fn area_set_param(&mut self, area: Rid, param: AreaParam);

    /// Reads one parameter of `area` (or of a space's default area).
    fn area_get_param(&self, area: Rid, kind: AreaParamKind) -> Option<AreaParam>;

    // Bodies

    /// Creates a rigid body outside any space.
    fn body_create(&mut self) -> Rid;

    /// Moves `body` into `space`; `Rid::NULL` removes it.
    fn body_set_space(&mut self, body: Rid, space: Rid);

    /// Attaches `shape` to `body` at `transform` (body space).
    fn body_add_shape(&mut self, body: Rid, shape: Rid, transform: Transform2D);

    /// Number of shapes attached to `body`.
    fn body_get_shape_count(&self, body: Rid) -> usize;

    /// Changes how `body` is simulated.
    fn body_set_mode(&mut self, body: Rid, mode: BodyMode);

    /// Current mode of `body`.
    fn body_get_mode(&self, body: Rid) -> Option<BodyMode>;

    /// Writes one piece of body state.
    fn body_set_state(&mut self, body: Rid, state: BodyState);

    /// Reads one piece of body state.
    fn body_get_state(&self, body: Rid, kind: BodyStateKind) -> Option<BodyState>;

    // Server

    /// Pauses or resumes the whole server. A paused server ignores `step`.
    fn set_active(&mut self, active: bool);

    /// Destroys any resource.
    fn free(&mut self, rid: Rid);
}
