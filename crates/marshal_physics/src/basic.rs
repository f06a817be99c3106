//! # Basic Physics Server
//!
//! A small, deterministic backend: gravity integration and point queries
//! over one handle namespace. No collision response.
//!
//! ## Step
//!
//! ```text
//! for each active space:      read its default area (gravity, damping)
//! for each body in that space:
//!     Static     -> untouched
//!     Kinematic  -> position += v * dt
//!     Rigid      -> v += g * dt, damp, position += v * dt, rotate
//!     Character  -> like Rigid, without rotation
//! ```

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use marshal_core::{Rid, RidOwner, Server};

use crate::math::{Transform2D, Vec2};
use crate::server::PhysicsServer;
use crate::types::{
    AreaParam, AreaParamKind, BodyMode, BodyState, BodyStateKind, ShapeData, ShapeKind,
};

/// Default gravity strength of a new space.
pub const DEFAULT_GRAVITY: f32 = 98.0;

/// Default linear damping of a new space.
pub const DEFAULT_LINEAR_DAMP: f32 = 0.1;

/// Default angular damping of a new space.
pub const DEFAULT_ANGULAR_DAMP: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
struct AreaSettings {
    gravity: f32,
    gravity_vector: Vec2,
    linear_damp: f32,
    angular_damp: f32,
}

impl Default for AreaSettings {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            gravity_vector: Vec2::DOWN,
            linear_damp: DEFAULT_LINEAR_DAMP,
            angular_damp: DEFAULT_ANGULAR_DAMP,
        }
    }
}

impl AreaSettings {
    fn set(&mut self, param: AreaParam) {
        match param {
            AreaParam::Gravity(value) => self.gravity = value,
            AreaParam::GravityVector(value) => self.gravity_vector = value,
            AreaParam::LinearDamp(value) => self.linear_damp = value,
            AreaParam::AngularDamp(value) => self.angular_damp = value,
        }
    }

    fn get(&self, kind: AreaParamKind) -> AreaParam {
        match kind {
            AreaParamKind::Gravity => AreaParam::Gravity(self.gravity),
            AreaParamKind::GravityVector => AreaParam::GravityVector(self.gravity_vector),
            AreaParamKind::LinearDamp => AreaParam::LinearDamp(self.linear_damp),
            AreaParamKind::AngularDamp => AreaParam::AngularDamp(self.angular_damp),
        }
    }

    fn acceleration(&self) -> Vec2 {
        self.gravity_vector * self.gravity
    }
}

struct Shape {
    kind: ShapeKind,
    data: ShapeData,
}

struct Space {
    active: bool,
    default_area: AreaSettings,
}

struct Area {
    space: Rid,
    settings: AreaSettings,
}

struct Body {
    space: Rid,
    mode: BodyMode,
    shapes: Vec<(Rid, Transform2D)>,
    transform: Transform2D,
    linear_velocity: Vec2,
    angular_velocity: f32,
    sleeping: bool,
    can_sleep: bool,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            space: Rid::NULL,
            mode: BodyMode::Rigid,
            shapes: Vec::new(),
            transform: Transform2D::IDENTITY,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            sleeping: false,
            can_sleep: true,
        }
    }
}

impl Body {
    fn integrate(&mut self, settings: &AreaSettings, delta: f32) {
        match self.mode {
            BodyMode::Static => return,
            BodyMode::Kinematic => {}
            BodyMode::Rigid | BodyMode::Character => {
                self.linear_velocity += settings.acceleration() * delta;
                self.linear_velocity =
                    self.linear_velocity * (1.0 - settings.linear_damp * delta).max(0.0);
            }
        }

        self.transform.origin += self.linear_velocity * delta;

        if self.mode == BodyMode::Rigid {
            self.transform.rotation += self.angular_velocity * delta;
            self.angular_velocity *= (1.0 - settings.angular_damp * delta).max(0.0);
        }
    }
}

enum Resource {
    Shape(Shape),
    Space(Space),
    Area(Area),
    Body(Body),
}

/// Counters kept by [`BasicPhysicsServer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicStats {
    /// `step` calls that advanced the simulation.
    pub steps: u64,
    /// `sync` calls.
    pub syncs: u64,
    /// `flush_queries` calls.
    pub query_flushes: u64,
    /// Resources created.
    pub created: u64,
    /// Resources destroyed through `free`.
    pub freed: u64,
    /// Resources still alive when `finish` ran.
    pub live_at_finish: u64,
}

/// Minimal single-threaded physics backend.
///
/// Remembers every thread that mutated it, so callers can check that a
/// proxy kept it on one thread.
pub struct BasicPhysicsServer {
    resources: RidOwner<Resource>,
    active: bool,
    in_sync: bool,
    initialized: bool,
    stats: BasicStats,
    threads: Vec<ThreadId>,
}

impl BasicPhysicsServer {
    /// Creates an empty, uninitialized server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: RidOwner::with_capacity(256),
            active: true,
            in_sync: false,
            initialized: false,
            stats: BasicStats::default(),
            threads: Vec::new(),
        }
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> BasicStats {
        self.stats
    }

    /// Live resources of every kind.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Threads that have mutated this server, in first-touch order.
    #[must_use]
    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    /// Returns true between `sync` and `end_sync`.
    #[must_use]
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    fn touch(&mut self) {
        let id = thread::current().id();
        if !self.threads.contains(&id) {
            self.threads.push(id);
        }
    }

    fn create(&mut self, resource: Resource) -> Rid {
        self.touch();
        self.stats.created += 1;
        self.resources.make_rid(resource)
    }

    fn body(&self, rid: Rid) -> Option<&Body> {
        match self.resources.get(rid) {
            Some(Resource::Body(body)) => Some(body),
            _ => None,
        }
    }

    fn body_mut(&mut self, rid: Rid) -> Option<&mut Body> {
        self.touch();
        match self.resources.get_mut(rid) {
            Some(Resource::Body(body)) => Some(body),
            _ => {
                tracing::warn!(?rid, "not a body");
                None
            }
        }
    }

    fn shape(&self, rid: Rid) -> Option<&Shape> {
        match self.resources.get(rid) {
            Some(Resource::Shape(shape)) => Some(shape),
            _ => None,
        }
    }

    fn is_space(&self, rid: Rid) -> bool {
        matches!(self.resources.get(rid), Some(Resource::Space(_)))
    }

    /// `Rid::NULL` is a valid target meaning "no space".
    fn accepts_space(&self, space: Rid) -> bool {
        if space.is_null() || self.is_space(space) {
            return true;
        }
        tracing::warn!(?space, "not a space");
        false
    }

    /// Settings addressed by an area handle or a space handle.
    fn area_settings(&self, rid: Rid) -> Option<&AreaSettings> {
        match self.resources.get(rid)? {
            Resource::Area(area) => Some(&area.settings),
            Resource::Space(space) => Some(&space.default_area),
            _ => None,
        }
    }

    fn area_settings_mut(&mut self, rid: Rid) -> Option<&mut AreaSettings> {
        match self.resources.get_mut(rid)? {
            Resource::Area(area) => Some(&mut area.settings),
            Resource::Space(space) => Some(&mut space.default_area),
            _ => None,
        }
    }
}

impl Default for BasicPhysicsServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Server for BasicPhysicsServer {
    fn init(&mut self) {
        self.touch();
        self.initialized = true;
        tracing::debug!("basic physics server initialized");
    }

    fn finish(&mut self) {
        self.touch();
        self.stats.live_at_finish = self.resources.len() as u64;
        if self.stats.live_at_finish > 0 {
            tracing::debug!(live = self.stats.live_at_finish, "resources alive at finish");
        }
        self.resources = RidOwner::new();
        self.initialized = false;
    }

    fn step(&mut self, delta: f32) {
        self.touch();
        if !self.active || !self.initialized {
            return;
        }

        let spaces: HashMap<Rid, AreaSettings> = self
            .resources
            .iter()
            .filter_map(|(rid, resource)| match resource {
                Resource::Space(space) if space.active => Some((rid, space.default_area)),
                _ => None,
            })
            .collect();

        for (_, resource) in self.resources.iter_mut() {
            let Resource::Body(body) = resource else {
                continue;
            };
            if body.sleeping {
                continue;
            }
            if let Some(settings) = spaces.get(&body.space) {
                body.integrate(settings, delta);
            }
        }

        self.stats.steps += 1;
    }

    fn sync(&mut self) {
        self.touch();
        self.in_sync = true;
        self.stats.syncs += 1;
    }

    fn flush_queries(&mut self) {
        self.touch();
        self.stats.query_flushes += 1;
    }

    fn end_sync(&mut self) {
        self.touch();
        self.in_sync = false;
    }
}

impl PhysicsServer for BasicPhysicsServer {
    fn shape_create(&mut self, kind: ShapeKind) -> Rid {
        self.create(Resource::Shape(Shape {
            kind,
            data: ShapeData::Empty,
        }))
    }

    fn shape_set_data(&mut self, shape: Rid, data: ShapeData) {
        self.touch();
        let Some(Resource::Shape(target)) = self.resources.get_mut(shape) else {
            tracing::warn!(?shape, "not a shape");
            return;
        };
        match data.kind() {
            Some(kind) if kind != target.kind => {
                tracing::warn!(?shape, expected = ?target.kind, got = ?kind, "shape data of wrong kind");
            }
            _ => target.data = data,
        }
    }

    fn shape_get_kind(&self, shape: Rid) -> Option<ShapeKind> {
        self.shape(shape).map(|s| s.kind)
    }

    fn space_create(&mut self) -> Rid {
        self.create(Resource::Space(Space {
            active: false,
            default_area: AreaSettings::default(),
        }))
    }

    fn space_set_active(&mut self, space: Rid, active: bool) {
        self.touch();
        match self.resources.get_mut(space) {
            Some(Resource::Space(target)) => target.active = active,
            _ => tracing::warn!(?space, "not a space"),
        }
    }

    fn space_is_active(&self, space: Rid) -> bool {
        matches!(self.resources.get(space), Some(Resource::Space(s)) if s.active)
    }

    fn space_intersect_point(&self, space: Rid, point: Vec2) -> Vec<Rid> {
        if !self.is_space(space) {
            return Vec::new();
        }

        self.resources
            .iter()
            .filter_map(|(rid, resource)| match resource {
                Resource::Body(body) if body.space == space => Some((rid, body)),
                _ => None,
            })
            .filter(|(_, body)| {
                let local = body.transform.inverse_xform(point);
                body.shapes.iter().any(|(shape, offset)| {
                    self.shape(*shape)
                        .is_some_and(|s| s.data.contains(offset.inverse_xform(local)))
                })
            })
            .map(|(rid, _)| rid)
            .collect()
    }

    fn area_create(&mut self) -> Rid {
        self.create(Resource::Area(Area {
            space: Rid::NULL,
            settings: AreaSettings::default(),
        }))
    }

    fn area_set_space(&mut self, area: Rid, space: Rid) {
        self.touch();
        if !self.accepts_space(space) {
            return;
        }
        match self.resources.get_mut(area) {
            Some(Resource::Area(target)) => target.space = space,
            _ => tracing::warn!(?area, "not an area"),
        }
    }

    fn area_set_param(&mut self, area: Rid, param: AreaParam) {
        self.touch();
        match self.area_settings_mut(area) {
            Some(settings) => settings.set(param),
            None => tracing::warn!(?area, "not an area or space"),
        }
    }

    fn area_get_param(&self, area: Rid, kind: AreaParamKind) -> Option<AreaParam> {
        self.area_settings(area).map(|settings| settings.get(kind))
    }

    fn body_create(&mut self) -> Rid {
        self.create(Resource::Body(Body::default()))
    }

    fn body_set_space(&mut self, body: Rid, space: Rid) {
        if !self.accepts_space(space) {
            return;
        }
        if let Some(target) = self.body_mut(body) {
            target.space = space;
        }
    }

    fn body_add_shape(&mut self, body: Rid, shape: Rid, transform: Transform2D) {
        if self.shape(shape).is_none() {
            tracing::warn!(?shape, "not a shape");
            return;
        }
        if let Some(target) = self.body_mut(body) {
            target.shapes.push((shape, transform));
        }
    }

    fn body_get_shape_count(&self, body: Rid) -> usize {
        self.body(body).map_or(0, |b| b.shapes.len())
    }

    fn body_set_mode(&mut self, body: Rid, mode: BodyMode) {
        if let Some(target) = self.body_mut(body) {
            target.mode = mode;
            if mode == BodyMode::Static {
                target.linear_velocity = Vec2::ZERO;
                target.angular_velocity = 0.0;
            }
        }
    }

    fn body_get_mode(&self, body: Rid) -> Option<BodyMode> {
        self.body(body).map(|b| b.mode)
    }

    fn body_set_state(&mut self, body: Rid, state: BodyState) {
        let Some(target) = self.body_mut(body) else {
            return;
        };
        match state {
            BodyState::Transform(transform) => target.transform = transform,
            BodyState::LinearVelocity(velocity) => target.linear_velocity = velocity,
            BodyState::AngularVelocity(velocity) => target.angular_velocity = velocity,
            BodyState::Sleeping(sleeping) => target.sleeping = sleeping && target.can_sleep,
            BodyState::CanSleep(can_sleep) => {
                target.can_sleep = can_sleep;
                if !can_sleep {
                    target.sleeping = false;
                }
            }
        }
    }

    fn body_get_state(&self, body: Rid, kind: BodyStateKind) -> Option<BodyState> {
        let body = self.body(body)?;
        Some(match kind {
            BodyStateKind::Transform => BodyState::Transform(body.transform),
            BodyStateKind::LinearVelocity => BodyState::LinearVelocity(body.linear_velocity),
            BodyStateKind::AngularVelocity => BodyState::AngularVelocity(body.angular_velocity),
            BodyStateKind::Sleeping => BodyState::Sleeping(body.sleeping),
            BodyStateKind::CanSleep => BodyState::CanSleep(body.can_sleep),
        })
    }

    fn set_active(&mut self, active: bool) {
        self.touch();
        self.active = active;
    }

    fn free(&mut self, rid: Rid) {
        self.touch();
        let Some(resource) = self.resources.free(rid) else {
            tracing::warn!(?rid, "free of unknown handle");
            return;
        };
        self.stats.freed += 1;

        match resource {
            Resource::Space(_) => {
                for (_, other) in self.resources.iter_mut() {
                    match other {
                        Resource::Body(body) if body.space == rid => body.space = Rid::NULL,
                        Resource::Area(area) if area.space == rid => area.space = Rid::NULL,
                        _ => {}
                    }
                }
            }
            Resource::Shape(_) => {
                for (_, other) in self.resources.iter_mut() {
                    if let Resource::Body(body) = other {
                        body.shapes.retain(|(shape, _)| *shape != rid);
                    }
                }
            }
            Resource::Area(_) | Resource::Body(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> BasicPhysicsServer {
        let mut server = BasicPhysicsServer::new();
        server.init();
        server
    }

    fn active_space(server: &mut BasicPhysicsServer) -> Rid {
        let space = server.space_create();
        server.space_set_active(space, true);
        space
    }

    fn origin(server: &BasicPhysicsServer, body: Rid) -> Vec2 {
        match server.body_get_state(body, BodyStateKind::Transform) {
            Some(BodyState::Transform(xf)) => xf.origin,
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_rigid_body_falls_in_active_space() {
        let mut server = started();
        let space = active_space(&mut server);
        server.area_set_param(space, AreaParam::LinearDamp(0.0));
        let body = server.body_create();
        server.body_set_space(body, space);

        server.step(0.5);
        // v = 98 * 0.5 = 49, y = 49 * 0.5
        assert_eq!(origin(&server, body), Vec2::new(0.0, 24.5));
        assert_eq!(server.stats().steps, 1);
    }

    #[test]
    fn test_inactive_space_and_static_body_do_not_move() {
        let mut server = started();
        let idle = server.space_create();
        let live = active_space(&mut server);

        let drifting = server.body_create();
        server.body_set_space(drifting, idle);
        let anchored = server.body_create();
        server.body_set_space(anchored, live);
        server.body_set_mode(anchored, BodyMode::Static);

        for _ in 0..10 {
            server.step(0.1);
        }
        assert_eq!(origin(&server, drifting), Vec2::ZERO);
        assert_eq!(origin(&server, anchored), Vec2::ZERO);
    }

    #[test]
    fn test_paused_server_ignores_step() {
        let mut server = started();
        let space = active_space(&mut server);
        let body = server.body_create();
        server.body_set_space(body, space);

        server.set_active(false);
        server.step(1.0);
        assert_eq!(origin(&server, body), Vec2::ZERO);
        assert_eq!(server.stats().steps, 0);
    }

    #[test]
    fn test_area_params_on_space_address_default_area() {
        let mut server = started();
        let space = server.space_create();
        server.area_set_param(space, AreaParam::GravityVector(Vec2::new(0.0, 1.0)));
        server.area_set_param(space, AreaParam::Gravity(9.8));

        assert_eq!(
            server.area_get_param(space, AreaParamKind::Gravity),
            Some(AreaParam::Gravity(9.8))
        );

        let area = server.area_create();
        assert_eq!(
            server.area_get_param(area, AreaParamKind::Gravity),
            Some(AreaParam::Gravity(DEFAULT_GRAVITY))
        );
        let body = server.body_create();
        assert_eq!(server.area_get_param(body, AreaParamKind::Gravity), None);
    }

    #[test]
    fn test_point_query_respects_body_and_shape_transforms() {
        let mut server = started();
        let space = active_space(&mut server);

        let circle = server.shape_create(ShapeKind::Circle);
        server.shape_set_data(circle, ShapeData::Circle { radius: 16.0 });

        let near = server.body_create();
        server.body_set_space(near, space);
        server.body_add_shape(near, circle, Transform2D::IDENTITY);
        server.body_set_state(
            near,
            BodyState::Transform(Transform2D::from_origin(Vec2::new(100.0, 100.0))),
        );

        let far = server.body_create();
        server.body_set_space(far, space);
        server.body_add_shape(far, circle, Transform2D::from_origin(Vec2::new(500.0, 0.0)));

        assert_eq!(server.space_intersect_point(space, Vec2::new(110.0, 95.0)), vec![near]);
        assert_eq!(server.space_intersect_point(space, Vec2::new(505.0, 0.0)), vec![far]);
        assert!(server.space_intersect_point(space, Vec2::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_shape_data_of_wrong_kind_is_rejected() {
        let mut server = started();
        let shape = server.shape_create(ShapeKind::Rectangle);
        server.shape_set_data(shape, ShapeData::Circle { radius: 1.0 });
        server.shape_set_data(shape, ShapeData::Rectangle { half_extents: Vec2::new(1.0, 1.0) });

        let space = active_space(&mut server);
        let body = server.body_create();
        server.body_set_space(body, space);
        server.body_add_shape(body, shape, Transform2D::IDENTITY);

        assert_eq!(server.shape_get_kind(shape), Some(ShapeKind::Rectangle));
        assert_eq!(server.space_intersect_point(space, Vec2::new(0.9, -0.9)), vec![body]);
    }

    #[test]
    fn test_free_detaches_dependents() {
        let mut server = started();
        let space = active_space(&mut server);
        let shape = server.shape_create(ShapeKind::Circle);
        let body = server.body_create();
        server.body_set_space(body, space);
        server.body_add_shape(body, shape, Transform2D::IDENTITY);
        server.body_add_shape(body, shape, Transform2D::IDENTITY);
        assert_eq!(server.body_get_shape_count(body), 2);

        server.free(shape);
        assert_eq!(server.body_get_shape_count(body), 0);
        assert_eq!(server.shape_get_kind(shape), None);

        server.free(space);
        server.step(1.0);
        assert_eq!(origin(&server, body), Vec2::ZERO);

        server.free(space);
        assert_eq!(server.stats().freed, 2);
        assert_eq!(server.resource_count(), 1);
    }

    #[test]
    fn test_sleep_requires_can_sleep() {
        let mut server = started();
        let body = server.body_create();
        server.body_set_state(body, BodyState::CanSleep(false));
        server.body_set_state(body, BodyState::Sleeping(true));
        assert_eq!(
            server.body_get_state(body, BodyStateKind::Sleeping),
            Some(BodyState::Sleeping(false))
        );
    }

    #[test]
    fn test_finish_counts_live_resources() {
        let mut server = started();
        server.space_create();
        let body = server.body_create();
        server.free(body);
        server.finish();

        assert_eq!(server.stats().live_at_finish, 1);
        assert_eq!(server.resource_count(), 0);
        assert_eq!(server.threads(), &[thread::current().id()]);
    }
}
