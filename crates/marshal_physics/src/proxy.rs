//! # Physics Server Proxy
//!
//! Drop-in, thread-safe substitute for a [`PhysicsServer`].
//!
//! ```text
//!  mutations  (body_set_state, ...)  ──► call       (async, returns at once)
//!  getters    (body_get_state, ...)  ──► call_sync  (blocks for the answer)
//!  creation   (body_create, ...)     ──► handle pool, call_sync on a miss
//! ```

use std::thread::ThreadId;

use marshal_core::{
    fatal, CacheStats, HandleCache, MarshalConfig, MarshalResult, ProxyMode, ProxyState,
    QueueStats, Rid, Server, ServerProxy,
};

use crate::math::{Transform2D, Vec2};
use crate::server::PhysicsServer;
use crate::types::{
    AreaParam, AreaParamKind, BodyMode, BodyState, BodyStateKind, ResourceCategory, ShapeData,
    ShapeKind,
};

/// Creates `count` resources of `category` on the server thread.
fn create_batch<S: PhysicsServer>(server: &mut S, category: ResourceCategory, count: usize) -> Vec<Rid> {
    (0..count)
        .map(|_| match category {
            ResourceCategory::Shape(kind) => server.shape_create(kind),
            ResourceCategory::Space => server.space_create(),
            ResourceCategory::Area => server.area_create(),
            ResourceCategory::Body => server.body_create(),
        })
        .collect()
}

/// Wraps a [`PhysicsServer`] so any thread may call it.
///
/// Resource creation is served from per-category handle pools that are
/// prefilled during `init` and released, in [`ResourceCategory::ALL`]
/// order, during `finish`.
///
/// ## Usage
///
/// ```rust,ignore
/// let physics = Arc::new(PhysicsServerProxy::new(BasicPhysicsServer::new(), &config));
/// physics.init()?;
///
/// let space = physics.space_create();     // from the pool, no round trip
/// physics.space_set_active(space, true);  // queued
///
/// physics.finish()?;
/// ```
pub struct PhysicsServerProxy<S: PhysicsServer> {
    inner: ServerProxy<S>,
    cache: HandleCache<ResourceCategory>,
}

impl<S: PhysicsServer> PhysicsServerProxy<S> {
    /// Takes ownership of `server`. Nothing runs until `init`.
    #[must_use]
    pub fn new(server: S, config: &MarshalConfig) -> Self {
        Self {
            inner: ServerProxy::new(server, config),
            cache: HandleCache::new(config.pool_max_size),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the server, then prefills every handle pool.
    ///
    /// # Errors
    ///
    /// Propagates startup errors of the underlying proxy, or a failed
    /// prefill round trip.
    pub fn init(&self) -> MarshalResult<()> {
        self.inner.init()?;

        for category in ResourceCategory::ALL {
            self.cache.prefill(category, |count| self.refill(category, count))?;
        }
        tracing::debug!(pooled = self.cache.total_available(), "handle pools prefilled");
        Ok(())
    }

    /// Releases every pooled handle, then shuts the server down.
    ///
    /// The destruction calls are queued ahead of the exit record, so they
    /// run on the server thread before its `finish`.
    ///
    /// # Errors
    ///
    /// Propagates `WorkerPanicked` from the underlying proxy.
    pub fn finish(&self) -> MarshalResult<()> {
        if self.inner.state() == ProxyState::Running {
            let mut released = 0;
            for category in ResourceCategory::ALL {
                released += self.cache.release_all(category, |rids| {
                    self.inner.call(move |server: &mut S| {
                        for rid in rids {
                            server.free(rid);
                        }
                    });
                });
            }
            tracing::debug!(released, "handle pools released");
        }
        self.inner.finish()
    }

    /// Advances the simulation. See [`ServerProxy::step`].
    pub fn step(&self, delta: f32) {
        self.inner.step(delta);
    }

    /// Waits for the last step, then syncs. See [`ServerProxy::sync`].
    pub fn sync(&self) {
        self.inner.sync();
    }

    /// Answers queries gathered during the last step.
    pub fn flush_queries(&self) {
        self.inner.flush_queries();
    }

    /// Closes the read window.
    pub fn end_sync(&self) {
        self.inner.end_sync();
    }

    // =========================================================================
    // Handle pools
    // =========================================================================

    /// Returns a fresh handle of `category`, from the pool when possible.
    ///
    /// # Errors
    ///
    /// Fails if a refill round trip was needed and the server could not
    /// be reached.
    pub fn allocate(&self, category: ResourceCategory) -> MarshalResult<Rid> {
        self.cache.allocate(category, |count| self.refill(category, count))
    }

    fn allocate_or_fatal(&self, category: ResourceCategory) -> Rid {
        self.allocate(category).unwrap_or_else(|error| fatal(&error))
    }

    fn refill(&self, category: ResourceCategory, count: usize) -> MarshalResult<Vec<Rid>> {
        self.inner
            .try_call_sync(move |server: &mut S| create_batch(server, category, count))
    }

    /// Handles currently pooled for `category`.
    #[must_use]
    pub fn pooled(&self, category: ResourceCategory) -> usize {
        self.cache.available(category)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Where the server runs.
    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.inner.mode()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProxyState {
        self.inner.state()
    }

    /// The thread that constructed the proxy.
    #[must_use]
    pub fn main_thread(&self) -> ThreadId {
        self.inner.main_thread()
    }

    /// The thread that owns the server, once known.
    #[must_use]
    pub fn server_thread(&self) -> Option<ThreadId> {
        self.inner.server_thread()
    }

    /// Command queue counters.
    #[must_use]
    pub fn queue_stats(&self) -> &QueueStats {
        self.inner.queue_stats()
    }

    /// Handle pool counters.
    #[must_use]
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// The underlying generic proxy, for calls outside the physics surface.
    #[must_use]
    pub fn proxy(&self) -> &ServerProxy<S> {
        &self.inner
    }

    /// Finishes if needed and hands the wrapped server back.
    ///
    /// Returns `None` if the server was lost to a worker panic.
    #[must_use]
    pub fn into_server(self) -> Option<S> {
        if let Err(error) = self.finish() {
            tracing::error!(%error, "finish failed while reclaiming server");
        }
        self.inner.take_server()
    }

    // =========================================================================
    // Shapes
    // =========================================================================

    /// Creates a shape of `kind`.
    ///
    /// # Panics
    ///
    /// Panics if a pool refill was needed and failed.
    pub fn shape_create(&self, kind: ShapeKind) -> Rid {
        self.allocate_or_fatal(ResourceCategory::Shape(kind))
    }

    /// Queues new geometry for `shape`.
    pub fn shape_set_data(&self, shape: Rid, data: ShapeData) {
        self.inner.call(move |server: &mut S| server.shape_set_data(shape, data));
    }

    /// Kind of `shape`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn shape_get_kind(&self, shape: Rid) -> Option<ShapeKind> {
        self.inner.call_sync(move |server: &mut S| server.shape_get_kind(shape))
    }

    // =========================================================================
    // Spaces
    // =========================================================================

    /// Creates a space.
    ///
    /// # Panics
    ///
    /// Panics if a pool refill was needed and failed.
    pub fn space_create(&self) -> Rid {
        self.allocate_or_fatal(ResourceCategory::Space)
    }

    /// Queues activation of `space`.
    pub fn space_set_active(&self, space: Rid, active: bool) {
        self.inner.call(move |server: &mut S| server.space_set_active(space, active));
    }

    /// Returns true if `space` is active.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn space_is_active(&self, space: Rid) -> bool {
        self.inner.call_sync(move |server: &mut S| server.space_is_active(space))
    }

    /// Bodies in `space` containing `point`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn space_intersect_point(&self, space: Rid, point: Vec2) -> Vec<Rid> {
        self.inner
            .call_sync(move |server: &mut S| server.space_intersect_point(space, point))
    }

    // =========================================================================
    // Areas
    // =========================================================================

    /// Creates an area.
    ///
    /// # Panics
    ///
    /// Panics if a pool refill was needed and failed.
    pub fn area_create(&self) -> Rid {
        self.allocate_or_fatal(ResourceCategory::Area)
    }

    /// Queues moving `area` into `space`.
    pub fn area_set_space(&self, area: Rid, space: Rid) {
        self.inner.call(move |server: &mut S| server.area_set_space(area, space));
    }

    /// Queues one area parameter.
    pub fn area_set_param(&self, area: Rid, param: AreaParam) {
        self.inner.call(move |server: &mut S| server.area_set_param(area, param));
    }

    /// Reads one area parameter.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn area_get_param(&self, area: Rid, kind: AreaParamKind) -> Option<AreaParam> {
        self.inner.call_sync(move |server: &mut S| server.area_get_param(area, kind))
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Creates a body.
    ///
    /// # Panics
    ///
    /// Panics if a pool refill was needed and failed.
    pub fn body_create(&self) -> Rid {
        self.allocate_or_fatal(ResourceCategory::Body)
    }

    /// Queues moving `body` into `space`.
    pub fn body_set_space(&self, body: Rid, space: Rid) {
        self.inner.call(move |server: &mut S| server.body_set_space(body, space));
    }

    /// Queues attaching `shape` to `body`.
    pub fn body_add_shape(&self, body: Rid, shape: Rid, transform: Transform2D) {
        self.inner
            .call(move |server: &mut S| server.body_add_shape(body, shape, transform));
    }

    /// Number of shapes attached to `body`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn body_get_shape_count(&self, body: Rid) -> usize {
        self.inner.call_sync(move |server: &mut S| server.body_get_shape_count(body))
    }

    /// Queues a mode change.
    pub fn body_set_mode(&self, body: Rid, mode: BodyMode) {
        self.inner.call(move |server: &mut S| server.body_set_mode(body, mode));
    }

    /// Current mode of `body`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn body_get_mode(&self, body: Rid) -> Option<BodyMode> {
        self.inner.call_sync(move |server: &mut S| server.body_get_mode(body))
    }

    /// Queues one piece of body state.
    pub fn body_set_state(&self, body: Rid, state: BodyState) {
        self.inner.call(move |server: &mut S| server.body_set_state(body, state));
    }

    /// Reads one piece of body state.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn body_get_state(&self, body: Rid, kind: BodyStateKind) -> Option<BodyState> {
        self.inner.call_sync(move |server: &mut S| server.body_get_state(body, kind))
    }

    // =========================================================================
    // Server
    // =========================================================================

    /// Queues pausing or resuming the server.
    pub fn set_active(&self, active: bool) {
        self.inner.call(move |server: &mut S| server.set_active(active));
    }

    /// Queues destruction of `rid`.
    pub fn free(&self, rid: Rid) {
        self.inner.call(move |server: &mut S| server.free(rid));
    }
}

impl<S: PhysicsServer> Drop for PhysicsServerProxy<S> {
    fn drop(&mut self) {
        if self.inner.state() == ProxyState::Running {
            tracing::warn!("physics proxy dropped while running; finishing");
            let this: &Self = self;
            if let Err(error) = this.finish() {
                tracing::error!(%error, "finish failed during drop");
            }
        }
    }
}

/// # Panics
///
/// `init` and `finish` panic on error; there is no error channel here.
impl<S: PhysicsServer> Server for PhysicsServerProxy<S> {
    fn init(&mut self) {
        let this: &Self = self;
        if let Err(error) = this.init() {
            fatal(&error);
        }
    }

    fn finish(&mut self) {
        let this: &Self = self;
        if let Err(error) = this.finish() {
            fatal(&error);
        }
    }

    fn step(&mut self, delta: f32) {
        self.inner.step(delta);
    }

    fn sync(&mut self) {
        self.inner.sync();
    }

    fn flush_queries(&mut self) {
        self.inner.flush_queries();
    }

    fn end_sync(&mut self) {
        self.inner.end_sync();
    }
}

impl<S: PhysicsServer> PhysicsServer for PhysicsServerProxy<S> {
    fn shape_create(&mut self, kind: ShapeKind) -> Rid {
        let this: &Self = self;
        this.shape_create(kind)
    }

    fn shape_set_data(&mut self, shape: Rid, data: ShapeData) {
        let this: &Self = self;
        this.shape_set_data(shape, data);
    }

    fn shape_get_kind(&self, shape: Rid) -> Option<ShapeKind> {
        Self::shape_get_kind(self, shape)
    }

    fn space_create(&mut self) -> Rid {
        let this: &Self = self;
        this.space_create()
    }

    fn space_set_active(&mut self, space: Rid, active: bool) {
        let this: &Self = self;
        this.space_set_active(space, active);
    }

    fn space_is_active(&self, space: Rid) -> bool {
        Self::space_is_active(self, space)
    }

    fn space_intersect_point(&self, space: Rid, point: Vec2) -> Vec<Rid> {
        Self::space_intersect_point(self, space, point)
    }

    fn area_create(&mut self) -> Rid {
        let this: &Self = self;
        this.area_create()
    }

    fn area_set_space(&mut self, area: Rid, space: Rid) {
        let this: &Self = self;
        this.area_set_space(area, space);
    }

    fn area_set_param(&mut self, area: Rid, param: AreaParam) {
        let this: &Self = self;
        this.area_set_param(area, param);
    }

    fn area_get_param(&self, area: Rid, kind: AreaParamKind) -> Option<AreaParam> {
        Self::area_get_param(self, area, kind)
    }

    fn body_create(&mut self) -> Rid {
        let this: &Self = self;
        this.body_create()
    }

    fn body_set_space(&mut self, body: Rid, space: Rid) {
        let this: &Self = self;
        this.body_set_space(body, space);
    }

    fn body_add_shape(&mut self, body: Rid, shape: Rid, transform: Transform2D) {
        let this: &Self = self;
        this.body_add_shape(body, shape, transform);
    }

    fn body_get_shape_count(&self, body: Rid) -> usize {
        Self::body_get_shape_count(self, body)
    }

    fn body_set_mode(&mut self, body: Rid, mode: BodyMode) {
        let this: &Self = self;
        this.body_set_mode(body, mode);
    }

    fn body_get_mode(&self, body: Rid) -> Option<BodyMode> {
        Self::body_get_mode(self, body)
    }

    fn body_set_state(&mut self, body: Rid, state: BodyState) {
        let this: &Self = self;
        this.body_set_state(body, state);
    }

    fn body_get_state(&self, body: Rid, kind: BodyStateKind) -> Option<BodyState> {
        Self::body_get_state(self, body, kind)
    }

    fn set_active(&mut self, active: bool) {
        let this: &Self = self;
        this.set_active(active);
    }

    fn free(&mut self, rid: Rid) {
        let this: &Self = self;
        this.free(rid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::BasicPhysicsServer;

    #[test]
    fn test_init_prefills_every_category() {
        let config = MarshalConfig::threaded().with_pool_max_size(4);
        let physics = PhysicsServerProxy::new(BasicPhysicsServer::new(), &config);
        physics.init().unwrap();

        for category in ResourceCategory::ALL {
            assert_eq!(physics.pooled(category), 4);
        }
        assert_eq!(physics.cache_stats().prefills(), ResourceCategory::ALL.len() as u64);

        let server = physics.into_server().unwrap();
        assert_eq!(server.stats().created, 44);
        assert_eq!(server.stats().freed, 44);
        assert_eq!(server.stats().live_at_finish, 0);
    }

    #[test]
    fn test_created_handles_resolve_on_server() {
        let physics =
            PhysicsServerProxy::new(BasicPhysicsServer::new(), &MarshalConfig::threaded());
        physics.init().unwrap();

        let shape = physics.shape_create(ShapeKind::Capsule);
        assert_eq!(physics.shape_get_kind(shape), Some(ShapeKind::Capsule));

        let body = physics.body_create();
        physics.body_set_mode(body, BodyMode::Kinematic);
        assert_eq!(physics.body_get_mode(body), Some(BodyMode::Kinematic));
    }

    #[test]
    fn test_proxy_is_a_physics_server() {
        fn build<P: PhysicsServer>(physics: &mut P) -> Rid {
            let space = physics.space_create();
            physics.space_set_active(space, true);
            let body = physics.body_create();
            physics.body_set_space(body, space);
            body
        }

        let mut physics =
            PhysicsServerProxy::new(BasicPhysicsServer::new(), &MarshalConfig::inline());
        Server::init(&mut physics);
        let body = build(&mut physics);
        assert!(PhysicsServer::body_get_mode(&physics, body).is_some());
        Server::finish(&mut physics);
        assert_eq!(physics.state(), ProxyState::Stopped);
    }
}
