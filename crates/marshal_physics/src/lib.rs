//! # MARSHAL Physics
//!
//! A physics-shaped server surface on top of `marshal_core`.
//!
//! ## Contents
//!
//! - [`PhysicsServer`] - the operation surface (shapes, spaces, areas, bodies)
//! - [`BasicPhysicsServer`] - a small deterministic backend
//! - [`PhysicsServerProxy`] - the same surface, callable from any thread,
//!   with pooled resource creation
//!
//! ## RULE
//!
//! The simulation is an external collaborator. This crate dispatches to
//! it and never grows collision response or constraint solving.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod basic;
pub mod math;
pub mod proxy;
pub mod server;
pub mod types;

pub use basic::{BasicPhysicsServer, BasicStats};
pub use math::{Transform2D, Vec2};
pub use proxy::PhysicsServerProxy;
pub use server::PhysicsServer;
pub use types::{
    AreaParam, AreaParamKind, BodyMode, BodyState, BodyStateKind, ResourceCategory, ShapeData,
    ShapeKind,
};
