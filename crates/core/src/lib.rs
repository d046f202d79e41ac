//! parksync-core: the pure half of the offline write-ahead sync layer.
//!
//! Everything here is synchronous data transformation. Nothing in this crate
//! performs I/O; the HTTP interceptor in `parksync-cli` feeds it captured
//! request/response data and hands the resulting record to an `OutboxStore`.
//!
//! # Public API
//!
//! - [`ObjectId`], [`normalize`] -- identifier normalization
//! - [`RouteTable`], [`Classification`] -- path to collection mapping
//! - [`ResponseShape`], [`ShapeRules`] -- envelope vs document detection
//! - [`reconstruct_document`], [`ReconstructPolicy`] -- canonical document
//! - [`build_record`], [`Mutation`] -- final outbox record

pub mod ident;
pub mod reconstruct;
pub mod record;
pub mod routes;
pub mod shape;

pub use ident::{normalize, ObjectId, RawId};
pub use reconstruct::{
    flatten_references, reconstruct_document, AuthenticatedActor, ReconstructPolicy,
    RequestContext,
};
pub use record::{build_record, Mutation};
pub use routes::{Classification, LocalOnlySignal, RouteMatch, RouteTable};
pub use shape::{ResponseShape, ShapeRules};
