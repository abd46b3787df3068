//! Service-name resolution for the EduPath gateway.
//!
//! The proxy router works in terms of logical service names
//! (`student-profiler`, `recco-builder`, ...). This crate turns a name into a
//! network authority (`host:port`) at request time, either by querying a
//! discovery backend over HTTP or from a static map, behind a single
//! [`ServiceResolver`] trait so the two are interchangeable at startup.

mod registry;
mod resolver;

pub use registry::{RegistryClient, RegistryConfig};
pub use resolver::{ServiceResolver, StaticResolver};
