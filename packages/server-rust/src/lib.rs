//! `servhost` server: handler discovery, registration, dependency container,
//! and request dispatch over tower.

pub mod container;
pub mod service;

pub use container::{Container, ContainerError, FactoryContainer, Instance};
pub use service::{
    build_dispatch_pipeline, DispatchService, HostConfig, ManagerState, ServiceError,
    ServiceManager, StaticCollection, TypeEntry,
};
