//! cnvrg spec: `CnvrgApp`/`CnvrgInfra` custom resources, compiled-in
//! defaults and the override merge that produces a desired spec.

#![forbid(unsafe_code)]

pub mod app;
pub mod defaults;
pub mod desired;
pub mod infra;
pub mod merge;
pub mod status;

pub use app::{enabled, CnvrgApp, CnvrgAppSpec, CriType, IngressType};
pub use defaults::default_app_spec;
pub use desired::{default_no_proxy, desired_spec, DefaultsError, Facts};
pub use infra::{CnvrgInfra, CnvrgInfraSpec};
pub use merge::Merge;
pub use status::{Phase, Status};
