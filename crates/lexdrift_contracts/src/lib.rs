#![forbid(unsafe_code)]

pub mod common;
pub mod corpus;
pub mod reference;
pub mod report;
pub mod schema;
pub mod vector;
pub mod window;

pub use common::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};
