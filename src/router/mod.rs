//! Request routing and credential resolution
//!
//! Handles:
//! - Mapping an inbound hostname to an application (or admin / passthrough)
//! - Email pattern matching with specificity ranking
//! - Picking the credential record for a principal

mod hosts;
mod matcher;
mod resolver;

pub use hosts::{normalize_host, HostRouter, Route};
pub use matcher::{matches, specificity, UNIVERSAL_PATTERN};
pub use resolver::{resolve, CredentialResolver};
