//! Directory Service - hierarchical entry store on PostgreSQL.

pub mod config;
pub mod dn;
pub mod mapper;
pub mod models;
pub mod repository;
pub mod services;
pub mod startup;

pub use dn::{DirectoryContext, Dn};
pub use models::{AddEntry, Attribute};
pub use repository::{Repository, RepositoryError};
