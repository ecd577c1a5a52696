pub mod catalog_builder;

pub use catalog_builder::{BuildReport, CatalogBuilder, FileFailure};
