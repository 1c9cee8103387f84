//! Versioned search-engine storage for chemical-structure records.
//!
//! A repository binds one record kind to one engine index and exposes
//! insert, bulk insert, structure-aware search, and delete over it.
//! Wire differences between the supported engine releases live in a
//! version profile chosen once at build time, so callers never see
//! them.
//!
//! ```no_run
//! use bingo_elastic::{ElasticRepository, SearchCriteria, SimilarityMetric};
//! use bingo_model::{IndigoRecordMolecule, naming};
//!
//! # async fn demo() -> Result<(), bingo_elastic::RepositoryError> {
//! let repository = ElasticRepository::<IndigoRecordMolecule>::builder()
//!     .with_index_name(naming::BINGO_MOLECULES)
//!     .with_host_name("localhost")
//!     .with_port(9200)
//!     .with_scheme("http")
//!     .with_version("8")
//!     .with_refresh_interval("1s")
//!     .build()?;
//!
//! let ethanol = IndigoRecordMolecule::new("CCO").with_meta("name", "ethanol");
//! let id = repository.insert(&ethanol).await?;
//! repository.refresh().await?;
//!
//! let mut hits = repository.query(
//!     SearchCriteria::similarity("CCO", SimilarityMetric::Tanimoto, 0.7),
//! )?;
//! while let Some(record) = hits.try_next().await? {
//!     println!("{record}");
//! }
//! repository.delete_by_id(&id).await?;
//! repository.close();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
mod codec;
pub mod error;
pub mod query;
pub mod repository;
mod schema;
pub mod version;

pub use builder::RepositoryBuilder;
pub use error::{RepositoryError, RepositoryResult};
pub use query::{MetaFilter, SearchCriteria, SimilarityMetric, StructureQuery};
pub use repository::{ElasticRepository, RecordCursor};
pub use version::{EngineVersion, VersionProfile};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
