pub mod changeset;
pub mod descriptor;
pub mod orchestrator;
pub mod reconcile;

pub use changeset::*;
pub use descriptor::EntityDescriptor;
pub use orchestrator::*;
pub use reconcile::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::EntityKind;

/// Errors the sync layer returns. Remote failures never show up here: they
/// end in the local fallback or in a failure envelope.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local replica error: {0}")]
    Database(#[from] DatabaseError),

    #[error("No batch operation is defined for {kind}")]
    BatchUnsupported { kind: EntityKind },
}
