//! Per-resource-type strategies. Each strategy pairs the classification rules
//! for one target type with the downstream calls that fetch it; the engine
//! drives all of them through the same generic pipeline.

pub mod lookup;
pub mod medication_statement;
pub mod observation;
pub mod procedure;
pub mod references;

use crate::clients::DagDeclaration;
use crate::resolve::{ClassificationRules, FetchExecutor};

pub use medication_statement::MedicationStatementStrategy;
pub use observation::ObservationStrategy;
pub use procedure::ProcedureStrategy;

/// Everything the engine needs from one target resource type.
pub trait ResourceStrategy: ClassificationRules + FetchExecutor {}

impl<T> ResourceStrategy for T where T: ClassificationRules + FetchExecutor {}

/// The completeness DAG entry implied by a strategy's consumed types.
pub fn dag_declaration<S>(strategy: &S) -> DagDeclaration
where
    S: ResourceStrategy + ?Sized,
{
    DagDeclaration::new(
        strategy.target_type().clone(),
        strategy.consumed_types().iter().cloned(),
    )
}
