use bson::{Bson, Document};

use crate::common::{
    SortableFields, DOC_ID, STAGE_GROUP, STAGE_LIMIT, STAGE_MATCH, STAGE_PROJECT, STAGE_SKIP,
    STAGE_SORT,
};

/// One step of an aggregation pipeline.
///
/// Each stage encodes to exactly one native stage document.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps the documents matching a native filter.
    Match(Document),
    /// Reshapes documents: inclusion, exclusion, `"$field"` references and
    /// literals.
    Project(Document),
    /// Groups by `key` and computes one output field per accumulator.
    Group { key: Bson, accumulators: Document },
    Sort(SortableFields),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    /// The native stage name, such as `$match`.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => STAGE_MATCH,
            Stage::Project(_) => STAGE_PROJECT,
            Stage::Group { .. } => STAGE_GROUP,
            Stage::Sort(_) => STAGE_SORT,
            Stage::Skip(_) => STAGE_SKIP,
            Stage::Limit(_) => STAGE_LIMIT,
        }
    }

    pub fn to_document(&self) -> Document {
        let body = match self {
            Stage::Match(filter) => Bson::Document(filter.clone()),
            Stage::Project(mapping) => Bson::Document(mapping.clone()),
            Stage::Group { key, accumulators } => {
                let mut group = Document::new();
                group.insert(DOC_ID, key.clone());
                for (field, accumulator) in accumulators {
                    // rejected when the stage is appended to a pipeline
                    if field != DOC_ID {
                        group.insert(field.clone(), accumulator.clone());
                    }
                }
                Bson::Document(group)
            }
            Stage::Sort(fields) => Bson::Document(fields.to_document()),
            Stage::Skip(count) => count_to_bson(*count),
            Stage::Limit(count) => count_to_bson(*count),
        };

        let mut stage = Document::new();
        stage.insert(self.name(), body);
        stage
    }
}

fn count_to_bson(count: u64) -> Bson {
    Bson::Int64(i64::try_from(count).unwrap_or(i64::MAX))
}
