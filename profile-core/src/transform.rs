use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side array operation. Both are idempotent: adding a present value
/// or removing an absent one leaves the array unchanged.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransformOp {
    ArrayUnion,
    ArrayRemove,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FieldTransform {
    /// Dotted path into the document, e.g. `favorites.retreats`.
    pub field: String,
    pub op: TransformOp,
    pub values: Vec<Value>,
}

impl FieldTransform {
    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: TransformOp::ArrayUnion,
            values,
        }
    }

    pub fn array_remove(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: TransformOp::ArrayRemove,
            values,
        }
    }
}
