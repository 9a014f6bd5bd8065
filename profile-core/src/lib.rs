mod client;
mod transform;

pub use client::{ApiErrorClass, DocumentClient, DocumentError};
pub use transform::{FieldTransform, TransformOp};
