//! Writing side of the object layer.
//!
//! ```text
//! PdfDocument (original bytes)
//!     ↓
//! [IncrementalUpdate] (new and replaced objects)
//!     ↓
//! [ObjectSerializer] (objects → PDF syntax)
//!     ↓
//! original bytes + appended section + xref + trailer
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{IncrementalUpdate, UpdatedDocument};
pub use object_serializer::ObjectSerializer;
