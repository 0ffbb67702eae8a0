//! Domain types shared by every provider and the export stage.

pub mod row;
pub mod symbols;

pub use row::{CanonicalRow, DateRange};
pub use symbols::SymbolList;
