//! Filter Module
//!
//! フィルタ仕様とその述語コンパイラ

pub mod compiler;
pub mod spec;

pub use compiler::{compile, CompiledFilter, FilterCompiler};
pub use spec::{FilterSpec, RawFilterQuery, TimeOfDay, TimeOfDaySelection};
