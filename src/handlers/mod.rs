//! Handler implementations for external collaborators
//!
//! 現在はライドデータを保持するストアのみ

pub mod database;
