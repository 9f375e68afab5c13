//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods. Methods
//! that stand alone accept `&PgPool`; methods that must run inside the
//! queue-drain transaction accept `&mut PgConnection`.

pub mod account_repo;
pub mod adjustment_repo;

pub use account_repo::AccountRepo;
pub use adjustment_repo::AdjustmentRepo;
