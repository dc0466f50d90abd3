//! sea-orm entities for both schema families.
//!
//! `master` tables live in the platform database, `tenant` tables in each
//! store database. `user` is shared: platform operators sit in the master
//! database and store staff in the tenant database, with the same columns.

pub mod master;
pub mod tenant;
pub mod user;
