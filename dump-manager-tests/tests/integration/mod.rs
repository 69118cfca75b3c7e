//! Integration tests over real files, archives and processes
//!
//! Everything here runs without network services. Tests that need a live
//! PostgreSQL server are marked `#[ignore]`; run them with
//! `cargo test -p dump-manager-tests --test integration -- --ignored`
//! after exporting `PGHOST`, `PGUSER` and `PGPASSWORD`.

mod codec;
mod database;
mod s3;
mod tarball;
