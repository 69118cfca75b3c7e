//! Orchestrator tests for backup, restore and scheduled runs
//!
//! Services and stores are in-memory stand-ins from `test_utils::fixtures`,
//! so these tests never run external programs.

mod backup;
mod restore;
mod scheduled;
