//! HTTP handlers, grouped by zone.

pub mod callbacks;
pub mod db_admin;
pub mod internal;
pub mod user;
