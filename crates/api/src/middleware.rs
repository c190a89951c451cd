//! Request middleware: principal resolution extractors.

pub mod auth;
