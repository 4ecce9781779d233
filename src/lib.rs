pub mod actor;
pub mod common;
pub mod decor;
pub mod model;
pub mod sys;
