pub mod cli;
pub mod detect;
pub mod diff;
pub mod error;
pub mod github;
pub mod model;
pub mod normalize;
pub mod parsers;
pub mod reconcile;
pub mod report;
