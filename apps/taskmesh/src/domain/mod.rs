// Domain layer module exports
// Run records and the persistence port; independent of any database

pub mod repositories;
pub mod run;
