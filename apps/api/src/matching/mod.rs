// Resume matching: category keyword profiles, PDF text extraction, scoring.

pub mod analysis;
pub mod categories;
pub mod extract;
pub mod handlers;
