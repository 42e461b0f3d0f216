pub mod aggregator;
pub mod case_reader;
pub mod collision_detector;
pub mod front_builder;
pub mod front_extractor;
pub mod geometry;
pub mod heuristics;
pub mod point_clusterer;
pub mod snapshot;
pub mod synthetic;
pub mod tracker;
