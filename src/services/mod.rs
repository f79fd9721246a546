pub mod copy;
pub mod directions;
pub mod geometry;
pub mod places;
pub mod polyline;
pub mod ranker;
pub mod route_pipeline;
pub mod text_gen;
