pub mod coordinates;
pub mod features;
pub mod meta;
pub mod place;
pub mod route;
pub mod score;
pub mod theme;

pub use coordinates::Coordinates;
pub use meta::{
    FallbackDetail, FallbackLedger, FallbackReason, RouteMeta, RouteQuality, StageStatus, Tool,
};
pub use place::{Place, Spot};
pub use route::{
    GenerateRouteRequest, GenerateRouteResponse, RawCandidate, RequestContext, RouteCandidate,
    SelectedRoute,
};
pub use score::{RouteScore, Scores};
pub use theme::Theme;
