//! Request matching utilities.

mod expression;
mod intersection;
pub mod restriction;
mod url;

pub use expression::{match_with_jmespath, parse_expression, validate_expression};
pub use intersection::json_contains;
pub use restriction::{
    evaluate, ComputedRestriction, DiffEntry, RequestPredicate, Restriction, RestrictionDiff,
    RestrictionError, RestrictionMatch, StaticRestriction,
};
pub use url::{join_url, url_matches, UrlMatchResult};
