//! Interceptor options and handler fixtures loaded from YAML, JSON or JSONC.

mod error;
mod fixture;
mod options;
mod parser;

pub use error::ConfigError;
pub use fixture::{BodyOrExpression, HandlerFixture, MapOrExpression, RestrictionFixture, TimesFixture};
pub use options::{InterceptorOptions, RequestSavingOptions};
pub use parser::{
    get_file_type, load_fixtures, parse_config, parse_json, parse_jsonc, parse_yaml,
    strip_json_comments, ConfigFileType,
};
