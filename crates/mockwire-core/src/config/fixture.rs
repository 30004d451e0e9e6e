//! Declarative handler fixtures.

use crate::handler::RequestLimits;
use crate::http::{HttpBody, HttpMethod, HttpMultiMap, ResponseDeclaration};
use crate::matching::{parse_expression, Restriction, RestrictionError, StaticRestriction};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Multi-map value - either a map or an expression string
#[derive(Debug, Clone, PartialEq)]
pub enum MapOrExpression {
    Map(HttpMultiMap),
    Expression(String),
}

impl Serialize for MapOrExpression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MapOrExpression::Map(map) => map.serialize(serializer),
            MapOrExpression::Expression(expr) => format!("${{{expr}}}").serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MapOrExpression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => parse_expression(&s)
                .map(|expr| MapOrExpression::Expression(expr.to_string()))
                .ok_or_else(|| {
                    serde::de::Error::custom("expected an object or a ${...} expression")
                }),
            Value::Object(_) => serde_json::from_value(value)
                .map(MapOrExpression::Map)
                .map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom(
                "expected an object or a ${...} expression",
            )),
        }
    }
}

/// Body value - either a body pattern or an expression string
#[derive(Debug, Clone, PartialEq)]
pub enum BodyOrExpression {
    Body(HttpBody),
    Expression(String),
}

impl Serialize for BodyOrExpression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            BodyOrExpression::Body(body) => body.serialize(serializer),
            BodyOrExpression::Expression(expr) => format!("${{{expr}}}").serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for BodyOrExpression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if let Some(expr) = value.as_str().and_then(parse_expression) {
            return Ok(BodyOrExpression::Expression(expr.to_string()));
        }
        serde_json::from_value(value)
            .map(BodyOrExpression::Body)
            .map_err(serde::de::Error::custom)
    }
}

/// One restriction of a fixture. Expressions become computed restrictions; the other
/// declared dimensions form a single static restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionFixture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<MapOrExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_params: Option<MapOrExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyOrExpression>,
    /// Form fields, for url-encoded bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<HttpMultiMap>,
    #[serde(default)]
    pub exact: bool,
}

impl RestrictionFixture {
    fn restrictions(&self) -> Result<Vec<Restriction>, RestrictionError> {
        let mut computed = Vec::new();
        let mut restriction = StaticRestriction {
            exact: self.exact,
            ..StaticRestriction::default()
        };

        match &self.headers {
            Some(MapOrExpression::Map(headers)) => restriction.headers = Some(headers.clone()),
            Some(MapOrExpression::Expression(expr)) => computed.push(Restriction::expression(expr)?),
            None => {}
        }
        match &self.search_params {
            Some(MapOrExpression::Map(params)) => {
                restriction.search_params = Some(params.clone())
            }
            Some(MapOrExpression::Expression(expr)) => computed.push(Restriction::expression(expr)?),
            None => {}
        }
        match &self.body {
            Some(BodyOrExpression::Body(body)) => restriction.body = Some(body.clone()),
            Some(BodyOrExpression::Expression(expr)) => computed.push(Restriction::expression(expr)?),
            None => {}
        }
        if let Some(form) = &self.form {
            restriction.body = Some(HttpBody::Form(form.clone()));
        }

        let declares_static = restriction.headers.is_some()
            || restriction.search_params.is_some()
            || restriction.body.is_some();

        let mut restrictions = Vec::with_capacity(computed.len() + 1);
        if declares_static {
            restrictions.push(restriction.into());
        }
        restrictions.extend(computed);
        Ok(restrictions)
    }
}

/// Expected request count: a number, or a `{min, max}` range with an optional `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimesFixture {
    Exactly(usize),
    Range {
        #[serde(default)]
        min: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<usize>,
    },
}

impl TimesFixture {
    pub fn into_limits(self) -> RequestLimits {
        match self {
            TimesFixture::Exactly(count) => RequestLimits::exactly(count),
            TimesFixture::Range { min, max } => {
                RequestLimits::between(min, max.unwrap_or(usize::MAX))
            }
        }
    }
}

/// Handler declared in a fixture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFixture {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<RestrictionFixture>,
    pub response: ResponseDeclaration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<TimesFixture>,
}

impl HandlerFixture {
    /// Restrictions of the fixture, in declaration order.
    pub fn build_restrictions(&self) -> Result<Vec<Restriction>, RestrictionError> {
        let mut restrictions = Vec::new();
        for fixture in &self.restrictions {
            restrictions.extend(fixture.restrictions()?);
        }
        Ok(restrictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::{parse_json, parse_yaml};
    use crate::http::{MockResponse, ResponseAction};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn test_yaml_fixture() {
        let fixture: HandlerFixture = parse_yaml(
            r#"
method: POST
path: /users
restrictions:
  - headers:
      content-type: application/json
    body:
      name: User
  - searchParams: "${searchParams.source == 'signup'}"
response:
  status: 201
  body:
    id: 1
times: 1
"#,
        )
        .expect("valid fixture");

        assert_eq!(fixture.method, HttpMethod::Post);
        assert_eq!(fixture.times, Some(TimesFixture::Exactly(1)));
        assert_eq!(
            fixture.response,
            ResponseDeclaration::Response(MockResponse::new(201).json(json!({"id": 1})))
        );
        assert_eq!(
            fixture.restrictions[0].body,
            Some(BodyOrExpression::Body(HttpBody::Json(json!({"name": "User"}))))
        );
        assert_eq!(
            fixture.restrictions[1].search_params,
            Some(MapOrExpression::Expression(
                "searchParams.source == 'signup'".to_string()
            ))
        );

        let restrictions = fixture.build_restrictions().expect("valid restrictions");
        assert_eq!(restrictions.len(), 2);
        assert!(matches!(restrictions[0], Restriction::Static(_)));
        assert!(matches!(restrictions[1], Restriction::Computed(_)));
    }

    #[rstest]
    #[case(json!(3), RequestLimits::exactly(3))]
    #[case(json!({"min": 1, "max": 2}), RequestLimits::between(1, 2))]
    #[case(json!({"min": 2}), RequestLimits::between(2, usize::MAX))]
    fn test_times_fixture(#[case] value: serde_json::Value, #[case] expected: RequestLimits) {
        let times: TimesFixture = serde_json::from_value(value).expect("valid times");
        assert_eq!(times.into_limits(), expected);
    }

    #[rstest]
    fn test_action_response_and_text_body() {
        let fixture: HandlerFixture = parse_json(
            r#"{
                "method": "GET",
                "path": "/health",
                "restrictions": [{"body": "ping", "exact": true}],
                "response": {"action": "bypass"}
            }"#,
        )
        .expect("valid fixture");

        assert_eq!(
            fixture.response,
            ResponseDeclaration::Action {
                action: ResponseAction::Bypass
            }
        );
        assert_eq!(
            fixture.restrictions[0].body,
            Some(BodyOrExpression::Body(HttpBody::Text("ping".to_string())))
        );
        assert!(fixture.restrictions[0].exact);
    }

    #[rstest]
    fn test_invalid_expression_is_reported() {
        let fixture = HandlerFixture {
            method: HttpMethod::Get,
            path: "/users".to_string(),
            restrictions: vec![RestrictionFixture {
                body: Some(BodyOrExpression::Expression("[invalid".to_string())),
                ..RestrictionFixture::default()
            }],
            response: ResponseDeclaration::reject(),
            times: None,
        };
        assert!(matches!(
            fixture.build_restrictions(),
            Err(RestrictionError::InvalidExpression { .. })
        ));
    }

    #[rstest]
    fn test_headers_must_be_object_or_expression() {
        let result: Result<RestrictionFixture, _> = parse_json(r#"{"headers": "plain"}"#);
        assert!(result.is_err());
    }
}
