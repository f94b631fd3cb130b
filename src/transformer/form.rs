//! `application/x-www-form-urlencoded` body handler.

use super::{ContentHandler, TransformError};
use crate::context::RewriteContext;

/// Form body handler. Pair order and repeated names are preserved; pairs
/// whose value does not change are copied through raw.
#[derive(Debug, Default)]
pub struct FormHandler;

impl FormHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ContentHandler for FormHandler {
    fn name(&self) -> &'static str {
        "form"
    }

    fn content_types(&self) -> &[&'static str] {
        &["application/x-www-form-urlencoded*"]
    }

    fn rewrite(
        &self,
        ctx: &RewriteContext<'_>,
        text: &str,
    ) -> Result<Option<String>, TransformError> {
        let mut changed = false;
        let mut pairs = Vec::new();

        for pair in text.split('&') {
            let Some((name, raw)) = pair.split_once('=') else {
                pairs.push(pair.to_string());
                continue;
            };
            let rewritten = match decode(raw) {
                Some(value) => ctx.rewrite_value(&value)?,
                None => None,
            };
            match rewritten {
                Some(value) => {
                    changed = true;
                    pairs.push(format!("{}={}", name, encode(&value)));
                }
                None => pairs.push(pair.to_string()),
            }
        }

        Ok(changed.then(|| pairs.join("&")))
    }
}

fn decode(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|v| v.into_owned())
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;
    use crate::transformer::test_support::Fixture;

    fn rewrite(text: &str) -> Option<String> {
        let fixture = Fixture::new();
        let ctx = fixture.context(Direction::RequestBody);
        FormHandler::new().rewrite(&ctx, text).unwrap()
    }

    #[test]
    fn test_rewrites_encoded_url_value() {
        assert_eq!(
            rewrite("name=John+Doe&url=http%3A%2F%2Fmock-host%3A1%2Ftest-input-path&url=x&flag").unwrap(),
            "name=John+Doe&url=http%3A%2F%2Fmock-host%3A1%2Ftest-output-path-1&url=x&flag"
        );
    }

    #[test]
    fn test_unencoded_value_is_matched() {
        assert_eq!(
            rewrite("next=/test-input-path").unwrap(),
            "next=%2Ftest-output-path-1"
        );
    }

    #[test]
    fn test_no_match_returns_none() {
        assert!(rewrite("a=1&b=%ZZ&c").is_none());
        assert!(rewrite("").is_none());
    }
}
