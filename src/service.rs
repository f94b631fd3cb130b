//! Backend service bindings.
//!
//! A service contributes three things: a base URL for the `service*`
//! functions, inbound routes that select rule sets per direction, and
//! rule sets of its own that are merged into the catalog.

use crate::config::ServiceDef;
use crate::dispatch::DirectionOverrides;
use crate::rule::{RuleCatalog, RuleError, ServiceDirectory};
use crate::template::UrlTemplate;

/// An inbound URL pattern bound to a service role.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    pub role: String,
    pub pattern: UrlTemplate,
    pub overrides: DirectionOverrides,
}

/// Compiled service bindings.
#[derive(Debug, Clone, Default)]
pub struct ServiceBindings {
    routes: Vec<ServiceRoute>,
    directory: ServiceDirectory,
}

impl ServiceBindings {
    /// Compile service definitions. Route overrides must name rule sets in
    /// `catalog`.
    pub fn compile(services: &[ServiceDef], catalog: &RuleCatalog) -> Result<Self, RuleError> {
        let mut bindings = Self::default();

        for service in services {
            if service.role.is_empty() {
                return Err(RuleError::EmptyName("service role"));
            }
            if let Some(ref url) = service.url {
                if !bindings.directory.insert(service.role.clone(), url) {
                    return Err(RuleError::InvalidServiceUrl {
                        role: service.role.clone(),
                        url: url.clone(),
                    });
                }
            }

            for route in &service.routes {
                let pattern =
                    UrlTemplate::parse(&route.pattern).map_err(|source| RuleError::RoutePattern {
                        role: service.role.clone(),
                        source,
                    })?;
                for name in route.overrides.values() {
                    if !catalog.contains(name) {
                        return Err(RuleError::UnknownRuleSet {
                            referenced_by: format!("service {}", service.role),
                            name: name.clone(),
                        });
                    }
                }
                bindings.routes.push(ServiceRoute {
                    role: service.role.clone(),
                    pattern,
                    overrides: route.overrides.clone().into(),
                });
            }
        }

        Ok(bindings)
    }

    /// First route whose pattern matches `url`.
    pub fn route_for(&self, url: &str) -> Option<&ServiceRoute> {
        let candidate = UrlTemplate::parse_literal(url).ok()?;
        self.routes
            .iter()
            .find(|route| route.pattern.matches(&candidate).is_some())
    }

    pub fn routes(&self) -> &[ServiceRoute] {
        &self.routes
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Direction, RewriteConfig};

    fn compile(yaml: &str) -> Result<ServiceBindings, RuleError> {
        let config: RewriteConfig = serde_yaml::from_str(yaml).unwrap();
        let catalog = RuleCatalog::compile(&config.rule_sets).unwrap();
        ServiceBindings::compile(&config.services, &catalog)
    }

    #[test]
    fn test_route_selection() {
        let bindings = compile(
            r#"
rule_sets:
  - name: webhdfs-out
services:
  - role: WEBHDFS
    url: "http://namenode:50070/webhdfs"
    routes:
      - pattern: "{scheme}://{host}:{port}/gateway/webhdfs/{path=**}?{**}"
        overrides:
          response.headers: webhdfs-out
  - role: OTHER
    routes:
      - pattern: "/other/**"
"#,
        )
        .unwrap();

        let route = bindings
            .route_for("https://gw:8443/gateway/webhdfs/v1/tmp?op=LISTSTATUS")
            .unwrap();
        assert_eq!(route.role, "WEBHDFS");
        assert_eq!(route.overrides.get(Direction::ResponseHeaders), Some("webhdfs-out"));

        assert_eq!(bindings.route_for("/other/x").unwrap().role, "OTHER");
        assert!(bindings.route_for("/unrouted").is_none());
        assert_eq!(
            bindings.directory().get("WEBHDFS").unwrap().host.as_deref(),
            Some("namenode")
        );
    }

    #[test]
    fn test_route_override_must_exist() {
        let err = compile(
            r#"
services:
  - role: WEBHDFS
    routes:
      - pattern: "/webhdfs/**"
        overrides:
          request.body: missing
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::UnknownRuleSet { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_bad_route_pattern() {
        let err = compile(
            r#"
services:
  - role: WEBHDFS
    routes:
      - pattern: "/webhdfs/{open"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::RoutePattern { .. }));
    }
}
